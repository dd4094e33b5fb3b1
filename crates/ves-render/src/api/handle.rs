use std::fmt;
use std::num::NonZeroU32;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Wraps a raw object name. Zero is the GL "no object" name and is rejected.
            #[inline]
            pub fn from_raw(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            #[inline]
            pub fn raw(self) -> u32 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

gpu_handle!(
    /// Name of a framebuffer object.
    FramebufferHandle,
    "fbo"
);
gpu_handle!(
    /// Name of a renderbuffer object.
    RenderbufferHandle,
    "rbo"
);
gpu_handle!(
    /// Name of a texture object.
    TextureHandle,
    "tex"
);

/// Hands out object names in generation order, starting at 1.
///
/// Names are never reused within one allocator, so a deleted handle stays
/// invalid for the lifetime of the backend.
#[derive(Debug, Default)]
pub(crate) struct NameAllocator {
    last: u32,
}

impl NameAllocator {
    pub(crate) fn next(&mut self) -> anyhow::Result<NonZeroU32> {
        let next = self
            .last
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("object name space exhausted"))?;
        self.last = next;
        NonZeroU32::new(next).ok_or_else(|| anyhow::anyhow!("object name space exhausted"))
    }

    pub(crate) fn next_framebuffer(&mut self) -> anyhow::Result<FramebufferHandle> {
        self.next().map(FramebufferHandle)
    }

    pub(crate) fn next_renderbuffer(&mut self) -> anyhow::Result<RenderbufferHandle> {
        self.next().map(RenderbufferHandle)
    }

    pub(crate) fn next_texture(&mut self) -> anyhow::Result<TextureHandle> {
        self.next().map(TextureHandle)
    }
}
