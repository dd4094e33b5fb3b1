//! GL ES-shaped GPU command surface.
//!
//! Render targets and vertex attributes never talk to wgpu directly. They issue
//! the same small set of object calls a GL ES 2 renderer would (generate/bind
//! framebuffers and renderbuffers, attach images, point/enable attributes)
//! through [`GpuApi`]. Two backends exist:
//! - [`WgpuApi`] maps every object onto wgpu resources
//! - [`RecordingApi`] records calls and validates handles without a GPU

mod handle;
mod recording;
mod wgpu_backend;

use std::collections::BTreeMap;

use anyhow::Result;

pub use handle::{FramebufferHandle, RenderbufferHandle, TextureHandle};
pub use recording::{GlCall, RecordingApi};
pub use wgpu_backend::{TargetFormats, VertexLayout, WgpuApi};

pub(crate) use handle::NameAllocator;

/// Framebuffer attachment points.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AttachmentType {
    ColorAttachment0,
    DepthAttachment,
}

impl AttachmentType {
    /// The GL ES enum value for this attachment point.
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::ColorAttachment0 => 0x8CE0,
            Self::DepthAttachment => 0x8D00,
        }
    }

    #[inline]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::DepthAttachment)
    }
}

/// Storage formats for textures created through [`GpuApi::gen_texture`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Depth16Unorm,
    Depth32Float,
}

impl TextureFormat {
    #[inline]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth16Unorm | Self::Depth32Float)
    }
}

/// Storage formats for renderbuffers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum RenderbufferFormat {
    /// `GL_DEPTH_COMPONENT16`.
    #[default]
    Depth16,
    /// 24-bit (or better) depth, backend's choice of exact layout.
    Depth24Plus,
}

/// Result of a framebuffer completeness check.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FramebufferStatus {
    Complete,
    /// An attached image is zero-sized, has no storage, or has a format that
    /// cannot be used at its attachment point.
    IncompleteAttachment,
    /// Nothing is attached.
    MissingAttachment,
    /// Attached images differ in size.
    IncompleteDimensions,
    /// No framebuffer object is bound.
    Undefined,
}

impl FramebufferStatus {
    #[inline]
    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }
}

/// Component type of a vertex attribute array.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AttribType {
    Float,
    UnsignedByte,
}

impl AttribType {
    pub const fn size_in_bytes(self) -> u32 {
        match self {
            Self::Float => 4,
            Self::UnsignedByte => 1,
        }
    }
}

/// Arguments of a `glVertexAttribPointer` call, minus location and data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AttribPointer {
    /// 1..=4
    pub components: u8,
    pub kind: AttribType,
    pub normalized: bool,
    /// Bytes between consecutive elements.
    pub stride: u32,
    /// Byte offset of the first element inside the client array.
    pub offset: u32,
}

impl AttribPointer {
    /// Size in bytes of one element of this attribute.
    pub const fn element_size(&self) -> u32 {
        self.components as u32 * self.kind.size_in_bytes()
    }

    /// Number of whole elements this pointer can read from `len` bytes.
    pub fn element_count(&self, len: usize) -> usize {
        let (offset, size, stride) = (
            self.offset as usize,
            self.element_size() as usize,
            self.stride as usize,
        );
        if len < offset + size || stride == 0 {
            return 0;
        }
        (len - offset - size) / stride + 1
    }
}

/// Object attached at a framebuffer attachment point.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AttachedObject {
    Texture(TextureHandle),
    Renderbuffer(RenderbufferHandle),
}

/// Attachment table of one framebuffer object. Holds at most one object per
/// attachment point.
pub type AttachmentTable = BTreeMap<AttachmentType, AttachedObject>;

/// What the completeness check needs to know about one attached image.
#[derive(Debug, Copy, Clone)]
pub(crate) struct AttachedImage {
    pub attachment: AttachmentType,
    /// `None` when the object has no storage yet.
    pub size: Option<(u32, u32)>,
    pub depth_format: bool,
}

/// GL ES 2 completeness rules: something attached, every image has non-zero
/// storage in a format valid for its attachment point, all images share a size.
pub(crate) fn completeness(images: &[AttachedImage]) -> FramebufferStatus {
    if images.is_empty() {
        return FramebufferStatus::MissingAttachment;
    }

    let mut size = None;
    for image in images {
        let Some((w, h)) = image.size else {
            return FramebufferStatus::IncompleteAttachment;
        };
        if w == 0 || h == 0 || image.attachment.is_depth() != image.depth_format {
            return FramebufferStatus::IncompleteAttachment;
        }
        match size {
            None => size = Some((w, h)),
            Some(s) if s != (w, h) => return FramebufferStatus::IncompleteDimensions,
            Some(_) => {}
        }
    }

    FramebufferStatus::Complete
}

/// The GPU object calls issued by render targets and vertex attributes.
///
/// Calls that act on "the bound" object follow GL binding semantics: they
/// apply to whatever the last `bind_*` call selected, and fail when nothing
/// is bound.
pub trait GpuApi {
    fn gen_framebuffer(&mut self) -> Result<FramebufferHandle>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) -> Result<()>;
    /// `None` selects the default framebuffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> Result<()>;

    fn gen_renderbuffer(&mut self) -> Result<RenderbufferHandle>;
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) -> Result<()>;
    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>) -> Result<()>;
    /// Allocates storage for the bound renderbuffer.
    fn renderbuffer_storage(
        &mut self,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    ) -> Result<()>;

    fn gen_texture(&mut self, width: u32, height: u32, format: TextureFormat)
    -> Result<TextureHandle>;
    /// Reallocates storage; previous contents are lost.
    fn resize_texture(&mut self, texture: TextureHandle, width: u32, height: u32) -> Result<()>;
    fn delete_texture(&mut self, texture: TextureHandle) -> Result<()>;
    fn bind_texture(&mut self, texture: Option<TextureHandle>) -> Result<()>;

    /// Attaches a texture to the bound framebuffer.
    fn framebuffer_texture_2d(
        &mut self,
        attachment: AttachmentType,
        texture: TextureHandle,
    ) -> Result<()>;
    /// Attaches a renderbuffer to the bound framebuffer.
    fn framebuffer_renderbuffer(
        &mut self,
        attachment: AttachmentType,
        renderbuffer: RenderbufferHandle,
    ) -> Result<()>;
    fn check_framebuffer_status(&mut self) -> FramebufferStatus;

    /// Points attribute `location` at `data`, a client-side array laid out as
    /// described by `pointer`.
    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        pointer: AttribPointer,
        data: &[u8],
    ) -> Result<()>;
    fn enable_vertex_attrib_array(&mut self, location: u32) -> Result<()>;
    fn disable_vertex_attrib_array(&mut self, location: u32) -> Result<()>;
}
