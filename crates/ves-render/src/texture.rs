//! Shared 2D texture objects.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;

use crate::api::{GpuApi, TextureFormat, TextureHandle};

/// A 2D texture with GPU storage.
///
/// Textures are shared between materials and render targets through `Rc`.
/// Size is interior-mutable so a shared texture can be resized in place; every
/// resize or release bumps [`Texture::generation`], which framebuffers built on
/// the old storage use to detect that their attachments are stale.
#[derive(Debug)]
pub struct Texture {
    handle: TextureHandle,
    format: TextureFormat,
    width: Cell<u32>,
    height: Cell<u32>,
    generation: Cell<u64>,
}

impl Texture {
    /// Allocates storage for a `width` x `height` texture.
    pub fn create(
        gl: &mut dyn GpuApi,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Rc<Self>> {
        let handle = gl.gen_texture(width, height, format)?;
        Ok(Rc::new(Self {
            handle,
            format,
            width: Cell::new(width),
            height: Cell::new(height),
            generation: Cell::new(0),
        }))
    }

    #[inline]
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width.get()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height.get()
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Incremented whenever the storage changes: reallocation or release.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Reallocates storage at a new size. Same-size resizes are ignored.
    ///
    /// Returns `true` when storage was reallocated.
    pub fn resize(&self, gl: &mut dyn GpuApi, width: u32, height: u32) -> Result<bool> {
        if self.size() == (width, height) {
            return Ok(false);
        }
        gl.resize_texture(self.handle, width, height)?;
        self.width.set(width);
        self.height.set(height);
        self.generation.set(self.generation.get() + 1);
        Ok(true)
    }

    /// Deletes the GPU storage. The handle is invalid afterwards, and
    /// framebuffers built on it become stale.
    pub fn release(&self, gl: &mut dyn GpuApi) -> Result<()> {
        gl.delete_texture(self.handle)?;
        self.generation.set(self.generation.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{GlCall, RecordingApi};

    #[test]
    fn resize_bumps_generation_once_per_change() {
        let mut gl = RecordingApi::new();
        let tex = Texture::create(&mut gl, 64, 64, TextureFormat::Rgba8Unorm).unwrap();
        assert_eq!(tex.generation(), 0);

        assert!(!tex.resize(&mut gl, 64, 64).unwrap());
        assert_eq!(tex.generation(), 0);

        assert!(tex.resize(&mut gl, 128, 32).unwrap());
        assert_eq!(tex.size(), (128, 32));
        assert_eq!(tex.generation(), 1);

        assert_eq!(
            gl.calls().last(),
            Some(&GlCall::ResizeTexture {
                texture: tex.handle(),
                width: 128,
                height: 32
            })
        );
    }

    #[test]
    fn failed_resize_keeps_size() {
        let mut gl = RecordingApi::new();
        let tex = Texture::create(&mut gl, 8, 8, TextureFormat::Rgba8Unorm).unwrap();
        assert!(tex.resize(&mut gl, 0, 8).is_err());
        assert_eq!(tex.size(), (8, 8));
        assert_eq!(tex.generation(), 0);
    }

    #[test]
    fn zero_sized_texture_is_rejected() {
        let mut gl = RecordingApi::new();
        assert!(Texture::create(&mut gl, 0, 4, TextureFormat::Rgba8Unorm).is_err());
    }

    #[test]
    fn release_frees_handle() {
        let mut gl = RecordingApi::new();
        let tex = Texture::create(&mut gl, 8, 8, TextureFormat::Rgba8Unorm).unwrap();
        tex.release(&mut gl).unwrap();
        assert_eq!(gl.live_textures(), 0);
        assert_eq!(tex.generation(), 1);

        assert!(tex.release(&mut gl).is_err());
        assert_eq!(tex.generation(), 1);
    }
}
