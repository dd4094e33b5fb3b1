//! Render targets: where a draw's output lands.
//!
//! - [`DefaultRenderTarget`] renders into the default framebuffer
//! - [`FboRenderTarget`] renders into textures attached to a framebuffer object
//! - [`RenderToTexture`] is an FBO target with one color texture and a depth
//!   renderbuffer sized to it
//!
//! FBO targets build their GPU objects lazily in `setup`, gated by a dirty
//! flag. Changing an attachment or resizing an attached texture makes the
//! built objects stale; the next `setup` deletes and rebuilds them.

mod fbo;
mod render_to_texture;

pub use fbo::FboRenderTarget;
pub use render_to_texture::RenderToTexture;

use anyhow::Result;

pub use crate::api::AttachmentType;
use crate::api::GpuApi;
use crate::state::RenderState;

/// How a render target is realized on the GPU.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum ImplementationType {
    /// The default (window) framebuffer.
    #[default]
    FrameBuffer,
    FrameBufferObject,
    /// Reserved; no target implements pixel buffers.
    PixelBuffer,
}

pub trait RenderTarget {
    fn implementation(&self) -> ImplementationType;

    /// Creates or refreshes GPU objects. Cheap when nothing changed.
    fn setup(&mut self, _gl: &mut dyn GpuApi, _state: &RenderState<'_>) -> Result<()> {
        Ok(())
    }

    /// Makes this target current for subsequent draws.
    fn render(&mut self, _gl: &mut dyn GpuApi, _state: &RenderState<'_>) -> Result<()> {
        Ok(())
    }

    /// Deletes GPU objects owned by the target.
    fn release(&mut self, _gl: &mut dyn GpuApi) -> Result<()> {
        Ok(())
    }
}

/// Renders into the default framebuffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRenderTarget;

impl DefaultRenderTarget {
    pub fn new() -> Self {
        Self
    }
}

impl RenderTarget for DefaultRenderTarget {
    fn implementation(&self) -> ImplementationType {
        ImplementationType::FrameBuffer
    }

    fn render(&mut self, gl: &mut dyn GpuApi, _state: &RenderState<'_>) -> Result<()> {
        gl.bind_framebuffer(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{GlCall, RecordingApi};
    use crate::state::{Mapper, Material};

    #[test]
    fn default_target_binds_default_framebuffer() {
        let (material, mapper) = (Material::new(), Mapper::default());
        let state = RenderState::new(&material, &mapper);
        let mut gl = RecordingApi::new();

        let mut target = DefaultRenderTarget::new();
        assert_eq!(target.implementation(), ImplementationType::FrameBuffer);
        target.setup(&mut gl, &state).unwrap();
        assert!(gl.calls().is_empty());

        target.render(&mut gl, &state).unwrap();
        assert_eq!(gl.calls(), &[GlCall::BindFramebuffer(None)]);
    }

    #[test]
    fn default_implementation_is_framebuffer() {
        assert_eq!(ImplementationType::default(), ImplementationType::FrameBuffer);
    }
}
