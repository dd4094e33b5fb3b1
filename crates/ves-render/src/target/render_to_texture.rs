use std::rc::Rc;

use anyhow::{Context, Result};

use crate::api::{AttachmentType, GpuApi, RenderbufferFormat};
use crate::state::RenderState;
use crate::texture::Texture;

use super::{FboRenderTarget, ImplementationType, RenderTarget};

/// Renders into a single color texture with a depth renderbuffer of the
/// same size.
#[derive(Debug)]
pub struct RenderToTexture {
    fbo: FboRenderTarget,
}

impl Default for RenderToTexture {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderToTexture {
    pub fn new() -> Self {
        Self::with_depth_format(RenderbufferFormat::Depth16)
    }

    pub fn with_depth_format(format: RenderbufferFormat) -> Self {
        Self {
            fbo: FboRenderTarget::with_depth_buffer(format),
        }
    }

    /// Sets the color texture.
    ///
    /// Returns `false` when `texture` is already the color attachment.
    pub fn set_texture(&mut self, texture: Rc<Texture>) -> bool {
        if self
            .texture()
            .is_some_and(|current| Rc::ptr_eq(current, &texture))
        {
            return false;
        }
        self.fbo.set_dirty();
        self.fbo.attach(AttachmentType::ColorAttachment0, texture)
    }

    pub fn texture(&self) -> Option<&Rc<Texture>> {
        self.fbo.attachment(AttachmentType::ColorAttachment0)
    }

    /// Resizes the color texture; the depth renderbuffer follows on next setup.
    pub fn resize(&mut self, gl: &mut dyn GpuApi, width: u32, height: u32) -> Result<bool> {
        let texture = self
            .texture()
            .context("render-to-texture target has no texture to resize")?;
        texture.resize(gl, width, height)
    }

    pub fn is_dirty(&self) -> bool {
        self.fbo.is_dirty()
    }

    /// The underlying framebuffer-object target.
    pub fn fbo(&self) -> &FboRenderTarget {
        &self.fbo
    }
}

impl RenderTarget for RenderToTexture {
    fn implementation(&self) -> ImplementationType {
        ImplementationType::FrameBufferObject
    }

    fn setup(&mut self, gl: &mut dyn GpuApi, _state: &RenderState<'_>) -> Result<()> {
        if !self.fbo.is_dirty() {
            return Ok(());
        }

        let fb = self.fbo.begin_build(gl)?;

        if let Some(texture) = self.texture().cloned() {
            let format = self.fbo.depth_buffer().unwrap_or_default();
            let rbo = self.fbo.build_renderbuffer(gl, format, texture.size())?;

            gl.bind_texture(Some(texture.handle()))?;
            gl.framebuffer_texture_2d(AttachmentType::ColorAttachment0, texture.handle())?;
            gl.framebuffer_renderbuffer(AttachmentType::DepthAttachment, rbo)?;

            self.fbo.check_complete(gl)?;
            log::debug!(
                "{fb}: render-to-texture {} at {}x{}",
                texture.handle(),
                texture.width(),
                texture.height()
            );
        }

        self.fbo.finish_build();
        Ok(())
    }

    fn render(&mut self, gl: &mut dyn GpuApi, state: &RenderState<'_>) -> Result<()> {
        let texture = self
            .texture()
            .cloned()
            .context("render-to-texture target has no texture")?;

        self.setup(gl, state)?;

        gl.bind_framebuffer(self.fbo.framebuffer())?;
        gl.bind_renderbuffer(self.fbo.renderbuffers().last().copied())?;
        gl.bind_texture(Some(texture.handle()))
    }

    fn release(&mut self, gl: &mut dyn GpuApi) -> Result<()> {
        self.fbo.release(gl)
    }
}
