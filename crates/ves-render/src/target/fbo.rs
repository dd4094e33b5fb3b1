use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{Result, ensure};

use crate::api::{AttachmentType, FramebufferHandle, GpuApi, RenderbufferFormat, RenderbufferHandle};
use crate::state::RenderState;
use crate::texture::Texture;

use super::{ImplementationType, RenderTarget};

#[derive(Debug)]
struct Attachment {
    texture: Rc<Texture>,
    /// Texture generation the current framebuffer was built against.
    built_generation: Option<u64>,
}

impl Attachment {
    fn is_stale(&self) -> bool {
        self.built_generation != Some(self.texture.generation())
    }
}

/// Render target backed by a framebuffer object.
///
/// Holds at most one texture per attachment point. When a color texture is
/// attached and no depth texture is, an optional depth renderbuffer sized to
/// the color texture completes the framebuffer.
#[derive(Debug)]
pub struct FboRenderTarget {
    attachments: BTreeMap<AttachmentType, Attachment>,
    depth_buffer: Option<RenderbufferFormat>,

    framebuffer: Option<FramebufferHandle>,
    renderbuffers: Vec<RenderbufferHandle>,
    dirty: bool,
}

impl Default for FboRenderTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl FboRenderTarget {
    pub fn new() -> Self {
        Self {
            attachments: BTreeMap::new(),
            depth_buffer: None,
            framebuffer: None,
            renderbuffers: Vec::new(),
            dirty: true,
        }
    }

    /// A target that adds a depth renderbuffer of `format` when no depth
    /// texture is attached.
    pub fn with_depth_buffer(format: RenderbufferFormat) -> Self {
        let mut target = Self::new();
        target.depth_buffer = Some(format);
        target
    }

    pub fn depth_buffer(&self) -> Option<RenderbufferFormat> {
        self.depth_buffer
    }

    pub fn set_depth_buffer(&mut self, format: Option<RenderbufferFormat>) {
        if self.depth_buffer != format {
            self.depth_buffer = format;
            self.dirty = true;
        }
    }

    /// Attaches `texture` at `attachment`, replacing what was there.
    ///
    /// Returns `false` if that texture is already attached there.
    pub fn attach(&mut self, attachment: AttachmentType, texture: Rc<Texture>) -> bool {
        if self
            .attachments
            .get(&attachment)
            .is_some_and(|a| Rc::ptr_eq(&a.texture, &texture))
        {
            return false;
        }
        self.attachments.insert(
            attachment,
            Attachment {
                texture,
                built_generation: None,
            },
        );
        self.dirty = true;
        true
    }

    pub fn detach(&mut self, attachment: AttachmentType) -> Option<Rc<Texture>> {
        let removed = self.attachments.remove(&attachment)?;
        self.dirty = true;
        Some(removed.texture)
    }

    pub fn attachment(&self, attachment: AttachmentType) -> Option<&Rc<Texture>> {
        self.attachments.get(&attachment).map(|a| &a.texture)
    }

    pub fn attachments(&self) -> impl Iterator<Item = (AttachmentType, &Rc<Texture>)> {
        self.attachments.iter().map(|(&ty, a)| (ty, &a.texture))
    }

    /// Framebuffer built by the last successful setup.
    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    /// Renderbuffers built by the last successful setup, oldest first.
    pub fn renderbuffers(&self) -> &[RenderbufferHandle] {
        &self.renderbuffers
    }

    /// Whether the next setup rebuilds GPU objects.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.attachments.values().any(Attachment::is_stale)
    }

    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    /// Deletes the framebuffer and renderbuffers from the previous setup.
    ///
    /// Every delete is attempted. Handles whose delete failed stay tracked and
    /// the first error is returned.
    pub(super) fn release_objects(&mut self, gl: &mut dyn GpuApi) -> Result<()> {
        let mut first_err = None;

        self.renderbuffers
            .retain(|&rbo| match gl.delete_renderbuffer(rbo) {
                Ok(()) => false,
                Err(err) => {
                    first_err.get_or_insert(err);
                    true
                }
            });

        if let Some(fb) = self.framebuffer {
            match gl.delete_framebuffer(fb) {
                Ok(()) => {
                    self.framebuffer = None;
                    log::debug!("{fb}: released");
                }
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Generates and binds a fresh framebuffer.
    pub(super) fn begin_build(&mut self, gl: &mut dyn GpuApi) -> Result<FramebufferHandle> {
        self.release_objects(gl)?;
        let fb = gl.gen_framebuffer()?;
        self.framebuffer = Some(fb);
        gl.bind_framebuffer(Some(fb))?;
        Ok(fb)
    }

    /// Generates a renderbuffer with storage and binds it.
    pub(super) fn build_renderbuffer(
        &mut self,
        gl: &mut dyn GpuApi,
        format: RenderbufferFormat,
        (width, height): (u32, u32),
    ) -> Result<RenderbufferHandle> {
        let rbo = gl.gen_renderbuffer()?;
        self.renderbuffers.push(rbo);
        gl.bind_renderbuffer(Some(rbo))?;
        gl.renderbuffer_storage(format, width, height)?;
        Ok(rbo)
    }

    /// Records that the built objects match the current attachments.
    pub(super) fn finish_build(&mut self) {
        for attachment in self.attachments.values_mut() {
            attachment.built_generation = Some(attachment.texture.generation());
        }
        self.dirty = false;
    }

    pub(super) fn check_complete(&self, gl: &mut dyn GpuApi) -> Result<()> {
        let status = gl.check_framebuffer_status();
        ensure!(
            status.is_complete(),
            "framebuffer {} incomplete: {status:?}",
            self.framebuffer
                .map_or_else(|| "<none>".to_owned(), |fb| fb.to_string())
        );
        Ok(())
    }
}

impl RenderTarget for FboRenderTarget {
    fn implementation(&self) -> ImplementationType {
        ImplementationType::FrameBufferObject
    }

    fn setup(&mut self, gl: &mut dyn GpuApi, _state: &RenderState<'_>) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }

        let fb = self.begin_build(gl)?;

        let textures: Vec<_> = self
            .attachments()
            .map(|(ty, tex)| (ty, Rc::clone(tex)))
            .collect();
        for (ty, texture) in &textures {
            gl.framebuffer_texture_2d(*ty, texture.handle())?;
        }

        if let Some(format) = self.depth_buffer
            && !self.attachments.contains_key(&AttachmentType::DepthAttachment)
            && let Some(color) = self.attachment(AttachmentType::ColorAttachment0).cloned()
        {
            let rbo = self.build_renderbuffer(gl, format, color.size())?;
            gl.framebuffer_renderbuffer(AttachmentType::DepthAttachment, rbo)?;
        }

        self.check_complete(gl)?;
        self.finish_build();
        log::debug!("{fb}: built with {} attachment(s)", textures.len());
        Ok(())
    }

    fn render(&mut self, gl: &mut dyn GpuApi, state: &RenderState<'_>) -> Result<()> {
        self.setup(gl, state)?;
        gl.bind_framebuffer(self.framebuffer)
    }

    fn release(&mut self, gl: &mut dyn GpuApi) -> Result<()> {
        self.dirty = true;
        self.release_objects(gl)
    }
}

impl Drop for FboRenderTarget {
    fn drop(&mut self) {
        if self.framebuffer.is_some() || !self.renderbuffers.is_empty() {
            log::warn!(
                "FboRenderTarget dropped without release; leaking {:?} and {} renderbuffer(s)",
                self.framebuffer,
                self.renderbuffers.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{GlCall, RecordingApi, TextureFormat};
    use crate::state::{Mapper, Material};

    fn with_state<R>(f: impl FnOnce(&RenderState<'_>) -> R) -> R {
        let (material, mapper) = (Material::new(), Mapper::default());
        f(&RenderState::new(&material, &mapper))
    }

    fn color(gl: &mut RecordingApi, w: u32, h: u32) -> Rc<Texture> {
        Texture::create(gl, w, h, TextureFormat::Rgba8Unorm).unwrap()
    }

    #[test]
    fn attach_same_texture_twice_is_a_no_op() {
        let mut gl = RecordingApi::new();
        let tex = color(&mut gl, 4, 4);
        let mut target = FboRenderTarget::new();

        assert!(target.attach(AttachmentType::ColorAttachment0, Rc::clone(&tex)));
        assert!(!target.attach(AttachmentType::ColorAttachment0, Rc::clone(&tex)));
        assert!(target.attach(AttachmentType::ColorAttachment0, color(&mut gl, 4, 4)));
        assert_eq!(target.attachments().count(), 1);
    }

    #[test]
    fn setup_attaches_textures_and_depth_renderbuffer() {
        let mut gl = RecordingApi::new();
        let tex = color(&mut gl, 32, 16);
        gl.take_calls();

        let mut target = FboRenderTarget::with_depth_buffer(RenderbufferFormat::Depth16);
        target.attach(AttachmentType::ColorAttachment0, Rc::clone(&tex));
        with_state(|state| target.setup(&mut gl, state)).unwrap();

        let fb = target.framebuffer().unwrap();
        let rbo = target.renderbuffers()[0];
        assert_eq!(
            gl.take_calls(),
            vec![
                GlCall::GenFramebuffer(fb),
                GlCall::BindFramebuffer(Some(fb)),
                GlCall::FramebufferTexture2D {
                    attachment: AttachmentType::ColorAttachment0,
                    texture: tex.handle()
                },
                GlCall::GenRenderbuffer(rbo),
                GlCall::BindRenderbuffer(Some(rbo)),
                GlCall::RenderbufferStorage {
                    format: RenderbufferFormat::Depth16,
                    width: 32,
                    height: 16
                },
                GlCall::FramebufferRenderbuffer {
                    attachment: AttachmentType::DepthAttachment,
                    renderbuffer: rbo
                },
                GlCall::CheckFramebufferStatus(crate::api::FramebufferStatus::Complete),
            ]
        );
        assert!(!target.is_dirty());

        target.release(&mut gl).unwrap();
    }

    #[test]
    fn depth_texture_suppresses_renderbuffer() {
        let mut gl = RecordingApi::new();
        let tex = color(&mut gl, 8, 8);
        let depth = Texture::create(&mut gl, 8, 8, TextureFormat::Depth16Unorm).unwrap();

        let mut target = FboRenderTarget::with_depth_buffer(RenderbufferFormat::Depth16);
        target.attach(AttachmentType::ColorAttachment0, tex);
        target.attach(AttachmentType::DepthAttachment, depth);
        with_state(|state| target.setup(&mut gl, state)).unwrap();

        assert!(target.renderbuffers().is_empty());
        assert_eq!(gl.live_renderbuffers(), 0);
        target.release(&mut gl).unwrap();
    }

    #[test]
    fn clean_setup_issues_no_calls() {
        let mut gl = RecordingApi::new();
        let mut target = FboRenderTarget::new();
        target.attach(AttachmentType::ColorAttachment0, color(&mut gl, 8, 8));
        with_state(|state| target.setup(&mut gl, state)).unwrap();
        gl.take_calls();

        with_state(|state| target.setup(&mut gl, state)).unwrap();
        assert!(gl.calls().is_empty());
        target.release(&mut gl).unwrap();
    }

    #[test]
    fn texture_resize_makes_framebuffer_stale() {
        let mut gl = RecordingApi::new();
        let tex = color(&mut gl, 8, 8);
        let mut target = FboRenderTarget::with_depth_buffer(RenderbufferFormat::Depth16);
        target.attach(AttachmentType::ColorAttachment0, Rc::clone(&tex));
        with_state(|state| target.setup(&mut gl, state)).unwrap();
        let (old_fb, old_rbo) = (target.framebuffer().unwrap(), target.renderbuffers()[0]);

        tex.resize(&mut gl, 16, 16).unwrap();
        assert!(target.is_dirty());

        with_state(|state| target.setup(&mut gl, state)).unwrap();
        assert_ne!(target.framebuffer(), Some(old_fb));
        assert!(gl.calls().contains(&GlCall::DeleteFramebuffer(old_fb)));
        assert!(gl.calls().contains(&GlCall::DeleteRenderbuffer(old_rbo)));
        assert!(gl.calls().contains(&GlCall::RenderbufferStorage {
            format: RenderbufferFormat::Depth16,
            width: 16,
            height: 16
        }));
        assert_eq!(gl.live_framebuffers(), 1);
        assert_eq!(gl.live_renderbuffers(), 1);
        target.release(&mut gl).unwrap();
    }

    #[test]
    fn incomplete_framebuffer_fails_and_stays_dirty() {
        let mut gl = RecordingApi::new();
        let mut target = FboRenderTarget::new();
        target.attach(AttachmentType::ColorAttachment0, color(&mut gl, 8, 8));
        target.attach(AttachmentType::DepthAttachment, color(&mut gl, 8, 8));

        let err = with_state(|state| target.setup(&mut gl, state)).unwrap_err();
        assert!(err.to_string().contains("IncompleteAttachment"));
        assert!(target.is_dirty());
        target.release(&mut gl).unwrap();
    }

    #[test]
    fn empty_target_is_missing_attachment() {
        let mut gl = RecordingApi::new();
        let mut target = FboRenderTarget::new();
        assert!(with_state(|state| target.setup(&mut gl, state)).is_err());
        target.release(&mut gl).unwrap();
    }

    #[test]
    fn render_binds_built_framebuffer() {
        let mut gl = RecordingApi::new();
        let mut target = FboRenderTarget::new();
        target.attach(AttachmentType::ColorAttachment0, color(&mut gl, 8, 8));
        with_state(|state| target.render(&mut gl, state)).unwrap();
        assert_eq!(gl.bound_framebuffer(), target.framebuffer());
        assert_eq!(target.implementation(), ImplementationType::FrameBufferObject);
        target.release(&mut gl).unwrap();
    }

    #[test]
    fn release_deletes_objects_and_marks_dirty() {
        let mut gl = RecordingApi::new();
        let mut target = FboRenderTarget::with_depth_buffer(RenderbufferFormat::Depth24Plus);
        target.attach(AttachmentType::ColorAttachment0, color(&mut gl, 8, 8));
        with_state(|state| target.setup(&mut gl, state)).unwrap();

        target.release(&mut gl).unwrap();
        assert_eq!(gl.live_framebuffers(), 0);
        assert_eq!(gl.live_renderbuffers(), 0);
        assert!(target.framebuffer().is_none());
        assert!(target.is_dirty());
    }

    #[test]
    fn detach_marks_dirty() {
        let mut gl = RecordingApi::new();
        let mut target = FboRenderTarget::new();
        target.attach(AttachmentType::ColorAttachment0, color(&mut gl, 8, 8));
        with_state(|state| target.setup(&mut gl, state)).unwrap();

        assert!(target.detach(AttachmentType::ColorAttachment0).is_some());
        assert!(target.detach(AttachmentType::ColorAttachment0).is_none());
        assert!(target.is_dirty());
        target.release(&mut gl).unwrap();
    }

    #[test]
    fn released_texture_forces_rebuild() {
        let mut gl = RecordingApi::new();
        let tex = color(&mut gl, 8, 8);
        let mut target = FboRenderTarget::new();
        target.attach(AttachmentType::ColorAttachment0, Rc::clone(&tex));
        with_state(|state| target.setup(&mut gl, state)).unwrap();

        tex.release(&mut gl).unwrap();
        assert!(target.is_dirty());

        let err = with_state(|state| target.render(&mut gl, state)).unwrap_err();
        assert!(err.to_string().contains("attach of unknown texture"));
        assert!(target.is_dirty());
        target.release(&mut gl).unwrap();
    }

    #[test]
    fn failed_release_keeps_undeleted_handles() {
        let mut gl = RecordingApi::new();
        let mut target = FboRenderTarget::with_depth_buffer(RenderbufferFormat::Depth16);
        target.attach(AttachmentType::ColorAttachment0, color(&mut gl, 8, 8));
        with_state(|state| target.setup(&mut gl, state)).unwrap();
        let (fb, rbo) = (target.framebuffer(), target.renderbuffers()[0]);

        // Another context knows none of these names.
        let mut other = RecordingApi::new();
        assert!(target.release(&mut other).is_err());
        assert_eq!(target.framebuffer(), fb);
        assert_eq!(target.renderbuffers(), &[rbo]);
        assert!(target.is_dirty());

        target.release(&mut gl).unwrap();
        assert!(target.renderbuffers().is_empty());
        assert_eq!(gl.live_framebuffers(), 0);
        assert_eq!(gl.live_renderbuffers(), 0);
    }

    #[test]
    fn changing_depth_buffer_rebuilds() {
        let mut gl = RecordingApi::new();
        let mut target = FboRenderTarget::new();
        target.attach(AttachmentType::ColorAttachment0, color(&mut gl, 8, 8));
        with_state(|state| target.setup(&mut gl, state)).unwrap();
        assert!(target.renderbuffers().is_empty());

        target.set_depth_buffer(None);
        assert!(!target.is_dirty());

        target.set_depth_buffer(Some(RenderbufferFormat::Depth24Plus));
        assert!(target.is_dirty());
        with_state(|state| target.setup(&mut gl, state)).unwrap();
        assert_eq!(target.depth_buffer(), Some(RenderbufferFormat::Depth24Plus));
        assert_eq!(target.renderbuffers().len(), 1);
        assert!(gl.calls().contains(&GlCall::RenderbufferStorage {
            format: RenderbufferFormat::Depth24Plus,
            width: 8,
            height: 8
        }));

        target.set_depth_buffer(None);
        with_state(|state| target.setup(&mut gl, state)).unwrap();
        assert!(target.renderbuffers().is_empty());
        assert_eq!(gl.live_renderbuffers(), 0);
        target.release(&mut gl).unwrap();
    }
}
