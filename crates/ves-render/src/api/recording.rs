use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result, bail, ensure};

use super::{
    AttachedImage, AttachedObject, AttachmentTable, AttachmentType, AttribPointer,
    FramebufferHandle, FramebufferStatus, GpuApi, NameAllocator, RenderbufferFormat,
    RenderbufferHandle, TextureFormat, TextureHandle, completeness,
};

/// One recorded GPU call, with the handles it produced or consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlCall {
    GenFramebuffer(FramebufferHandle),
    DeleteFramebuffer(FramebufferHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    GenRenderbuffer(RenderbufferHandle),
    DeleteRenderbuffer(RenderbufferHandle),
    BindRenderbuffer(Option<RenderbufferHandle>),
    RenderbufferStorage {
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    },
    GenTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
        format: TextureFormat,
    },
    ResizeTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
    },
    DeleteTexture(TextureHandle),
    BindTexture(Option<TextureHandle>),
    FramebufferTexture2D {
        attachment: AttachmentType,
        texture: TextureHandle,
    },
    FramebufferRenderbuffer {
        attachment: AttachmentType,
        renderbuffer: RenderbufferHandle,
    },
    CheckFramebufferStatus(FramebufferStatus),
    VertexAttribPointer {
        location: u32,
        pointer: AttribPointer,
        /// Number of elements the pointer can read from the supplied array.
        elements: usize,
    },
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
}

#[derive(Debug, Copy, Clone)]
struct TextureInfo {
    width: u32,
    height: u32,
    format: TextureFormat,
}

#[derive(Debug, Copy, Clone)]
struct RenderbufferInfo {
    width: u32,
    height: u32,
}

/// A [`GpuApi`] that keeps GL object state in memory and records every call.
///
/// Handle misuse (unknown or deleted names, nothing bound) fails the same way
/// it does on [`super::WgpuApi`], which makes this backend suitable for
/// exercising render targets and attributes without a GPU.
#[derive(Debug, Default)]
pub struct RecordingApi {
    calls: Vec<GlCall>,
    names: NameAllocator,

    framebuffers: BTreeMap<FramebufferHandle, AttachmentTable>,
    renderbuffers: BTreeMap<RenderbufferHandle, Option<RenderbufferInfo>>,
    textures: BTreeMap<TextureHandle, TextureInfo>,

    bound_framebuffer: Option<FramebufferHandle>,
    bound_renderbuffer: Option<RenderbufferHandle>,
    bound_texture: Option<TextureHandle>,

    pointers: BTreeMap<u32, AttribPointer>,
    enabled: BTreeSet<u32>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls recorded so far, oldest first.
    pub fn calls(&self) -> &[GlCall] {
        &self.calls
    }

    /// Drains the call log, leaving object state untouched.
    pub fn take_calls(&mut self) -> Vec<GlCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    pub fn bound_renderbuffer(&self) -> Option<RenderbufferHandle> {
        self.bound_renderbuffer
    }

    pub fn bound_texture(&self) -> Option<TextureHandle> {
        self.bound_texture
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_renderbuffers(&self) -> usize {
        self.renderbuffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Attachments of a live framebuffer.
    pub fn attachments(&self, framebuffer: FramebufferHandle) -> Option<&AttachmentTable> {
        self.framebuffers.get(&framebuffer)
    }

    pub fn is_attrib_enabled(&self, location: u32) -> bool {
        self.enabled.contains(&location)
    }

    pub fn attrib_pointer(&self, location: u32) -> Option<AttribPointer> {
        self.pointers.get(&location).copied()
    }

    fn bound_framebuffer_mut(&mut self) -> Result<&mut AttachmentTable> {
        let fb = self
            .bound_framebuffer
            .context("no framebuffer object bound")?;
        self.framebuffers
            .get_mut(&fb)
            .with_context(|| format!("bound framebuffer {fb} was deleted"))
    }

    fn attached_image(&self, attachment: AttachmentType, object: AttachedObject) -> AttachedImage {
        match object {
            AttachedObject::Texture(tex) => {
                let info = self.textures.get(&tex);
                AttachedImage {
                    attachment,
                    size: info.map(|i| (i.width, i.height)),
                    depth_format: info.is_some_and(|i| i.format.is_depth()),
                }
            }
            AttachedObject::Renderbuffer(rbo) => AttachedImage {
                attachment,
                size: self
                    .renderbuffers
                    .get(&rbo)
                    .copied()
                    .flatten()
                    .map(|i| (i.width, i.height)),
                depth_format: true,
            },
        }
    }
}

impl GpuApi for RecordingApi {
    fn gen_framebuffer(&mut self) -> Result<FramebufferHandle> {
        let fb = self.names.next_framebuffer()?;
        self.framebuffers.insert(fb, AttachmentTable::new());
        self.calls.push(GlCall::GenFramebuffer(fb));
        Ok(fb)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) -> Result<()> {
        ensure!(
            self.framebuffers.remove(&framebuffer).is_some(),
            "delete of unknown framebuffer {framebuffer}"
        );
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
        self.calls.push(GlCall::DeleteFramebuffer(framebuffer));
        Ok(())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> Result<()> {
        if let Some(fb) = framebuffer {
            ensure!(self.framebuffers.contains_key(&fb), "bind of unknown framebuffer {fb}");
        }
        self.bound_framebuffer = framebuffer;
        self.calls.push(GlCall::BindFramebuffer(framebuffer));
        Ok(())
    }

    fn gen_renderbuffer(&mut self) -> Result<RenderbufferHandle> {
        let rbo = self.names.next_renderbuffer()?;
        self.renderbuffers.insert(rbo, None);
        self.calls.push(GlCall::GenRenderbuffer(rbo));
        Ok(rbo)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) -> Result<()> {
        ensure!(
            self.renderbuffers.remove(&renderbuffer).is_some(),
            "delete of unknown renderbuffer {renderbuffer}"
        );
        if self.bound_renderbuffer == Some(renderbuffer) {
            self.bound_renderbuffer = None;
        }
        for table in self.framebuffers.values_mut() {
            table.retain(|_, obj| *obj != AttachedObject::Renderbuffer(renderbuffer));
        }
        self.calls.push(GlCall::DeleteRenderbuffer(renderbuffer));
        Ok(())
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>) -> Result<()> {
        if let Some(rbo) = renderbuffer {
            ensure!(self.renderbuffers.contains_key(&rbo), "bind of unknown renderbuffer {rbo}");
        }
        self.bound_renderbuffer = renderbuffer;
        self.calls.push(GlCall::BindRenderbuffer(renderbuffer));
        Ok(())
    }

    fn renderbuffer_storage(
        &mut self,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    ) -> Result<()> {
        ensure!(width > 0 && height > 0, "renderbuffer storage of zero size");
        let rbo = self.bound_renderbuffer.context("no renderbuffer bound")?;
        let slot = self
            .renderbuffers
            .get_mut(&rbo)
            .with_context(|| format!("bound renderbuffer {rbo} was deleted"))?;
        *slot = Some(RenderbufferInfo { width, height });
        self.calls.push(GlCall::RenderbufferStorage {
            format,
            width,
            height,
        });
        Ok(())
    }

    fn gen_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<TextureHandle> {
        ensure!(width > 0 && height > 0, "texture of zero size");
        let texture = self.names.next_texture()?;
        self.textures.insert(
            texture,
            TextureInfo {
                width,
                height,
                format,
            },
        );
        self.calls.push(GlCall::GenTexture {
            texture,
            width,
            height,
            format,
        });
        Ok(texture)
    }

    fn resize_texture(&mut self, texture: TextureHandle, width: u32, height: u32) -> Result<()> {
        ensure!(width > 0 && height > 0, "texture of zero size");
        let info = self
            .textures
            .get_mut(&texture)
            .with_context(|| format!("resize of unknown texture {texture}"))?;
        info.width = width;
        info.height = height;
        self.calls.push(GlCall::ResizeTexture {
            texture,
            width,
            height,
        });
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) -> Result<()> {
        ensure!(
            self.textures.remove(&texture).is_some(),
            "delete of unknown texture {texture}"
        );
        if self.bound_texture == Some(texture) {
            self.bound_texture = None;
        }
        for table in self.framebuffers.values_mut() {
            table.retain(|_, obj| *obj != AttachedObject::Texture(texture));
        }
        self.calls.push(GlCall::DeleteTexture(texture));
        Ok(())
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) -> Result<()> {
        if let Some(tex) = texture {
            ensure!(self.textures.contains_key(&tex), "bind of unknown texture {tex}");
        }
        self.bound_texture = texture;
        self.calls.push(GlCall::BindTexture(texture));
        Ok(())
    }

    fn framebuffer_texture_2d(
        &mut self,
        attachment: AttachmentType,
        texture: TextureHandle,
    ) -> Result<()> {
        ensure!(self.textures.contains_key(&texture), "attach of unknown texture {texture}");
        self.bound_framebuffer_mut()?
            .insert(attachment, AttachedObject::Texture(texture));
        self.calls
            .push(GlCall::FramebufferTexture2D { attachment, texture });
        Ok(())
    }

    fn framebuffer_renderbuffer(
        &mut self,
        attachment: AttachmentType,
        renderbuffer: RenderbufferHandle,
    ) -> Result<()> {
        ensure!(
            self.renderbuffers.contains_key(&renderbuffer),
            "attach of unknown renderbuffer {renderbuffer}"
        );
        self.bound_framebuffer_mut()?
            .insert(attachment, AttachedObject::Renderbuffer(renderbuffer));
        self.calls.push(GlCall::FramebufferRenderbuffer {
            attachment,
            renderbuffer,
        });
        Ok(())
    }

    fn check_framebuffer_status(&mut self) -> FramebufferStatus {
        let status = match self
            .bound_framebuffer
            .and_then(|fb| self.framebuffers.get(&fb))
        {
            None => FramebufferStatus::Undefined,
            Some(table) => {
                let images: Vec<_> = table
                    .iter()
                    .map(|(&attachment, &object)| self.attached_image(attachment, object))
                    .collect();
                completeness(&images)
            }
        };
        self.calls.push(GlCall::CheckFramebufferStatus(status));
        status
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        pointer: AttribPointer,
        data: &[u8],
    ) -> Result<()> {
        if !(1..=4).contains(&pointer.components) {
            bail!("attribute {location}: {} components", pointer.components);
        }
        self.pointers.insert(location, pointer);
        self.calls.push(GlCall::VertexAttribPointer {
            location,
            pointer,
            elements: pointer.element_count(data.len()),
        });
        Ok(())
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) -> Result<()> {
        self.enabled.insert(location);
        self.calls.push(GlCall::EnableVertexAttribArray(location));
        Ok(())
    }

    fn disable_vertex_attrib_array(&mut self, location: u32) -> Result<()> {
        self.enabled.remove(&location);
        self.calls.push(GlCall::DisableVertexAttribArray(location));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_requires_bound_framebuffer() {
        let mut gl = RecordingApi::new();
        let tex = gl.gen_texture(4, 4, TextureFormat::Rgba8Unorm).unwrap();
        assert!(
            gl.framebuffer_texture_2d(AttachmentType::ColorAttachment0, tex)
                .is_err()
        );
    }

    #[test]
    fn storage_requires_bound_renderbuffer() {
        let mut gl = RecordingApi::new();
        gl.gen_renderbuffer().unwrap();
        assert!(
            gl.renderbuffer_storage(RenderbufferFormat::Depth16, 4, 4)
                .is_err()
        );
    }

    #[test]
    fn deleted_handles_cannot_be_bound() {
        let mut gl = RecordingApi::new();
        let fb = gl.gen_framebuffer().unwrap();
        gl.bind_framebuffer(Some(fb)).unwrap();
        gl.delete_framebuffer(fb).unwrap();
        assert_eq!(gl.bound_framebuffer(), None);
        assert!(gl.bind_framebuffer(Some(fb)).is_err());
        assert!(gl.delete_framebuffer(fb).is_err());
    }

    #[test]
    fn deleting_texture_detaches_it() {
        let mut gl = RecordingApi::new();
        let tex = gl.gen_texture(4, 4, TextureFormat::Rgba8Unorm).unwrap();
        let fb = gl.gen_framebuffer().unwrap();
        gl.bind_framebuffer(Some(fb)).unwrap();
        gl.framebuffer_texture_2d(AttachmentType::ColorAttachment0, tex)
            .unwrap();
        gl.delete_texture(tex).unwrap();
        assert!(gl.attachments(fb).unwrap().is_empty());
        assert_eq!(
            gl.check_framebuffer_status(),
            FramebufferStatus::MissingAttachment
        );
    }

    #[test]
    fn status_without_framebuffer_is_undefined() {
        let mut gl = RecordingApi::new();
        assert_eq!(gl.check_framebuffer_status(), FramebufferStatus::Undefined);
    }

    #[test]
    fn color_texture_with_depth_renderbuffer_is_complete() {
        let mut gl = RecordingApi::new();
        let tex = gl.gen_texture(16, 8, TextureFormat::Rgba8Unorm).unwrap();
        let fb = gl.gen_framebuffer().unwrap();
        gl.bind_framebuffer(Some(fb)).unwrap();
        let rbo = gl.gen_renderbuffer().unwrap();
        gl.bind_renderbuffer(Some(rbo)).unwrap();
        gl.renderbuffer_storage(RenderbufferFormat::Depth16, 16, 8)
            .unwrap();
        gl.framebuffer_texture_2d(AttachmentType::ColorAttachment0, tex)
            .unwrap();
        gl.framebuffer_renderbuffer(AttachmentType::DepthAttachment, rbo)
            .unwrap();
        assert!(gl.check_framebuffer_status().is_complete());

        gl.resize_texture(tex, 32, 8).unwrap();
        assert_eq!(
            gl.check_framebuffer_status(),
            FramebufferStatus::IncompleteDimensions
        );
    }

    #[test]
    fn attrib_state_tracks_enable_and_disable() {
        let mut gl = RecordingApi::new();
        let pointer = AttribPointer {
            components: 3,
            kind: super::super::AttribType::Float,
            normalized: false,
            stride: 12,
            offset: 0,
        };
        gl.vertex_attrib_pointer(2, pointer, &[0u8; 36]).unwrap();
        gl.enable_vertex_attrib_array(2).unwrap();
        assert!(gl.is_attrib_enabled(2));
        assert_eq!(gl.attrib_pointer(2), Some(pointer));
        gl.disable_vertex_attrib_array(2).unwrap();
        assert!(!gl.is_attrib_enabled(2));

        let calls = gl.take_calls();
        assert_eq!(
            calls[0],
            GlCall::VertexAttribPointer {
                location: 2,
                pointer,
                elements: 3
            }
        );
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn five_components_rejected() {
        let mut gl = RecordingApi::new();
        let pointer = AttribPointer {
            components: 5,
            kind: super::super::AttribType::Float,
            normalized: false,
            stride: 20,
            offset: 0,
        };
        assert!(gl.vertex_attrib_pointer(0, pointer, &[]).is_err());
    }
}
