use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result, bail, ensure};

use super::{
    AttachedImage, AttachedObject, AttachmentTable, AttachmentType, AttribPointer, AttribType,
    FramebufferHandle, FramebufferStatus, GpuApi, NameAllocator, RenderbufferFormat,
    RenderbufferHandle, TextureFormat, TextureHandle, completeness,
};

fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Depth16Unorm => wgpu::TextureFormat::Depth16Unorm,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn renderbuffer_format(format: RenderbufferFormat) -> wgpu::TextureFormat {
    match format {
        RenderbufferFormat::Depth16 => wgpu::TextureFormat::Depth16Unorm,
        RenderbufferFormat::Depth24Plus => wgpu::TextureFormat::Depth24Plus,
    }
}

fn vertex_format(pointer: &AttribPointer) -> Result<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    let format = match (pointer.kind, pointer.components, pointer.normalized) {
        (AttribType::Float, 1, _) => F::Float32,
        (AttribType::Float, 2, _) => F::Float32x2,
        (AttribType::Float, 3, _) => F::Float32x3,
        (AttribType::Float, 4, _) => F::Float32x4,
        (AttribType::UnsignedByte, 2, true) => F::Unorm8x2,
        (AttribType::UnsignedByte, 4, true) => F::Unorm8x4,
        (AttribType::UnsignedByte, 2, false) => F::Uint8x2,
        (AttribType::UnsignedByte, 4, false) => F::Uint8x4,
        (kind, n, _) => bail!("no vertex format for {n} x {kind:?}"),
    };
    Ok(format)
}

/// Buffer writes must be a multiple of `COPY_BUFFER_ALIGNMENT`.
fn padded(data: &[u8]) -> Cow<'_, [u8]> {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    let rem = data.len() % align;
    if rem == 0 {
        Cow::Borrowed(data)
    } else {
        let mut owned = data.to_vec();
        owned.resize(data.len() + align - rem, 0);
        Cow::Owned(owned)
    }
}

/// A sized wgpu image: texture storage or renderbuffer storage.
struct Image {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl Image {
    fn new(
        device: &wgpu::Device,
        label: &str,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        width: u32,
        height: u32,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format,
            width,
            height,
        }
    }
}

struct TextureEntry {
    image: Image,
    format: TextureFormat,
}

/// Client-side vertex array uploaded into a vertex buffer.
///
/// Keyed by the address of the caller's slice so that several attributes
/// pointing into one interleaved array share a buffer. The buffer grows in
/// place when the array does.
struct ClientArray {
    key: usize,
    buffer: wgpu::Buffer,
    capacity: u64,
}

struct AttribBinding {
    pointer: AttribPointer,
    format: wgpu::VertexFormat,
    array: u32,
    elements: usize,
}

struct DefaultFramebuffer {
    color: wgpu::TextureView,
    color_format: wgpu::TextureFormat,
    depth: Option<(wgpu::TextureView, wgpu::TextureFormat)>,
}

/// One vertex buffer slot worth of enabled attributes.
#[derive(Debug, Clone)]
pub struct VertexLayout {
    pub array_stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
    array: u32,
}

impl VertexLayout {
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &self.attributes,
        }
    }
}

/// Attachment formats of the bound framebuffer, for pipeline creation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TargetFormats {
    pub color: Option<wgpu::TextureFormat>,
    pub depth: Option<wgpu::TextureFormat>,
}

/// [`GpuApi`] backed by wgpu.
///
/// Framebuffer objects are attachment tables resolved to texture views when a
/// pass begins; renderbuffers are render-attachment-only textures. The default
/// framebuffer (`bind_framebuffer(None)`) is whatever view the caller last
/// supplied through [`WgpuApi::set_default_framebuffer`], typically a surface
/// texture for the current frame.
pub struct WgpuApi {
    device: wgpu::Device,
    queue: wgpu::Queue,

    names: NameAllocator,
    framebuffers: HashMap<FramebufferHandle, AttachmentTable>,
    renderbuffers: HashMap<RenderbufferHandle, Option<Image>>,
    textures: HashMap<TextureHandle, TextureEntry>,
    default_framebuffer: Option<DefaultFramebuffer>,

    bound_framebuffer: Option<FramebufferHandle>,
    bound_renderbuffer: Option<RenderbufferHandle>,
    bound_texture: Option<TextureHandle>,

    client_arrays: BTreeMap<u32, ClientArray>,
    next_array: u32,
    pointers: BTreeMap<u32, AttribBinding>,
    enabled: BTreeSet<u32>,
}

impl WgpuApi {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            device: device.clone(),
            queue: queue.clone(),
            names: NameAllocator::default(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            textures: HashMap::new(),
            default_framebuffer: None,
            bound_framebuffer: None,
            bound_renderbuffer: None,
            bound_texture: None,
            client_arrays: BTreeMap::new(),
            next_array: 0,
            pointers: BTreeMap::new(),
            enabled: BTreeSet::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Sets the images `bind_framebuffer(None)` renders into.
    pub fn set_default_framebuffer(
        &mut self,
        color: wgpu::TextureView,
        color_format: wgpu::TextureFormat,
        depth: Option<(wgpu::TextureView, wgpu::TextureFormat)>,
    ) {
        self.default_framebuffer = Some(DefaultFramebuffer {
            color,
            color_format,
            depth,
        });
    }

    pub fn clear_default_framebuffer(&mut self) {
        self.default_framebuffer = None;
    }

    /// The wgpu texture behind a texture handle, e.g. for readback or sampling.
    pub fn texture(&self, texture: TextureHandle) -> Option<&wgpu::Texture> {
        self.textures.get(&texture).map(|t| &t.image.texture)
    }

    pub fn texture_view(&self, texture: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures.get(&texture).map(|t| &t.image.view)
    }

    pub fn bound_texture(&self) -> Option<TextureHandle> {
        self.bound_texture
    }

    fn attachment_image(&self, object: AttachedObject) -> Option<&Image> {
        match object {
            AttachedObject::Texture(tex) => self.textures.get(&tex).map(|t| &t.image),
            AttachedObject::Renderbuffer(rbo) => self.renderbuffers.get(&rbo)?.as_ref(),
        }
    }

    fn bound_table(&self) -> Result<Option<&AttachmentTable>> {
        match self.bound_framebuffer {
            None => Ok(None),
            Some(fb) => self
                .framebuffers
                .get(&fb)
                .map(Some)
                .with_context(|| format!("bound framebuffer {fb} was deleted")),
        }
    }

    fn bound_table_mut(&mut self) -> Result<&mut AttachmentTable> {
        let fb = self
            .bound_framebuffer
            .context("no framebuffer object bound")?;
        self.framebuffers
            .get_mut(&fb)
            .with_context(|| format!("bound framebuffer {fb} was deleted"))
    }

    /// Resolves the color and depth views of the bound framebuffer.
    fn bound_views(
        &self,
    ) -> Result<(
        wgpu::TextureView,
        wgpu::TextureFormat,
        Option<(wgpu::TextureView, wgpu::TextureFormat)>,
    )> {
        let Some(table) = self.bound_table()? else {
            let default = self
                .default_framebuffer
                .as_ref()
                .context("default framebuffer bound but none was provided")?;
            return Ok((
                default.color.clone(),
                default.color_format,
                default.depth.clone(),
            ));
        };

        let color = table
            .get(&AttachmentType::ColorAttachment0)
            .and_then(|&obj| self.attachment_image(obj))
            .context("framebuffer has no color attachment")?;
        let depth = table
            .get(&AttachmentType::DepthAttachment)
            .and_then(|&obj| self.attachment_image(obj))
            .map(|img| (img.view.clone(), img.format));

        Ok((color.view.clone(), color.format, depth))
    }

    /// Attachment formats of the bound framebuffer.
    pub fn target_formats(&self) -> Result<TargetFormats> {
        let (_, color, depth) = self.bound_views()?;
        Ok(TargetFormats {
            color: Some(color),
            depth: depth.map(|(_, f)| f),
        })
    }

    /// Begins a render pass on the bound framebuffer.
    ///
    /// `clear = None` loads existing contents; otherwise color is cleared to
    /// `clear` and depth to 1.0.
    pub fn begin_render_pass<'e>(
        &mut self,
        encoder: &'e mut wgpu::CommandEncoder,
        clear: Option<wgpu::Color>,
    ) -> Result<wgpu::RenderPass<'e>> {
        if self.bound_framebuffer.is_some() {
            let status = self.check_framebuffer_status();
            ensure!(status.is_complete(), "framebuffer incomplete: {status:?}");
        }
        let (color, _, depth) = self.bound_views()?;

        let color_load = clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);
        let depth_load = if clear.is_some() {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };

        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ves framebuffer pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth.as_ref().map(|(view, _)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        Ok(pass)
    }

    /// Buffer layouts for the enabled attributes, one per client array, in
    /// ascending order of their lowest location.
    pub fn vertex_layouts(&self) -> Vec<VertexLayout> {
        let mut layouts: Vec<VertexLayout> = Vec::new();
        for &location in &self.enabled {
            let Some(binding) = self.pointers.get(&location) else {
                continue;
            };
            let attribute = wgpu::VertexAttribute {
                format: binding.format,
                offset: u64::from(binding.pointer.offset),
                shader_location: location,
            };
            let stride = u64::from(binding.pointer.stride);
            match layouts
                .iter_mut()
                .find(|l| l.array == binding.array && l.array_stride == stride)
            {
                Some(layout) => layout.attributes.push(attribute),
                None => layouts.push(VertexLayout {
                    array_stride: stride,
                    attributes: vec![attribute],
                    array: binding.array,
                }),
            }
        }
        layouts
    }

    /// Binds the buffers behind `layouts` to slots `0..layouts.len()`.
    pub fn set_vertex_buffers(&self, pass: &mut wgpu::RenderPass<'_>, layouts: &[VertexLayout]) {
        for (slot, layout) in layouts.iter().enumerate() {
            if let Some(array) = self.client_arrays.get(&layout.array) {
                pass.set_vertex_buffer(slot as u32, array.buffer.slice(..));
            }
        }
    }

    /// Vertices drawable with the enabled attributes (shortest array wins).
    pub fn drawable_vertex_count(&self) -> usize {
        self.enabled
            .iter()
            .filter_map(|loc| self.pointers.get(loc))
            .map(|b| b.elements)
            .min()
            .unwrap_or(0)
    }

    /// Drops every attribute pointer and uploaded client array.
    pub fn reset_vertex_arrays(&mut self) {
        self.pointers.clear();
        self.enabled.clear();
        self.client_arrays.clear();
    }

    fn upload_client_array(&mut self, data: &[u8]) -> u32 {
        let key = data.as_ptr() as usize;
        let bytes = padded(data);
        let needed = bytes.len() as u64;

        let id = match self.client_arrays.iter().find(|(_, a)| a.key == key) {
            Some((&id, _)) => id,
            None => {
                let id = self.next_array;
                self.next_array = self.next_array.wrapping_add(1);
                id
            }
        };

        let current = self.client_arrays.get(&id).map(|a| a.capacity);
        if current.is_none_or(|capacity| capacity < needed) {
            let capacity = grown_capacity(current, needed);
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("ves client vertex array"),
                size: capacity,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.client_arrays.insert(
                id,
                ClientArray {
                    key,
                    buffer,
                    capacity,
                },
            );
            log::trace!("client array {id}: allocated {capacity} bytes");
        }

        if let Some(array) = self.client_arrays.get(&id) {
            self.queue.write_buffer(&array.buffer, 0, &bytes);
        }
        id
    }
}

impl GpuApi for WgpuApi {
    fn gen_framebuffer(&mut self) -> Result<FramebufferHandle> {
        let fb = self.names.next_framebuffer()?;
        self.framebuffers.insert(fb, AttachmentTable::new());
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
        Ok(())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> Result<()> {
        if let Some(fb) = framebuffer {
            ensure!(self.framebuffers.contains_key(&fb), "bind of unknown framebuffer {fb}");
        }
        self.bound_framebuffer = framebuffer;
        Ok(())
    }

    fn gen_renderbuffer(&mut self) -> Result<RenderbufferHandle> {
        let rbo = self.names.next_renderbuffer()?;
        self.renderbuffers.insert(rbo, None);
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
        Ok(())
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>) -> Result<()> {
        if let Some(rbo) = renderbuffer {
            ensure!(self.renderbuffers.contains_key(&rbo), "bind of unknown renderbuffer {rbo}");
        }
        self.bound_renderbuffer = renderbuffer;
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
        let image = Image::new(
            &self.device,
            &format!("ves renderbuffer {rbo}"),
            renderbuffer_format(format),
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            width,
            height,
        );
        let slot = self
            .renderbuffers
            .get_mut(&rbo)
            .with_context(|| format!("bound renderbuffer {rbo} was deleted"))?;
        *slot = Some(image);
        log::debug!("{rbo}: {format:?} storage {width}x{height}");
        Ok(())
    }

    fn gen_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<TextureHandle> {
        ensure!(width > 0 && height > 0, "texture of zero size");
        let tex = self.names.next_texture()?;
        let image = Image::new(
            &self.device,
            &format!("ves texture {tex}"),
            texture_format(format),
            texture_usage(format),
            width,
            height,
        );
        self.textures.insert(tex, TextureEntry { image, format });
        log::debug!("{tex}: {format:?} {width}x{height}");
        Ok(tex)
    }

    fn resize_texture(&mut self, texture: TextureHandle, width: u32, height: u32) -> Result<()> {
        ensure!(width > 0 && height > 0, "texture of zero size");
        let entry = self
            .textures
            .get_mut(&texture)
            .with_context(|| format!("resize of unknown texture {texture}"))?;
        entry.image = Image::new(
            &self.device,
            &format!("ves texture {texture}"),
            texture_format(entry.format),
            texture_usage(entry.format),
            width,
            height,
        );
        log::debug!("{texture}: resized to {width}x{height}");
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
        Ok(())
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) -> Result<()> {
        if let Some(tex) = texture {
            ensure!(self.textures.contains_key(&tex), "bind of unknown texture {tex}");
        }
        self.bound_texture = texture;
        Ok(())
    }

    fn framebuffer_texture_2d(
        &mut self,
        attachment: AttachmentType,
        texture: TextureHandle,
    ) -> Result<()> {
        ensure!(self.textures.contains_key(&texture), "attach of unknown texture {texture}");
        self.bound_table_mut()?
            .insert(attachment, AttachedObject::Texture(texture));
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
        self.bound_table_mut()?
            .insert(attachment, AttachedObject::Renderbuffer(renderbuffer));
        Ok(())
    }

    fn check_framebuffer_status(&mut self) -> FramebufferStatus {
        let Ok(Some(table)) = self.bound_table() else {
            return FramebufferStatus::Undefined;
        };
        let images: Vec<_> = table
            .iter()
            .map(|(&attachment, &object)| {
                let image = self.attachment_image(object);
                AttachedImage {
                    attachment,
                    size: image.map(|i| (i.width, i.height)),
                    depth_format: image.is_some_and(|i| i.format.is_depth_stencil_format()),
                }
            })
            .collect();
        completeness(&images)
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        pointer: AttribPointer,
        data: &[u8],
    ) -> Result<()> {
        let format = vertex_format(&pointer)?;
        ensure!(
            u64::from(pointer.offset) + format.size() <= u64::from(pointer.stride),
            "attribute {location}: offset {} does not fit stride {}",
            pointer.offset,
            pointer.stride
        );
        ensure!(!data.is_empty(), "attribute {location}: empty client array");

        let array = self.upload_client_array(data);
        self.pointers.insert(
            location,
            AttribBinding {
                pointer,
                format,
                array,
                elements: pointer.element_count(data.len()),
            },
        );

        let pointers = &self.pointers;
        self.client_arrays
            .retain(|id, _| pointers.values().any(|b| b.array == *id));
        Ok(())
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) -> Result<()> {
        self.enabled.insert(location);
        Ok(())
    }

    fn disable_vertex_attrib_array(&mut self, location: u32) -> Result<()> {
        self.enabled.remove(&location);
        Ok(())
    }
}

fn texture_usage(format: TextureFormat) -> wgpu::TextureUsages {
    if format.is_depth() {
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
    } else {
        wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST
    }
}

/// Buffer size for a client array needing `needed` bytes. Growth at least
/// doubles the current size.
fn grown_capacity(current: Option<u64>, needed: u64) -> u64 {
    current.map_or(needed, |capacity| needed.max(capacity.saturating_mul(2)))
}
