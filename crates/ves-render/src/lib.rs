//! ves-render crate.
//!
//! Render targets and vertex attributes for a GL ES-style scene renderer,
//! issued through a GL-shaped command surface backed by wgpu.

pub mod api;
pub mod attribute;
pub mod device;
pub mod logging;
pub mod state;
pub mod target;
pub mod texture;

pub use api::{GpuApi, RecordingApi, WgpuApi};
pub use attribute::{NormalVertexAttribute, PositionVertexAttribute, VertexAttribute};
pub use state::{Mapper, Material, RenderState, ShaderProgram, TriangleData, VertexNormal};
pub use target::{
    AttachmentType, DefaultRenderTarget, FboRenderTarget, ImplementationType, RenderTarget,
    RenderToTexture,
};
pub use texture::Texture;
