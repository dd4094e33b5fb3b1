//! GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a surface
//! - handing out a [`crate::api::WgpuApi`] bound to that device
//! - frame encoders and submission

mod gpu;

pub use gpu::{Gpu, GpuInit};
