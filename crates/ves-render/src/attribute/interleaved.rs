use std::mem::{offset_of, size_of};

use anyhow::Result;

use crate::api::{AttribPointer, AttribType, GpuApi};
use crate::state::{RenderState, VertexNormal};

use super::{VertexAttribute, attribute_location};

/// Three floats read from the interleaved [`VertexNormal`] array.
const fn vec3_pointer(offset: usize) -> AttribPointer {
    AttribPointer {
        components: 3,
        kind: AttribType::Float,
        normalized: false,
        stride: size_of::<VertexNormal>() as u32,
        offset: offset as u32,
    }
}

fn setup(
    name: &str,
    pointer: AttribPointer,
    gl: &mut dyn GpuApi,
    state: &RenderState<'_>,
) -> Result<()> {
    let Some(location) = attribute_location(name, state)? else {
        return Ok(());
    };
    log::trace!("`{name}` -> location {location}, offset {}", pointer.offset);
    gl.vertex_attrib_pointer(location, pointer, state.mapper.data().points_bytes())
}

fn activate(name: &str, gl: &mut dyn GpuApi, state: &RenderState<'_>) -> Result<()> {
    match attribute_location(name, state)? {
        Some(location) => gl.enable_vertex_attrib_array(location),
        None => Ok(()),
    }
}

fn deactivate(name: &str, gl: &mut dyn GpuApi, state: &RenderState<'_>) -> Result<()> {
    match attribute_location(name, state)? {
        Some(location) => gl.disable_vertex_attrib_array(location),
        None => Ok(()),
    }
}

macro_rules! interleaved_attribute {
    ($(#[$meta:meta])* $name:ident, $field:ident, $default:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            name: String,
        }

        impl $name {
            pub const DEFAULT_NAME: &'static str = $default;
            pub const POINTER: AttribPointer = vec3_pointer(offset_of!(VertexNormal, $field));

            pub fn new() -> Self {
                Self::with_name(Self::DEFAULT_NAME)
            }

            pub fn with_name(name: impl Into<String>) -> Self {
                Self { name: name.into() }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl VertexAttribute for $name {
            fn name(&self) -> &str {
                &self.name
            }

            fn setup_vertex_specific(
                &self,
                gl: &mut dyn GpuApi,
                state: &RenderState<'_>,
            ) -> Result<()> {
                setup(&self.name, Self::POINTER, gl, state)
            }

            fn activate_vertex_specific(
                &self,
                gl: &mut dyn GpuApi,
                state: &RenderState<'_>,
            ) -> Result<()> {
                activate(&self.name, gl, state)
            }

            fn deactivate_vertex_specific(
                &self,
                gl: &mut dyn GpuApi,
                state: &RenderState<'_>,
            ) -> Result<()> {
                deactivate(&self.name, gl, state)
            }
        }
    };
}

interleaved_attribute!(
    /// Vertex position, default input name `vertexPosition`.
    PositionVertexAttribute,
    point,
    "vertexPosition"
);

interleaved_attribute!(
    /// Vertex normal, default input name `vertexNormal`.
    NormalVertexAttribute,
    normal,
    "vertexNormal"
);
