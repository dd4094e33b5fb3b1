//! Vertex attributes: named shader inputs fed from the mapper's vertex data.
//!
//! An attribute resolves its slot through the material's shader program, then
//! issues pointer/enable/disable calls for that slot. Resolution happens on
//! every call, so rebinding a program's locations takes effect on the next draw.

mod interleaved;

pub use interleaved::{NormalVertexAttribute, PositionVertexAttribute};

use anyhow::{Context, Result};

use crate::api::GpuApi;
use crate::state::{RenderState, ShaderProgram};

/// A per-vertex shader input.
///
/// All hooks default to no-ops so attributes override only the stages they need.
pub trait VertexAttribute {
    fn name(&self) -> &str;

    /// Points the attribute's slot at its source data.
    fn setup_vertex_specific(&self, _gl: &mut dyn GpuApi, _state: &RenderState<'_>) -> Result<()> {
        Ok(())
    }

    fn activate_vertex_specific(
        &self,
        _gl: &mut dyn GpuApi,
        _state: &RenderState<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn deactivate_vertex_specific(
        &self,
        _gl: &mut dyn GpuApi,
        _state: &RenderState<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn update(&self, _state: &RenderState<'_>, _program: &ShaderProgram) {}
}

/// Slot of `name` in the material's program.
///
/// A material without a program is an error. A program without the input is
/// not: compilers drop unused inputs, so the attribute is skipped.
pub(crate) fn attribute_location(name: &str, state: &RenderState<'_>) -> Result<Option<u32>> {
    let program = state
        .material
        .shader()
        .with_context(|| format!("vertex attribute `{name}`: material has no shader program"))?;

    let location = program.attribute_location(name);
    if location.is_none() {
        log::debug!(
            "vertex attribute `{name}` not found in program `{}`; skipped",
            program.name()
        );
    }
    Ok(location)
}
