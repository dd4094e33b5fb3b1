//! Collaborators the render path reads from: shader program, material and
//! geometry, bundled per draw as a [`RenderState`].

mod mapper;
mod material;
mod shader;

pub use mapper::{Mapper, TriangleData, VertexNormal};
pub use material::Material;
pub use shader::ShaderProgram;

use anyhow::Result;

use crate::api::GpuApi;

/// Everything a render target or vertex attribute may consult for one draw.
#[derive(Debug, Copy, Clone)]
pub struct RenderState<'a> {
    pub material: &'a Material,
    pub mapper: &'a Mapper,
}

impl<'a> RenderState<'a> {
    #[inline]
    pub fn new(material: &'a Material, mapper: &'a Mapper) -> Self {
        Self { material, mapper }
    }

    /// Points every vertex attribute of the material at the mapper's data.
    pub fn setup_vertex_attributes(&self, gl: &mut dyn GpuApi) -> Result<()> {
        for attribute in self.material.vertex_attributes() {
            attribute.setup_vertex_specific(gl, self)?;
        }
        Ok(())
    }

    pub fn activate_vertex_attributes(&self, gl: &mut dyn GpuApi) -> Result<()> {
        for attribute in self.material.vertex_attributes() {
            attribute.activate_vertex_specific(gl, self)?;
        }
        Ok(())
    }

    pub fn deactivate_vertex_attributes(&self, gl: &mut dyn GpuApi) -> Result<()> {
        for attribute in self.material.vertex_attributes() {
            attribute.deactivate_vertex_specific(gl, self)?;
        }
        Ok(())
    }

    /// Gives each attribute a chance to refresh per-draw state against the
    /// material's program. No-op when the material has no shader.
    pub fn update_vertex_attributes(&self) {
        let Some(program) = self.material.shader() else {
            return;
        };
        for attribute in self.material.vertex_attributes() {
            attribute.update(self, program);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::attribute::VertexAttribute;

    type UpdateLog = Rc<RefCell<Vec<(String, Option<u32>)>>>;

    /// Records the program and resolved slot it was updated against.
    struct Tracked {
        name: &'static str,
        log: UpdateLog,
    }

    impl VertexAttribute for Tracked {
        fn name(&self) -> &str {
            self.name
        }

        fn update(&self, _state: &RenderState<'_>, program: &ShaderProgram) {
            self.log.borrow_mut().push((
                program.name().to_owned(),
                program.attribute_location(self.name),
            ));
        }
    }

    fn material_with(program: Option<ShaderProgram>, log: &UpdateLog) -> Material {
        let mut material = Material::new();
        material.set_shader(program.map(Rc::new));
        for name in ["vertexPosition", "vertexNormal"] {
            material.add_vertex_attribute(Box::new(Tracked {
                name,
                log: Rc::clone(log),
            }));
        }
        material
    }

    #[test]
    fn update_visits_every_attribute_with_the_program() {
        let log = UpdateLog::default();
        let program = ShaderProgram::new("lit").with_attribute("vertexPosition", 2);
        let material = material_with(Some(program), &log);
        let mapper = Mapper::default();

        RenderState::new(&material, &mapper).update_vertex_attributes();
        assert_eq!(
            *log.borrow(),
            vec![("lit".to_owned(), Some(2)), ("lit".to_owned(), None)]
        );
    }

    #[test]
    fn update_without_program_does_nothing() {
        let log = UpdateLog::default();
        let material = material_with(None, &log);
        let mapper = Mapper::default();

        RenderState::new(&material, &mapper).update_vertex_attributes();
        assert!(log.borrow().is_empty());
    }
}
