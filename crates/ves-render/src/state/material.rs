use std::fmt;
use std::rc::Rc;

use crate::attribute::VertexAttribute;

use super::ShaderProgram;

/// The parts of a material the vertex path reads: its shader program and the
/// vertex attributes it feeds.
#[derive(Default)]
pub struct Material {
    shader: Option<Rc<ShaderProgram>>,
    vertex_attributes: Vec<Box<dyn VertexAttribute>>,
}

impl Material {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shader(shader: Rc<ShaderProgram>) -> Self {
        Self {
            shader: Some(shader),
            vertex_attributes: Vec::new(),
        }
    }

    pub fn shader(&self) -> Option<&ShaderProgram> {
        self.shader.as_deref()
    }

    pub fn set_shader(&mut self, shader: Option<Rc<ShaderProgram>>) {
        self.shader = shader;
    }

    /// Adds a vertex attribute. An attribute with the same name is replaced.
    pub fn add_vertex_attribute(&mut self, attribute: Box<dyn VertexAttribute>) {
        self.vertex_attributes
            .retain(|existing| existing.name() != attribute.name());
        self.vertex_attributes.push(attribute);
    }

    pub fn remove_vertex_attribute(&mut self, name: &str) -> Option<Box<dyn VertexAttribute>> {
        let index = self
            .vertex_attributes
            .iter()
            .position(|a| a.name() == name)?;
        Some(self.vertex_attributes.remove(index))
    }

    pub fn vertex_attribute(&self, name: &str) -> Option<&dyn VertexAttribute> {
        self.vertex_attributes
            .iter()
            .find(|a| a.name() == name)
            .map(|a| -> &dyn VertexAttribute { a.as_ref() })
    }

    pub fn vertex_attributes(&self) -> impl Iterator<Item = &dyn VertexAttribute> {
        self.vertex_attributes
            .iter()
            .map(|a| -> &dyn VertexAttribute { a.as_ref() })
    }
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("shader", &self.shader.as_ref().map(|s| s.name().to_owned()))
            .field(
                "vertex_attributes",
                &self.vertex_attributes().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
