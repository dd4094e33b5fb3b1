use std::collections::BTreeMap;

/// Attribute-location table of a linked shader program.
///
/// Compilation and linking live elsewhere; this type only answers which slot
/// a named vertex input was bound to.
#[derive(Debug, Clone, Default)]
pub struct ShaderProgram {
    name: String,
    attributes: BTreeMap<String, u32>,
}

impl ShaderProgram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds `attribute` to `location`, replacing any earlier binding of that name.
    ///
    /// Returns the previous location, if any.
    pub fn bind_attribute_location(
        &mut self,
        attribute: impl Into<String>,
        location: u32,
    ) -> Option<u32> {
        self.attributes.insert(attribute.into(), location)
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>, location: u32) -> Self {
        self.bind_attribute_location(attribute, location);
        self
    }

    /// Location of a named vertex input, `None` if the program has no such input.
    pub fn attribute_location(&self, attribute: &str) -> Option<u32> {
        self.attributes.get(attribute).copied()
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, u32)> {
        self.attributes.iter().map(|(name, &loc)| (name.as_str(), loc))
    }
}
