//! Dataset schemas returned by schema lookups

use serde::{Deserialize, Serialize};

/// A field in a dataset schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field path (top-level column name or nested path)
    pub name: String,

    /// Native type as reported by the source, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_type: Option<String>,
}

impl SchemaField {
    /// Create a field with no type information
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_type: None,
        }
    }

    /// Set the native type
    pub fn with_native_type(mut self, native_type: impl Into<String>) -> Self {
        self.native_type = Some(native_type.into());
        self
    }
}

/// An ordered collection of fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a schema from fields
    pub fn from_fields(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    /// Create a schema from bare field names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: names.into_iter().map(SchemaField::new).collect(),
        }
    }

    /// Find a field by name
    pub fn find_field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in schema order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_operations() {
        let schema = Schema::from_fields(vec![
            SchemaField::new("age").with_native_type("int"),
            SchemaField::new("firstname").with_native_type("VARCHAR(100)"),
        ]);

        assert_eq!(schema.field_names(), vec!["age", "firstname"]);
        assert!(schema.find_field("age").is_some());
        assert!(schema.find_field("lastname").is_none());
    }

    #[test]
    fn from_names() {
        let schema = Schema::from_names(["a", "b"]);
        assert_eq!(schema.field_names(), vec!["a", "b"]);
        assert!(Schema::new().is_empty());
    }
}
