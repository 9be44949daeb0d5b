//! Schema registry keyed by `(name, version)`.

use std::collections::HashMap;

use serde_json::Value;

use crate::validators::{self, ValidationError};

/// Primitive type accepted for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// Integer-valued JSON number.
    Integer,
    /// Any finite JSON number.
    Number,
    Object,
    /// String or explicit null (e.g. `tf` on non-kline events).
    NullableString,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.as_f64().is_some_and(f64::is_finite),
            FieldType::Object => value.is_object(),
            FieldType::NullableString => value.is_string() || value.is_null(),
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Object => "object",
            FieldType::NullableString => "string|null",
        }
    }
}

/// One top-level field constraint.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
        }
    }
}

type ConstraintFn = fn(&Value) -> Result<(), ValidationError>;

/// A versioned schema: field table plus optional domain constraint hook.
#[derive(Debug, Clone)]
pub struct SchemaDef {
    pub name: &'static str,
    pub version: &'static str,
    pub fields: Vec<FieldSpec>,
    pub constraint: Option<ConstraintFn>,
}

impl SchemaDef {
    /// Validate `value` structurally, then run the domain constraint.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let obj = value
            .as_object()
            .ok_or(ValidationError::NotAnObject)?;
        for field in &self.fields {
            match obj.get(field.name) {
                None => {
                    if field.required {
                        return Err(ValidationError::MissingField(field.name));
                    }
                }
                Some(v) => {
                    // a required field present as null only passes for nullable types
                    if v.is_null() && field.ty != FieldType::NullableString {
                        return Err(ValidationError::MissingField(field.name));
                    }
                    if !field.ty.matches(v) {
                        return Err(ValidationError::WrongType {
                            field: field.name,
                            expected: field.ty.expected(),
                        });
                    }
                }
            }
        }
        if let Some(check) = self.constraint {
            check(value)?;
        }
        Ok(())
    }
}

/// Registry of schemas keyed by `(name, version)`.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<(&'static str, &'static str), SchemaDef>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the ingest/features/signal v2 schemas.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(validators::ingest_v2());
        registry.register(validators::features_v2());
        registry.register(validators::signal_v2());
        registry
    }

    pub fn register(&mut self, schema: SchemaDef) {
        self.schemas.insert((schema.name, schema.version), schema);
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&SchemaDef> {
        self.schemas
            .iter()
            .find(|((n, v), _)| *n == name && *v == version)
            .map(|(_, schema)| schema)
    }

    /// Validate a payload against a registered schema.
    pub fn validate(&self, name: &str, version: &str, value: &Value) -> Result<(), ValidationError> {
        let schema = self
            .get(name, version)
            .ok_or_else(|| ValidationError::UnknownSchema {
                name: name.to_string(),
                version: version.to_string(),
            })?;
        schema.validate(value)
    }
}
