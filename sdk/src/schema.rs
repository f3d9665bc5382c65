//! Declared input schemas
//!
//! A capability declares the fields it accepts. The registry validates
//! arguments against the schema before the capability runs, so a malformed
//! request never reaches an external service or the store.
//!
//! Fields not named by the schema are allowed through untouched.

use crate::types::CapabilityArgs;
use serde_json::Value;

/// Expected JSON type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Bool,
    Object,
    Any,
    /// A string restricted to a fixed set of values
    OneOf(Vec<&'static str>),
}

impl FieldKind {
    pub fn one_of(values: &[&'static str]) -> Self {
        Self::OneOf(values.to_vec())
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_u64() || value.is_i64(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Any => true,
            Self::OneOf(values) => value
                .as_str()
                .map(|s| values.contains(&s))
                .unwrap_or(false),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Bool => "bool".to_string(),
            Self::Object => "object".to_string(),
            Self::Any => "any".to_string(),
            Self::OneOf(values) => format!("one of [{}]", values.join(", ")),
        }
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// Input schema of a capability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    /// A schema with no declared fields. Accepts any object.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: false,
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Check arguments against the schema.
    ///
    /// Returns the first violation found, in declaration order. A `null`
    /// value counts as absent.
    pub fn validate(&self, args: &CapabilityArgs) -> Result<(), String> {
        for field in &self.fields {
            match args.params.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(format!("missing required field '{}'", field.name));
                    }
                }
                Some(value) => {
                    if !field.kind.accepts(value) {
                        return Err(format!(
                            "field '{}' must be {}",
                            field.name,
                            field.kind.describe()
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leads_schema() -> InputSchema {
        InputSchema::empty()
            .required("action", FieldKind::one_of(&["add", "view"]))
            .optional("id", FieldKind::Integer)
            .optional("lead", FieldKind::Object)
    }

    #[test]
    fn test_valid_args_pass() {
        let args = CapabilityArgs::new()
            .with_param("action", json!("add"))
            .with_param("lead", json!({"name": "Ana"}));
        assert!(leads_schema().validate(&args).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let err = leads_schema().validate(&CapabilityArgs::new()).unwrap_err();
        assert!(err.contains("action"));
    }

    #[test]
    fn test_enum_violation() {
        let args = CapabilityArgs::new().with_param("action", json!("delete"));
        let err = leads_schema().validate(&args).unwrap_err();
        assert!(err.contains("one of [add, view]"));
    }

    #[test]
    fn test_type_violation_on_optional() {
        let args = CapabilityArgs::new()
            .with_param("action", json!("view"))
            .with_param("id", json!("seven"));
        let err = leads_schema().validate(&args).unwrap_err();
        assert!(err.contains("'id' must be integer"));
    }

    #[test]
    fn test_null_counts_as_absent() {
        let args = CapabilityArgs::new()
            .with_param("action", json!("view"))
            .with_param("id", Value::Null);
        assert!(leads_schema().validate(&args).is_ok());
    }

    #[test]
    fn test_undeclared_fields_allowed() {
        let args = CapabilityArgs::new()
            .with_param("action", json!("view"))
            .with_param("input", json!("task text"));
        assert!(leads_schema().validate(&args).is_ok());
    }
}
