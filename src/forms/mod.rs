//! Field descriptors shared by the admin UI and the admin API.
//!
//! Every admin page is described by an ordered list of [`FieldSpec`]s. The
//! same list drives rendering on the client and payload validation on the
//! server, so a table's rules live in exactly one place ([`schema_for`]).

mod schema;

pub use schema::schema_for;

use crate::error::{DataError, FieldError};
use crate::models::TableKind;
use crate::utils::image_ref::ImageRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use validator::{ValidateEmail, ValidateUrl};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// Input kind of a field; interpreted by a single renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        #[serde(default)]
        max_length: Option<usize>,
    },
    Image,
    Select {
        #[serde(default)]
        options: Vec<SelectOption>,
        /// Table the UI loads options from when `options` is empty.
        #[serde(default)]
        source: Option<String>,
    },
    RichText {
        #[serde(default)]
        max_length: Option<usize>,
    },
    Number {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    Email,
    Url,
    /// Absolute URL, site path (`/…`) or in-page anchor (`#…`).
    Href,
    Slug,
    Length { min: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub rule: Option<FieldRule>,
    /// Value used on create when the field is omitted.
    #[serde(default)]
    pub default: Option<Value>,
    /// Fields that identify a row are only settable on create.
    #[serde(default)]
    pub create_only: bool,
}

impl FieldSpec {
    fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            required: false,
            rule: None,
            default: None,
            create_only: false,
        }
    }

    pub fn text(name: &str, label: &str, max_length: usize) -> Self {
        Self::new(
            name,
            label,
            FieldKind::Text {
                max_length: Some(max_length),
            },
        )
    }

    pub fn rich_text(name: &str, label: &str, max_length: usize) -> Self {
        Self::new(
            name,
            label,
            FieldKind::RichText {
                max_length: Some(max_length),
            },
        )
    }

    pub fn image(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Image)
    }

    pub fn select(name: &str, label: &str, options: Vec<SelectOption>) -> Self {
        Self::new(
            name,
            label,
            FieldKind::Select {
                options,
                source: None,
            },
        )
    }

    pub fn select_from(name: &str, label: &str, source: TableKind) -> Self {
        Self::new(
            name,
            label,
            FieldKind::Select {
                options: Vec::new(),
                source: Some(source.name().to_string()),
            },
        )
    }

    pub fn number(name: &str, label: &str, min: Option<i64>, max: Option<i64>) -> Self {
        Self::new(name, label, FieldKind::Number { min, max })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }

    /// Validates one value against this descriptor.
    /// Returns the user-facing message on failure.
    pub fn check(&self, value: Option<&Value>) -> Result<(), String> {
        let value = match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(v) => Some(v),
        };

        let Some(value) = value else {
            return if self.required {
                Err("This field is required".to_string())
            } else {
                Ok(())
            };
        };

        match &self.kind {
            FieldKind::Number { min, max } => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| "Must be a whole number".to_string())?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("Must be at least {}", min));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("Must be at most {}", max));
                    }
                }
                Ok(())
            }
            kind => {
                let text = value
                    .as_str()
                    .ok_or_else(|| "Must be text".to_string())?;
                self.check_text(kind, text)
            }
        }
    }

    fn check_text(&self, kind: &FieldKind, text: &str) -> Result<(), String> {
        match kind {
            FieldKind::Text { max_length } | FieldKind::RichText { max_length } => {
                if let Some(max) = max_length {
                    if text.chars().count() > *max {
                        return Err(format!("Must be at most {} characters", max));
                    }
                }
            }
            FieldKind::Image => match ImageRef::parse(Some(text)) {
                ImageRef::Url(_) => {}
                ImageRef::Inline { .. } => {
                    return Err("Upload the image instead of embedding it".to_string());
                }
                ImageRef::Empty => {}
            },
            FieldKind::Select { options, .. } => {
                if !options.is_empty() && !options.iter().any(|o| o.value == text) {
                    return Err(format!("'{}' is not a valid choice", text));
                }
            }
            FieldKind::Number { .. } => {}
        }

        match &self.rule {
            None => Ok(()),
            Some(FieldRule::Email) => {
                if text.validate_email() {
                    Ok(())
                } else {
                    Err("Invalid email format".to_string())
                }
            }
            Some(FieldRule::Url) => {
                if text.validate_url() {
                    Ok(())
                } else {
                    Err("Invalid URL".to_string())
                }
            }
            Some(FieldRule::Href) => {
                if text.starts_with('/') || text.starts_with('#') || text.validate_url() {
                    Ok(())
                } else {
                    Err("Must be a URL, a site path or an anchor".to_string())
                }
            }
            Some(FieldRule::Slug) => {
                let ok = !text.is_empty()
                    && text
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
                if ok {
                    Ok(())
                } else {
                    Err("Only lowercase letters, digits and dashes".to_string())
                }
            }
            Some(FieldRule::Length { min, max }) => {
                let len = text.chars().count();
                if len < *min || len > *max {
                    Err(format!("Must be between {} and {} characters", min, max))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Every field is checked; required fields must be present.
    Create,
    /// Only the fields present in the payload are checked.
    Update,
}

/// Validates `values` against `fields`, collecting every failing field.
pub fn validate_fields(
    fields: &[FieldSpec],
    values: &Map<String, Value>,
    mode: ValidationMode,
) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    for field in fields {
        let value = values.get(&field.name);
        if mode == ValidationMode::Update {
            if value.is_none() {
                continue;
            }
            if field.create_only {
                errors.push(FieldError::new(&field.name, "Cannot be changed after creation"));
                continue;
            }
        }
        if let Err(message) = field.check(value) {
            errors.push(FieldError::new(&field.name, message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Server-side payload validation for an admin table.
pub fn validate_payload(
    table: TableKind,
    values: &Map<String, Value>,
    mode: ValidationMode,
) -> Result<(), DataError> {
    validate_fields(&schema_for(table), values, mode).map_err(DataError::Validation)
}

/// Fills omitted fields that declare a default.
pub fn apply_defaults(table: TableKind, values: &mut Map<String, Value>) {
    for field in schema_for(table) {
        if let Some(default) = field.default {
            let missing = matches!(values.get(&field.name), None | Some(Value::Null));
            if missing {
                values.insert(field.name, default);
            }
        }
    }
}
