use super::{CrudBackend, CrudError, CrudStore};
use crate::error::{DataError, FieldError};
use crate::forms::{FieldKind, FieldSpec, SelectOption, ValidationMode, validate_fields};
use crate::models::{Patch, Record, apply_patch};
use crate::services::image_upload::{ImageUpload, ImageUploader, UploadedImage};
use crate::utils::image_ref::{ImageRef, ImageRefKind};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Textarea,
    Image,
    Select,
    Number,
}

/// View model for one input; everything a renderer needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub name: String,
    pub label: String,
    pub input: InputType,
    pub value: Value,
    pub required: bool,
    pub read_only: bool,
    pub options: Vec<SelectOption>,
    pub max_length: Option<usize>,
    /// How an image value is stored, so the preview can pick a renderer.
    pub image: Option<ImageRefKind>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum FormError {
    #[error("{} field(s) need attention", .0.len())]
    Invalid(Vec<FieldError>),

    #[error(transparent)]
    Backend(#[from] CrudError),

    #[error("Upload for '{field}' failed: {source}")]
    Upload { field: String, source: DataError },
}

/// A descriptor-driven create/edit form bound to one record.
///
/// Values survive every failure path: validation, backend and upload errors
/// are recorded alongside them and the user's input is never reset.
pub struct AdminForm<R> {
    fields: Vec<FieldSpec>,
    mode: FormMode,
    base: R,
    values: Map<String, Value>,
    errors: HashMap<String, String>,
    submit_error: Option<FormError>,
    loaded_options: HashMap<String, Vec<SelectOption>>,
}

impl<R: Record> AdminForm<R> {
    /// A form for a new row; `blank` supplies every column the form does
    /// not edit.
    pub fn create(fields: Vec<FieldSpec>, blank: R) -> Self {
        Self::with_mode(fields, blank, FormMode::Create)
    }

    pub fn edit(fields: Vec<FieldSpec>, record: R) -> Self {
        Self::with_mode(fields, record, FormMode::Edit)
    }

    fn with_mode(fields: Vec<FieldSpec>, base: R, mode: FormMode) -> Self {
        let current = serde_json::to_value(&base)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();

        let mut values = Map::new();
        for field in &fields {
            let value = match current.get(&field.name) {
                Some(v) if !v.is_null() => v.clone(),
                _ if mode == FormMode::Create => field.default.clone().unwrap_or(Value::Null),
                _ => Value::Null,
            };
            values.insert(field.name.clone(), value);
        }

        Self {
            fields,
            mode,
            base,
            values,
            errors: HashMap::new(),
            submit_error: None,
            loaded_options: HashMap::new(),
        }
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Sets a field value and clears that field's error.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        if self.fields.iter().any(|f| f.name == name) {
            self.values.insert(name.to_string(), value.into());
            self.errors.remove(name);
        }
    }

    /// Options for selects whose choices come from another table.
    pub fn set_options(&mut self, name: &str, options: Vec<SelectOption>) {
        self.loaded_options.insert(name.to_string(), options);
    }

    pub fn errors(&self) -> &HashMap<String, String> {
        &self.errors
    }

    pub fn field_error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).map(String::as_str)
    }

    pub fn submit_error(&self) -> Option<&FormError> {
        self.submit_error.as_ref()
    }

    pub fn render(&self) -> Vec<RenderedField> {
        self.fields
            .iter()
            .map(|field| {
                let value = self.values.get(&field.name).cloned().unwrap_or(Value::Null);
                let (input, options, max_length) = match &field.kind {
                    FieldKind::Text { max_length } => (InputType::Text, Vec::new(), *max_length),
                    FieldKind::RichText { max_length } => {
                        (InputType::Textarea, Vec::new(), *max_length)
                    }
                    FieldKind::Image => (InputType::Image, Vec::new(), None),
                    FieldKind::Number { .. } => (InputType::Number, Vec::new(), None),
                    FieldKind::Select { options, .. } => {
                        let options = self
                            .loaded_options
                            .get(&field.name)
                            .cloned()
                            .unwrap_or_else(|| options.clone());
                        (InputType::Select, options, None)
                    }
                };
                let image = (input == InputType::Image)
                    .then(|| ImageRef::parse(value.as_str()).kind());

                RenderedField {
                    name: field.name.clone(),
                    label: field.label.clone(),
                    input,
                    value,
                    required: field.required,
                    read_only: field.create_only && self.mode == FormMode::Edit,
                    options,
                    max_length,
                    image,
                    error: self.errors.get(&field.name).cloned(),
                }
            })
            .collect()
    }

    /// Effective descriptors: selects backed by loaded options are checked
    /// against them.
    fn effective_fields(&self) -> Vec<FieldSpec> {
        self.fields
            .iter()
            .cloned()
            .map(|mut field| {
                if let FieldKind::Select { options, .. } = &mut field.kind {
                    if let Some(loaded) = self.loaded_options.get(&field.name) {
                        *options = loaded.clone();
                    }
                }
                field
            })
            .collect()
    }

    /// Validates every field and records per-field errors.
    pub fn validate(&mut self) -> bool {
        self.errors.clear();
        let mut fields = self.effective_fields();
        if self.mode == FormMode::Edit {
            fields.retain(|f| !f.create_only);
        }
        match validate_fields(&fields, &self.values, ValidationMode::Create) {
            Ok(()) => true,
            Err(errors) => {
                for e in errors {
                    self.errors.insert(e.field, e.message);
                }
                false
            }
        }
    }

    fn patch(&self) -> Patch {
        self.fields
            .iter()
            .filter(|f| !(f.create_only && self.mode == FormMode::Edit))
            .filter_map(|f| {
                let value = match self.values.get(&f.name)? {
                    Value::String(s) if s.trim().is_empty() && !f.required => Value::Null,
                    v => v.clone(),
                };
                Some((f.name.clone(), value))
            })
            .collect()
    }

    /// Validates, then creates or updates through `store`.
    ///
    /// Nothing is sent when validation fails. On success the form adopts the
    /// saved row.
    pub async fn submit<B>(&mut self, store: &CrudStore<R, B>) -> Result<R, FormError>
    where
        B: CrudBackend<R>,
    {
        self.submit_error = None;

        if !self.validate() {
            let mut failing: Vec<FieldError> = self
                .errors
                .iter()
                .map(|(field, message)| FieldError::new(field.clone(), message.clone()))
                .collect();
            failing.sort_by(|a, b| a.field.cmp(&b.field));
            let err = FormError::Invalid(failing);
            self.submit_error = Some(err.clone());
            return Err(err);
        }

        let patch = self.patch();
        let result = match self.mode {
            FormMode::Create => match apply_patch(&self.base, &patch) {
                Ok(record) => store.create(record).await.map_err(FormError::from),
                Err(DataError::Validation(fields)) => Err(FormError::Invalid(fields)),
                Err(e) => Err(FormError::Invalid(vec![FieldError::new(
                    "record",
                    e.to_string(),
                )])),
            },
            FormMode::Edit => store
                .update(self.base.id(), patch)
                .await
                .map_err(FormError::from),
        };

        match result {
            Ok(saved) => {
                if self.mode == FormMode::Edit {
                    self.base = saved.clone();
                }
                Ok(saved)
            }
            Err(err) => {
                if let FormError::Backend(CrudError {
                    source: DataError::Validation(fields),
                    ..
                }) = &err
                {
                    for f in fields {
                        self.errors.insert(f.field.clone(), f.message.clone());
                    }
                }
                self.submit_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Uploads `file` and stores the resulting URL in `field`. A failure is
    /// recorded against that field only.
    pub async fn attach_image(
        &mut self,
        field: &str,
        folder: &str,
        file: ImageUpload,
        uploader: &dyn ImageUploader,
    ) -> Result<UploadedImage, FormError> {
        let is_image = self
            .fields
            .iter()
            .any(|f| f.name == field && f.kind == FieldKind::Image);
        if !is_image {
            return Err(FormError::Invalid(vec![FieldError::new(
                field,
                "Not an image field",
            )]));
        }

        match uploader.upload(folder, file).await {
            Ok(uploaded) => {
                self.set(field, uploaded.url.clone());
                Ok(uploaded)
            }
            Err(e) => {
                self.errors.insert(field.to_string(), e.to_string());
                Err(FormError::Upload {
                    field: field.to_string(),
                    source: e,
                })
            }
        }
    }
}
