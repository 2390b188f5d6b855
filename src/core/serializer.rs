//! Adapter between untyped call arguments and persisted model rows.
//!
//! A [`Serializer`] checks keyword arguments against a model's field table,
//! creates or updates rows through a [`Store`], and flattens the bound row
//! back into a [`Record`].

use crate::domain::model::{Record, PROFILE_SCHEMA};
use crate::domain::ports::{ChildRecord, Store};
use crate::domain::schema::{FieldDescriptor, FieldKind, ModelSchema};
use crate::utils::error::{Result, ServiceError};
use serde_json::Value;
use std::sync::Arc;

/// Per-serializer settings: the target model and the fields that are never
/// accepted (read-only) or never emitted (write-only).
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializerMeta {
    pub model: Option<&'static ModelSchema>,
    pub read_only: &'static [&'static str],
    pub write_only: &'static [&'static str],
}

pub trait SerializerConfig {
    fn meta() -> SerializerMeta;
}

pub struct ProfileSerializer;

impl SerializerConfig for ProfileSerializer {
    fn meta() -> SerializerMeta {
        SerializerMeta {
            model: Some(&PROFILE_SCHEMA),
            ..SerializerMeta::default()
        }
    }
}

/// Field sets derived from a [`SerializerMeta`]. Build it once and share it.
#[derive(Debug, Clone)]
pub struct SerializerDescriptor {
    model: &'static ModelSchema,
    read_only: Vec<&'static str>,
    write_only: Vec<&'static str>,
    required: Vec<&'static FieldDescriptor>,
}

impl SerializerDescriptor {
    pub fn from_meta(meta: &SerializerMeta) -> Result<Self> {
        let model = meta.model.ok_or_else(|| {
            ServiceError::configuration("Must set a model on the serializer meta")
        })?;
        model.check()?;

        for name in meta.read_only.iter().chain(meta.write_only) {
            if model.field(name).is_none() {
                return Err(ServiceError::configuration(format!(
                    "serializer option names '{}', which {} does not declare",
                    name, model.name
                )));
            }
        }

        let required = model
            .fields
            .iter()
            .filter(|f| !f.primary_key && !meta.read_only.contains(&f.name))
            .collect();

        Ok(Self {
            model,
            read_only: meta.read_only.to_vec(),
            write_only: meta.write_only.to_vec(),
            required,
        })
    }

    pub fn for_model(model: &'static ModelSchema) -> Result<Self> {
        Self::from_meta(&SerializerMeta {
            model: Some(model),
            ..SerializerMeta::default()
        })
    }

    pub fn of<C: SerializerConfig>() -> Result<Arc<Self>> {
        Self::from_meta(&C::meta()).map(Arc::new)
    }

    pub fn model(&self) -> &'static ModelSchema {
        self.model
    }

    pub fn read_only(&self) -> &[&'static str] {
        &self.read_only
    }

    pub fn write_only(&self) -> &[&'static str] {
        &self.write_only
    }

    /// Non-key fields that are not read-only, in declaration order.
    pub fn required(&self) -> &[&'static FieldDescriptor] {
        &self.required
    }

    fn is_emitted(&self, field: &FieldDescriptor) -> bool {
        !field.is_reverse_relation() && !self.write_only.contains(&field.name)
    }
}

enum Finding {
    Violation(String),
    Nested {
        field: &'static str,
        related: &'static ModelSchema,
        payload: Record,
    },
}

/// Checks presence, exact type and uniqueness of each required field.
/// Mapping payloads for reverse relations are handed back as
/// [`Finding::Nested`] when `allow_nested` is set; otherwise they are a type
/// violation.
async fn scan(
    store: &dyn Store,
    descriptor: &SerializerDescriptor,
    kwargs: &Record,
    allow_nested: bool,
) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();

    for field in descriptor.required() {
        let Some(value) = kwargs.get(field.name) else {
            if !field.is_relation_reference() {
                findings.push(Finding::Violation(format!("'{}' required", field.name)));
            }
            continue;
        };

        match (field.kind, value) {
            (FieldKind::ReverseRelation { related, .. }, Value::Object(map)) if allow_nested => {
                findings.push(Finding::Nested {
                    field: field.name,
                    related,
                    payload: Record::from(map.clone()),
                });
            }
            (FieldKind::ReverseRelation { .. }, _) => {
                findings.push(Finding::Violation(format!("'{}' Invalid type", field.name)));
            }
            _ if !field.matches_type(value) => {
                tracing::debug!(
                    "'{}' expected {}, got {}",
                    field.name,
                    field.kind.type_name(),
                    value
                );
                findings.push(Finding::Violation(format!("'{}' Invalid type", field.name)));
            }
            _ => {}
        }

        if field.unique
            && field.is_column()
            && store
                .find_first(descriptor.model(), field.name, value)
                .await?
                .is_some()
        {
            findings.push(Finding::Violation(format!("'{}' must be unique", field.name)));
        }
    }

    Ok(findings)
}

pub struct Serializer {
    descriptor: Arc<SerializerDescriptor>,
    store: Arc<dyn Store>,
    instance: Option<Record>,
}

impl Serializer {
    pub fn new(
        descriptor: Arc<SerializerDescriptor>,
        store: Arc<dyn Store>,
        instance: Option<Record>,
    ) -> Self {
        Self {
            descriptor,
            store,
            instance,
        }
    }

    /// Builds the descriptor on the spot; fails with a configuration error
    /// when `meta` names no model or an invalid one.
    pub fn from_meta(
        meta: &SerializerMeta,
        store: Arc<dyn Store>,
        instance: Option<Record>,
    ) -> Result<Self> {
        let descriptor = SerializerDescriptor::from_meta(meta)?;
        Ok(Self::new(Arc::new(descriptor), store, instance))
    }

    pub fn descriptor(&self) -> &SerializerDescriptor {
        &self.descriptor
    }

    pub fn instance(&self) -> Option<&Record> {
        self.instance.as_ref()
    }

    /// Returns every violation found in `kwargs`. With `raise_on_failure`, a
    /// non-empty list is returned as one `InvalidArgument` error instead.
    pub async fn validate(&self, kwargs: &Record, raise_on_failure: bool) -> Result<Vec<String>> {
        let store = self.store.as_ref();
        let mut violations = Vec::new();

        for finding in scan(store, &self.descriptor, kwargs, true).await? {
            match finding {
                Finding::Violation(message) => violations.push(message),
                Finding::Nested {
                    field,
                    related,
                    payload,
                } => {
                    let nested = SerializerDescriptor::for_model(related)?;
                    for inner in scan(store, &nested, &payload, false).await? {
                        if let Finding::Violation(message) = inner {
                            violations.push(format!("'{}' {}", field, message));
                        }
                    }
                }
            }
        }

        if raise_on_failure && !violations.is_empty() {
            let message = violations.join(", ");
            tracing::debug!("{} rejected: {}", self.descriptor.model().name, message);
            return Err(ServiceError::invalid_argument(message));
        }
        Ok(violations)
    }

    pub async fn create(&mut self, kwargs: Record) -> Result<Record> {
        self.validate(&kwargs, true).await?;
        let row = self.store.insert(self.descriptor.model(), kwargs).await?;
        self.instance = Some(row);
        self.serialize()
    }

    /// Creates the row and, for each reverse relation payload present, one
    /// child row pointing at it. Parent and children commit together.
    pub async fn validate_and_create(&mut self, mut kwargs: Record) -> Result<bool> {
        self.validate(&kwargs, true).await?;

        let mut children = Vec::new();
        for field in self.descriptor.required() {
            let FieldKind::ReverseRelation {
                related,
                relation_field,
            } = field.kind
            else {
                continue;
            };
            match kwargs.remove(field.name) {
                Some(Value::Object(map)) => children.push(ChildRecord {
                    schema: related,
                    relation_field,
                    values: Record::from(map),
                }),
                Some(_) => {
                    return Err(ServiceError::invalid_argument(format!(
                        "'{}' Invalid type",
                        field.name
                    )))
                }
                None => {}
            }
        }

        let model = self.descriptor.model();
        let child_count = children.len();
        let parent = self.store.insert_graph(model, kwargs, children).await?;
        tracing::debug!(
            "Created {} {:?} with {} child row(s)",
            model.name,
            parent.pk(model),
            child_count
        );
        self.instance = Some(parent);
        Ok(true)
    }

    /// Assigns every supplied value onto the bound row and saves it.
    ///
    /// Values are not validated here. Callers that accept untrusted input
    /// must run [`Serializer::validate`] first. The primary key is the one
    /// exception: a value other than the bound row's own identity is
    /// rejected. The bound row only changes once the save succeeds.
    pub async fn update(&mut self, mut kwargs: Record) -> Result<Record> {
        let model = self.descriptor.model();
        let current = self.instance.as_ref().ok_or(ServiceError::NotInstantiated)?;

        if let Some(pk_field) = model.primary_key() {
            if let Some(requested) = kwargs.remove(pk_field.name) {
                if current.get(pk_field.name) != Some(&requested) {
                    return Err(ServiceError::invalid_argument(format!(
                        "'{}' cannot be changed",
                        pk_field.name
                    )));
                }
            }
        }

        let mut updated = current.clone();
        for (key, value) in kwargs.data {
            updated.insert(key, value);
        }
        self.store.save(model, &updated).await?;
        self.instance = Some(updated);
        self.serialize()
    }

    /// Flattens the bound row: every declared field except write-only fields
    /// and reverse relations.
    pub fn serialize(&self) -> Result<Record> {
        let instance = self.instance.as_ref().ok_or(ServiceError::NotInstantiated)?;
        let mut output = Record::new();
        for field in self.descriptor.model().fields {
            if self.descriptor.is_emitted(field) {
                let value = instance.get(field.name).cloned().unwrap_or(Value::Null);
                output.insert(field.name, value);
            }
        }
        Ok(output)
    }
}
