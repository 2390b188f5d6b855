//! Statically declared model descriptors.
//!
//! Each persisted model publishes one `static` [`ModelSchema`] listing its
//! fields. Serializers and the store read these tables instead of inspecting
//! model types at runtime.

use crate::utils::error::{Result, ServiceError};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Integer,
    Text {
        max_length: usize,
    },
    /// To-one reference, stored as the referenced row's identity.
    ForeignKey {
        references: &'static str,
    },
    /// Child rows of `related` pointing back here through `relation_field`.
    /// Has no column of its own.
    ReverseRelation {
        related: &'static ModelSchema,
        relation_field: &'static str,
    },
}

impl FieldKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Integer | FieldKind::ForeignKey { .. } => "integer",
            FieldKind::Text { .. } => "string",
            FieldKind::ReverseRelation { .. } => "mapping",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub primary_key: bool,
    pub unique: bool,
}

impl FieldDescriptor {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            primary_key: false,
            unique: false,
        }
    }

    pub const fn primary_key(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Integer,
            primary_key: true,
            unique: true,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub const fn text(name: &'static str, max_length: usize) -> Self {
        Self::new(name, FieldKind::Text { max_length })
    }

    pub const fn foreign_key(name: &'static str, references: &'static str) -> Self {
        Self::new(name, FieldKind::ForeignKey { references })
    }

    pub const fn reverse_relation(
        name: &'static str,
        related: &'static ModelSchema,
        relation_field: &'static str,
    ) -> Self {
        Self::new(
            name,
            FieldKind::ReverseRelation {
                related,
                relation_field,
            },
        )
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Whether the field is backed by a table column.
    pub fn is_column(&self) -> bool {
        !self.is_reverse_relation()
    }

    pub fn is_reverse_relation(&self) -> bool {
        matches!(self.kind, FieldKind::ReverseRelation { .. })
    }

    pub fn is_relation_reference(&self) -> bool {
        matches!(self.kind, FieldKind::ForeignKey { .. })
    }

    /// Exact runtime type match: strings never stand in for numbers, nor
    /// numbers for strings, and floats never stand in for integers.
    pub fn matches_type(&self, value: &Value) -> bool {
        match self.kind {
            FieldKind::Integer | FieldKind::ForeignKey { .. } => value.is_i64(),
            FieldKind::Text { .. } => value.is_string(),
            FieldKind::ReverseRelation { .. } => value.is_object(),
        }
    }
}

#[derive(Debug)]
pub struct ModelSchema {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl ModelSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_key(&self) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.primary_key)
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        let fields: &'static [FieldDescriptor] = self.fields;
        fields.iter().filter(|f| f.is_column())
    }

    /// Checks that the table describes a usable model: one integer primary
    /// key, distinct field names, and reverse relations that point at a
    /// foreign key column on the related model.
    pub fn check(&self) -> Result<()> {
        let invalid = |reason: String| {
            ServiceError::configuration(format!("{} is not a valid model: {}", self.name, reason))
        };

        if self.table.trim().is_empty() {
            return Err(invalid("table name is empty".to_string()));
        }

        let primary_keys: Vec<_> = self.fields.iter().filter(|f| f.primary_key).collect();
        match primary_keys.as_slice() {
            [pk] if matches!(pk.kind, FieldKind::Integer) => {}
            [pk] => return Err(invalid(format!("primary key '{}' must be an integer", pk.name))),
            [] => return Err(invalid("no primary key declared".to_string())),
            _ => return Err(invalid("more than one primary key declared".to_string())),
        }

        let mut seen = HashSet::new();
        for field in self.fields {
            if !seen.insert(field.name) {
                return Err(invalid(format!("field '{}' declared twice", field.name)));
            }
            if let FieldKind::ReverseRelation {
                related,
                relation_field,
            } = field.kind
            {
                match related.field(relation_field).map(|f| f.kind) {
                    Some(FieldKind::ForeignKey { references }) if references == self.table => {}
                    _ => {
                        return Err(invalid(format!(
                            "relation '{}' needs {}.{} to reference {}",
                            field.name, related.name, relation_field, self.table
                        )))
                    }
                }
            }
        }

        Ok(())
    }
}
