use crate::domain::ports::Store;
use crate::domain::schema::{FieldDescriptor, ModelSchema};
use crate::utils::error::{Result, ServiceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Untyped field map, used for call arguments, stored rows and serializer
/// output alike.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub data: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Identity of the row under `schema`'s primary key.
    pub fn pk(&self, schema: &ModelSchema) -> Option<i64> {
        schema.primary_key().and_then(|pk| self.get_i64(pk.name))
    }
}

impl From<serde_json::Map<String, Value>> for Record {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self {
            data: map.into_iter().collect(),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.data.into_iter().collect())
    }
}

/// A typed, persisted record.
#[async_trait]
pub trait Model: Sized + Send + Sync + fmt::Display {
    fn schema() -> &'static ModelSchema;

    fn from_record(record: &Record) -> Result<Self>;

    fn to_record(&self) -> Record;

    /// Persists a new row from non-key field values and returns it with its
    /// assigned identity.
    async fn create(store: &dyn Store, values: Record) -> Result<Self> {
        let row = store.insert(Self::schema(), values).await?;
        Self::from_record(&row)
    }

    /// Persists the current field values onto the existing row.
    async fn save(&self, store: &dyn Store) -> Result<()> {
        store.save(Self::schema(), &self.to_record()).await
    }
}

pub static PROFILE_SCHEMA: ModelSchema = ModelSchema {
    name: "Profile",
    table: "profile",
    fields: &[
        FieldDescriptor::primary_key("id"),
        FieldDescriptor::text("name", 255).unique(),
        FieldDescriptor::text("age", 255),
        FieldDescriptor::text("height", 255),
    ],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub age: String,
    pub height: String,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Model for Profile {
    fn schema() -> &'static ModelSchema {
        &PROFILE_SCHEMA
    }

    fn from_record(record: &Record) -> Result<Self> {
        let text = |key: &str| {
            record
                .get_str(key)
                .map(str::to_string)
                .ok_or_else(|| ServiceError::InvalidRow {
                    message: format!("profile row has no text value for '{}'", key),
                })
        };

        Ok(Self {
            id: record.get_i64("id").ok_or_else(|| ServiceError::InvalidRow {
                message: "profile row has no identity".to_string(),
            })?,
            name: text("name")?,
            age: text("age")?,
            height: text("height")?,
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("age", self.age.as_str())
            .with("height", self.height.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_schema_is_valid() {
        assert!(PROFILE_SCHEMA.check().is_ok());
        assert!(PROFILE_SCHEMA.field("name").unwrap().unique);
        assert!(!PROFILE_SCHEMA.field("age").unwrap().unique);
    }

    #[test]
    fn test_profile_label_is_its_name() {
        let profile = Profile {
            id: 1,
            name: "Ada".to_string(),
            age: "36".to_string(),
            height: "165".to_string(),
        };
        assert_eq!(profile.to_string(), "Ada");
    }

    #[test]
    fn test_profile_record_conversion() {
        let record = Record::new()
            .with("id", 4)
            .with("name", "Ada")
            .with("age", "36")
            .with("height", "165");
        let profile = Profile::from_record(&record).unwrap();
        assert_eq!(profile.id, 4);
        assert_eq!(profile.to_record(), record);

        let broken = record.clone().with("age", 36);
        assert!(Profile::from_record(&broken).is_err());
    }

    #[test]
    fn test_record_serializes_as_flat_mapping() {
        let record = Record::new().with("id", 1).with("name", "A");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"id": 1, "name": "A"}));
        assert_eq!(record.pk(&PROFILE_SCHEMA), Some(1));
    }
}
