use crate::domain::model::Record;
use crate::domain::schema::ModelSchema;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A child row created together with its parent. `relation_field` is filled
/// with the parent's identity at insert time.
#[derive(Debug, Clone)]
pub struct ChildRecord {
    pub schema: &'static ModelSchema,
    pub relation_field: &'static str,
    pub values: Record,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Creates missing tables. Safe to call more than once.
    async fn generate_schemas(&self, schemas: &[&'static ModelSchema]) -> Result<()>;

    async fn insert(&self, schema: &'static ModelSchema, values: Record) -> Result<Record>;

    /// Inserts a parent row and its children as one unit of work.
    async fn insert_graph(
        &self,
        schema: &'static ModelSchema,
        values: Record,
        children: Vec<ChildRecord>,
    ) -> Result<Record>;

    async fn save(&self, schema: &'static ModelSchema, record: &Record) -> Result<()>;

    async fn filter(
        &self,
        schema: &'static ModelSchema,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>>;

    async fn find_first(
        &self,
        schema: &'static ModelSchema,
        field: &str,
        value: &Value,
    ) -> Result<Option<Record>>;

    async fn count(&self, schema: &'static ModelSchema) -> Result<u64>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl Reply {
    pub fn single(value: Value) -> Self {
        Self {
            args: vec![value],
            kwargs: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub error: String,
    pub args: Vec<Value>,
}

/// A procedure exposed to remote callers through the router.
#[async_trait]
pub trait Procedure: Send + Sync {
    fn uri(&self) -> &str;

    async fn invoke(&self, invocation: Invocation) -> std::result::Result<Reply, CallError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionDetails {
    pub session_id: u64,
    pub realm: String,
}

#[async_trait]
pub trait SessionHandler: Send + Sync {
    async fn on_join(&self, details: &SessionDetails) -> Result<()>;
}

pub trait ConfigProvider: Send + Sync {
    fn router_url(&self) -> &str;
    fn realm(&self) -> &str;
    fn database_url(&self) -> &str;
    fn procedure(&self) -> &str;
}
