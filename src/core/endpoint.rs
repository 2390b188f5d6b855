use crate::core::serializer::{ProfileSerializer, Serializer, SerializerDescriptor};
use crate::domain::model::{Model, Profile, Record};
use crate::domain::ports::{
    CallError, Invocation, Procedure, Reply, SessionDetails, SessionHandler, Store,
};
use crate::utils::error::{Result, ServiceError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const REGISTER_PROCEDURE: &str = "io.crossbar.register";

/// Parameter names in positional order.
const PARAMETERS: [&str; 3] = ["name", "age", "height"];

/// Creates a Profile from `(name, age, height)` and replies with the stored
/// row. Also prepares the schema when the session joins.
pub struct RegisterProfileEndpoint {
    uri: String,
    store: Arc<dyn Store>,
    descriptor: Arc<SerializerDescriptor>,
}

impl RegisterProfileEndpoint {
    pub fn new(uri: impl Into<String>, store: Arc<dyn Store>) -> Result<Self> {
        Ok(Self {
            uri: uri.into(),
            store,
            descriptor: SerializerDescriptor::of::<ProfileSerializer>()?,
        })
    }

    /// Maps positional and keyword arguments onto parameter names. Keywords
    /// win over positions; absent parameters are left for validation to
    /// report.
    pub fn arguments(invocation: Invocation) -> Result<Record> {
        if invocation.args.len() > PARAMETERS.len() {
            return Err(ServiceError::invalid_argument(format!(
                "expected at most {} positional arguments, got {}",
                PARAMETERS.len(),
                invocation.args.len()
            )));
        }

        let mut kwargs = Record::new();
        for (name, value) in PARAMETERS.iter().zip(invocation.args) {
            kwargs.insert(*name, value);
        }
        for (name, value) in invocation.kwargs {
            if !PARAMETERS.contains(&name.as_str()) {
                return Err(ServiceError::invalid_argument(format!(
                    "unexpected keyword argument '{}'",
                    name
                )));
            }
            kwargs.insert(name, value);
        }
        Ok(kwargs)
    }

    pub async fn register_profile(&self, kwargs: Record) -> Result<Record> {
        let mut serializer = Serializer::new(
            Arc::clone(&self.descriptor),
            Arc::clone(&self.store),
            None,
        );
        serializer.create(kwargs).await
    }
}

#[async_trait]
impl Procedure for RegisterProfileEndpoint {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn invoke(&self, invocation: Invocation) -> std::result::Result<Reply, CallError> {
        let outcome = match Self::arguments(invocation) {
            Ok(kwargs) => self.register_profile(kwargs).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(profile) => {
                tracing::info!("Registered profile {:?}", profile.get("name"));
                Ok(Reply::single(Value::from(profile)))
            }
            Err(e) => {
                match &e {
                    ServiceError::InvalidArgument { message } => {
                        tracing::debug!("{} rejected: {}", self.uri, message)
                    }
                    other => tracing::warn!("{} failed: {}", self.uri, other),
                }
                Err(CallError {
                    error: e.wamp_error_uri().to_string(),
                    args: vec![Value::String(e.to_string())],
                })
            }
        }
    }
}

#[async_trait]
impl SessionHandler for RegisterProfileEndpoint {
    async fn on_join(&self, details: &SessionDetails) -> Result<()> {
        self.store.generate_schemas(&[Profile::schema()]).await?;
        tracing::info!(
            "Session {} joined realm '{}', {} ready",
            details.session_id,
            details.realm,
            self.uri
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn invocation(args: Vec<Value>, kwargs: Value) -> Invocation {
        let kwargs: Map<String, Value> = match kwargs {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Invocation { args, kwargs }
    }

    #[test]
    fn test_positional_arguments_map_in_order() {
        let kwargs = RegisterProfileEndpoint::arguments(invocation(
            vec![json!("A"), json!("30"), json!("180")],
            Value::Null,
        ))
        .unwrap();
        assert_eq!(kwargs.get("name"), Some(&json!("A")));
        assert_eq!(kwargs.get("age"), Some(&json!("30")));
        assert_eq!(kwargs.get("height"), Some(&json!("180")));
    }

    #[test]
    fn test_keyword_arguments_override_positions() {
        let kwargs = RegisterProfileEndpoint::arguments(invocation(
            vec![json!("A")],
            json!({"name": "B", "height": "170"}),
        ))
        .unwrap();
        assert_eq!(kwargs.get("name"), Some(&json!("B")));
        assert_eq!(kwargs.get("height"), Some(&json!("170")));
        assert!(!kwargs.contains_key("age"));
    }

    #[test]
    fn test_rejects_extra_arguments() {
        let too_many = invocation(vec![json!("A"); 4], Value::Null);
        assert!(matches!(
            RegisterProfileEndpoint::arguments(too_many),
            Err(ServiceError::InvalidArgument { .. })
        ));

        let unknown = invocation(vec![], json!({"weight": "70"}));
        let err = RegisterProfileEndpoint::arguments(unknown).unwrap_err();
        assert_eq!(err.to_string(), "unexpected keyword argument 'weight'");
    }
}
