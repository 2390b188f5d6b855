//! WAMP v2 messages in their JSON array form.

use crate::utils::error::{Result, ServiceError};
use serde_json::{json, Map, Value};

pub const HELLO: u64 = 1;
pub const WELCOME: u64 = 2;
pub const ABORT: u64 = 3;
pub const GOODBYE: u64 = 6;
pub const ERROR: u64 = 8;
pub const REGISTER: u64 = 64;
pub const REGISTERED: u64 = 65;
pub const INVOCATION: u64 = 68;
pub const YIELD: u64 = 70;

pub const SUBPROTOCOL: &str = "wamp.2.json";
pub const CLOSE_NORMAL: &str = "wamp.close.normal";
pub const GOODBYE_AND_OUT: &str = "wamp.close.goodbye_and_out";
pub const NO_SUCH_REGISTRATION: &str = "wamp.error.no_such_registration";

#[derive(Debug, Clone, PartialEq)]
pub enum WampMessage {
    Hello {
        realm: String,
        details: Map<String, Value>,
    },
    Welcome {
        session: u64,
        details: Map<String, Value>,
    },
    Abort {
        details: Map<String, Value>,
        reason: String,
    },
    Goodbye {
        details: Map<String, Value>,
        reason: String,
    },
    Error {
        request_type: u64,
        request: u64,
        details: Map<String, Value>,
        error: String,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    },
    Register {
        request: u64,
        options: Map<String, Value>,
        procedure: String,
    },
    Registered {
        request: u64,
        registration: u64,
    },
    Invocation {
        request: u64,
        registration: u64,
        details: Map<String, Value>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    },
    Yield {
        request: u64,
        options: Map<String, Value>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    },
}

impl WampMessage {
    /// HELLO announcing the callee role only.
    pub fn hello(realm: &str) -> Self {
        let details = json!({"roles": {"callee": {}}});
        WampMessage::Hello {
            realm: realm.to_string(),
            details: details.as_object().cloned().unwrap_or_default(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            WampMessage::Hello { realm, details } => json!([HELLO, realm, details]),
            WampMessage::Welcome { session, details } => json!([WELCOME, session, details]),
            WampMessage::Abort { details, reason } => json!([ABORT, details, reason]),
            WampMessage::Goodbye { details, reason } => json!([GOODBYE, details, reason]),
            WampMessage::Error {
                request_type,
                request,
                details,
                error,
                args,
                kwargs,
            } => with_payload(
                vec![json!(ERROR), json!(request_type), json!(request), json!(details), json!(error)],
                args,
                kwargs,
            ),
            WampMessage::Register {
                request,
                options,
                procedure,
            } => json!([REGISTER, request, options, procedure]),
            WampMessage::Registered {
                request,
                registration,
            } => json!([REGISTERED, request, registration]),
            WampMessage::Invocation {
                request,
                registration,
                details,
                args,
                kwargs,
            } => with_payload(
                vec![json!(INVOCATION), json!(request), json!(registration), json!(details)],
                args,
                kwargs,
            ),
            WampMessage::Yield {
                request,
                options,
                args,
                kwargs,
            } => with_payload(vec![json!(YIELD), json!(request), json!(options)], args, kwargs),
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }

    pub fn from_text(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(items) = value else {
            return Err(ServiceError::protocol("message is not a JSON array"));
        };
        let fields = Fields { items: &items };

        let message = match fields.id(0)? {
            HELLO => WampMessage::Hello {
                realm: fields.string(1)?,
                details: fields.dict(2)?,
            },
            WELCOME => WampMessage::Welcome {
                session: fields.id(1)?,
                details: fields.dict(2)?,
            },
            ABORT => WampMessage::Abort {
                details: fields.dict(1)?,
                reason: fields.string(2)?,
            },
            GOODBYE => WampMessage::Goodbye {
                details: fields.dict(1)?,
                reason: fields.string(2)?,
            },
            ERROR => WampMessage::Error {
                request_type: fields.id(1)?,
                request: fields.id(2)?,
                details: fields.dict(3)?,
                error: fields.string(4)?,
                args: fields.list(5)?,
                kwargs: fields.optional_dict(6)?,
            },
            REGISTER => WampMessage::Register {
                request: fields.id(1)?,
                options: fields.dict(2)?,
                procedure: fields.string(3)?,
            },
            REGISTERED => WampMessage::Registered {
                request: fields.id(1)?,
                registration: fields.id(2)?,
            },
            INVOCATION => WampMessage::Invocation {
                request: fields.id(1)?,
                registration: fields.id(2)?,
                details: fields.dict(3)?,
                args: fields.list(4)?,
                kwargs: fields.optional_dict(5)?,
            },
            YIELD => WampMessage::Yield {
                request: fields.id(1)?,
                options: fields.dict(2)?,
                args: fields.list(3)?,
                kwargs: fields.optional_dict(4)?,
            },
            other => {
                return Err(ServiceError::protocol(format!(
                    "unsupported message type {}",
                    other
                )))
            }
        };
        Ok(message)
    }
}

/// Appends `args` and `kwargs`, leaving out empty trailing elements.
fn with_payload(mut head: Vec<Value>, args: &[Value], kwargs: &Map<String, Value>) -> Value {
    if !args.is_empty() || !kwargs.is_empty() {
        head.push(Value::Array(args.to_vec()));
    }
    if !kwargs.is_empty() {
        head.push(Value::Object(kwargs.clone()));
    }
    Value::Array(head)
}

struct Fields<'a> {
    items: &'a [Value],
}

impl Fields<'_> {
    fn get(&self, index: usize) -> Result<&Value> {
        self.items
            .get(index)
            .ok_or_else(|| ServiceError::protocol(format!("message has no element {}", index)))
    }

    fn id(&self, index: usize) -> Result<u64> {
        self.get(index)?
            .as_u64()
            .ok_or_else(|| ServiceError::protocol(format!("element {} is not an id", index)))
    }

    fn string(&self, index: usize) -> Result<String> {
        self.get(index)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::protocol(format!("element {} is not a string", index)))
    }

    fn dict(&self, index: usize) -> Result<Map<String, Value>> {
        self.get(index)?
            .as_object()
            .cloned()
            .ok_or_else(|| ServiceError::protocol(format!("element {} is not a dict", index)))
    }

    fn list(&self, index: usize) -> Result<Vec<Value>> {
        match self.items.get(index) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(ServiceError::protocol(format!("element {} is not a list", index))),
        }
    }

    fn optional_dict(&self, index: usize) -> Result<Map<String, Value>> {
        match self.items.get(index) {
            None => Ok(Map::new()),
            Some(_) => self.dict(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_invocation_with_positional_args() {
        let message =
            WampMessage::from_text(r#"[68, 6131533, 9823526, {}, ["A", "30", "180"]]"#).unwrap();
        match message {
            WampMessage::Invocation {
                request,
                registration,
                args,
                kwargs,
                ..
            } => {
                assert_eq!(request, 6131533);
                assert_eq!(registration, 9823526);
                assert_eq!(args, vec![json!("A"), json!("30"), json!("180")]);
                assert!(kwargs.is_empty());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parse_invocation_without_payload() {
        let message = WampMessage::from_text("[68, 1, 2, {}]").unwrap();
        assert!(matches!(
            message,
            WampMessage::Invocation { ref args, ref kwargs, .. } if args.is_empty() && kwargs.is_empty()
        ));
    }

    #[test]
    fn test_yield_carries_reply_as_single_argument() {
        let message = WampMessage::Yield {
            request: 7,
            options: Map::new(),
            args: vec![json!({"id": 1, "name": "A"})],
            kwargs: Map::new(),
        };
        assert_eq!(message.to_value(), json!([70, 7, {}, [{"id": 1, "name": "A"}]]));
    }

    #[test]
    fn test_error_keeps_empty_args_when_kwargs_present() {
        let mut kwargs = Map::new();
        kwargs.insert("field".to_string(), json!("name"));
        let message = WampMessage::Error {
            request_type: INVOCATION,
            request: 3,
            details: Map::new(),
            error: "wamp.error.invalid_argument".to_string(),
            args: vec![],
            kwargs,
        };
        assert_eq!(
            message.to_value(),
            json!([8, 68, 3, {}, "wamp.error.invalid_argument", [], {"field": "name"}])
        );
    }

    #[test]
    fn test_hello_announces_callee_role() {
        assert_eq!(
            WampMessage::hello("realm1").to_value(),
            json!([1, "realm1", {"roles": {"callee": {}}}])
        );
    }

    #[test]
    fn test_rejects_malformed_messages() {
        assert!(WampMessage::from_text(r#"{"type": 1}"#).is_err());
        assert!(WampMessage::from_text("[65, 1]").is_err());
        assert!(WampMessage::from_text(r#"[2, "abc", {}]"#).is_err());
        assert!(WampMessage::from_text("[999]").is_err());
    }
}
