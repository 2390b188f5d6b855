pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::sqlite::SqliteStore;
pub use adapters::wamp::WampSession;
pub use config::AppConfig;
pub use crate::core::{
    component::Component,
    endpoint::RegisterProfileEndpoint,
    serializer::{ProfileSerializer, Serializer, SerializerDescriptor, SerializerMeta},
};
pub use domain::model::{Model, Profile, Record};
pub use utils::error::{Result, ServiceError};
