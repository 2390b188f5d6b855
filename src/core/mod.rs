pub mod component;
pub mod endpoint;
pub mod serializer;

pub use crate::domain::model::{Model, Record};
pub use crate::domain::ports::{ConfigProvider, Procedure, SessionHandler, Store};
pub use crate::utils::error::Result;
