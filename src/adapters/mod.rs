// Adapters layer: concrete implementations of the domain ports (relational store, router session).

pub mod sqlite;
pub mod wamp;
