// Domain layer: model descriptors, records and the ports the rest of the crate plugs into.

pub mod model;
pub mod ports;
pub mod schema;
