// Domain layer: value types and the capabilities the core consumes.

pub mod model;
pub mod ports;
