// Domain layer: data model and ports (interfaces) the pipeline depends on.

pub mod model;
pub mod ports;
