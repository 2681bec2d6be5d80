// Adapters layer: concrete clients for external systems.

pub mod uldk;

pub use uldk::UldkClient;
