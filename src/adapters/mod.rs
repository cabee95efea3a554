// Adapters layer: concrete implementations for external systems (storage backends, http clients)

pub mod gcs;
pub mod http;
pub mod storage;

pub use gcs::GcsStorage;
pub use http::FdaClient;
pub use storage::LocalStorage;
