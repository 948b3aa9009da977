//! The versioned HTTP API mounted by the pipeline's dispatcher.

pub mod handlers;
pub mod routes;

pub use routes::v1_routes;
