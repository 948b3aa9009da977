//! HTTP request handlers for the versioned API.

pub mod echo;
pub mod me;
pub mod status;
