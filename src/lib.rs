//! Atrium-RS Library
//!
//! Request pipeline, configuration and server lifecycle for the atrium-rs
//! bootstrap server.

use shadow_rs::shadow;
shadow!(build);

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod server;
pub mod stages;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}

pub fn clap_long_version() -> &'static str {
    build::CLAP_LONG_VERSION
}
