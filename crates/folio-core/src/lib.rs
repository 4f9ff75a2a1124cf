//! Shared building blocks for the Folio back office: configuration, the
//! top-level error type and the timestamp format every store agrees on.

pub mod config;
pub mod error;
pub mod time;

pub use config::FolioConfig;
pub use error::{FolioError, Result};
