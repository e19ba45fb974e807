#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Watch-rule registry for the mapzipd daemon.
//!
//! Layout: `model.rs` (registry data model), `loader.rs` (JSON config file
//! loading), `validate.rs` (startup validation), `error.rs` (fatal
//! configuration errors).

mod error;
mod loader;
mod model;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{Registry, Settings, WatchRule};
pub use validate::validate_registry;
