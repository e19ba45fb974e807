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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! mapzipd application bootstrap wiring.
//!
//! Layout: `cli.rs` (argument parsing), `bootstrap.rs` (service wiring and
//! signal-driven shutdown), `error.rs` (application errors).

mod bootstrap;
mod cli;
mod error;

pub use bootstrap::run_app;
pub use cli::{Cli, LogFormatArg};
pub use error::{AppError, AppResult};
