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
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Core map compression pipeline: directory watching, bzip2 compression, and
//! atomic, ownership-correct publication.
//!
//! Layout: `watcher.rs` (per-rule polling), `compress.rs` (staged bzip2
//! encoding), `publish.rs` (ownership + atomic rename), `worker.rs` (queue
//! consumers), `service.rs` (lifecycle wiring), `job.rs` (job and version
//! identity), `error.rs` (pipeline error taxonomy).

mod compress;
mod error;
mod job;
mod publish;
mod service;
mod watcher;
mod worker;

pub use error::{PipelineError, PipelineResult};
pub use job::{CompressionJob, FileVersion, artifact_name};
pub use publish::{DestinationAttrs, DestinationPolicy, UnixDestinationPolicy};
pub use service::{PipelineHandle, PipelineService};
