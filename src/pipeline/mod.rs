// In: src/pipeline/mod.rs

//! The offload pipeline.
//!
//! `driver` holds the single submit/drain loop, `backoff` the retry helper used
//! while the transport reports transient conditions, and `session` the
//! `OffloadSession` that owns the pool and plugs its block steps into the driver.

pub mod backoff;
pub mod driver;
mod session;
mod stats;

pub use self::backoff::{retry_transient, Backoff};
pub use self::driver::{next_step, run, DriverReport, PipelineStrategy, Step};
pub use self::session::OffloadSession;
pub use self::stats::SessionStats;

#[cfg(test)]
mod session_tests;
