//! This file is the root of the `zipq` Rust crate.
//!
//! zipq drives a block compression engine that sits behind asynchronous
//! descriptor queues. A source is cut into blocks, each block is handed to the
//! engine through a fixed pool of reusable slots, and completed blocks are framed
//! as zlib or multi-member gzip and written out in source order.
//!
//! The modules follow the data path: `config` and `format` hold the session
//! settings and wire constants, `transport` talks to the engine, `pool` owns the
//! reusable slots, `framing` wraps engine output in containers, and `pipeline`
//! schedules blocks between them. The root only declares those modules and
//! re-exports what a caller needs to run a session.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod config;
pub mod error;
pub mod format;
pub mod framing;
pub mod pipeline;
pub mod pool;
pub mod transport;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use config::{Algorithm, BackoffConfig, Direction, ZipqConfig};
pub use error::{FaultKind, ZipqError};
pub use pipeline::{OffloadSession, SessionStats};
pub use transport::{EngineOptions, SoftwareEngine, Transport};
