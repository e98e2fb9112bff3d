//! Keystone Service - Process Wiring
//!
//! Turns the storage layer into a running process: environment
//! configuration, the PostgreSQL durable store and audit sink, tracing
//! setup, client-facing error codes, the shared [`ServiceState`] and the
//! background jobs (cache sweeper, audit worker).

pub mod audit_sink;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod pg_store;
pub mod state;
pub mod telemetry;

pub use audit_sink::{PgAuditSink, TracingAuditSink};
pub use config::{CacheBackend, CacheSettings, LogFormat, ServiceConfig};
pub use db::DbConfig;
pub use error::{ErrorCode, ServiceError, ServiceResult};
pub use jobs::{BackgroundJobs, ShutdownReport};
pub use pg_store::PgDurableStore;
pub use state::{CacheBackendHandle, ServiceRepository, ServiceState, StoreSet};
pub use telemetry::init_tracing;
