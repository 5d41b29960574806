//! # saveforge-server
//!
//! Daemon for saveforge: file watching, change orchestration, and the
//! HTTP command API over the versioning engine.

pub mod api;
pub mod config;
pub mod debounce;
pub mod monitor;
pub mod orchestrator;
pub mod server;
pub mod watcher;

pub use config::DaemonConfig;
pub use orchestrator::{EngineEvent, EventOrchestrator};
pub use server::{SaveforgeServer, VersioningEngine};
