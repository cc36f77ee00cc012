//! # Pubflow Core
//!
//! Publish/engagement task orchestration engine: turns a declarative
//! "publish this content / reply to these comments" request into a
//! reliable asynchronous operation across platforms with very different
//! publishing protocols (single-call, multi-stage upload-then-poll, or
//! fully async webhook-confirmed).
//!
//! ## Architecture
//!
//! Leaf to root: platform integrations implement the
//! [`adapters::PlatformAdapter`] contract and are resolved through the
//! [`adapters::AdapterRegistry`]; the [`store::TaskStore`] holds the
//! durable task/container/engagement records behind narrow idempotent
//! mutations; three independent [`queue::DispatchQueue`]s deliver jobs
//! at-least-once to bounded worker pools; the [`scheduler::Scheduler`]
//! sweeps for due tasks; the [`webhook::WebhookReceiver`] reconciles
//! out-of-band platform confirmations; the engagement module fans one
//! bulk reply request into per-comment sub-tasks.
//!
//! ## Module Organization
//!
//! - [`models`] - Publish tasks, media containers, engagement tasks
//! - [`store`] - Task store trait plus the in-memory reference store
//! - [`state_machine`] - Monotone publish lifecycle on CAS writes
//! - [`adapters`] - Per-platform execution contract and registry
//! - [`queue`] - Keyed at-least-once dispatch queues
//! - [`scheduler`] - Single-flight due-task sweep
//! - [`publish`] - Task lifecycle service and the publish worker
//! - [`staging`] - Asynchronous media processing sub-protocol
//! - [`webhook`] - Out-of-band terminal status corrections
//! - [`engagement`] - Comment-reply fan-out and posting workers
//! - [`system`] - Explicit process-lifetime wiring
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pubflow_core::{Config, System};
//! # fn collaborators() -> pubflow_core::system::Collaborators { unimplemented!() }
//! # async fn run() {
//! use pubflow_core::adapters::AdapterRegistry;
//! use pubflow_core::notifications::NotificationHub;
//! use pubflow_core::store::MemoryStore;
//! use std::sync::Arc;
//!
//! let system = System::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(AdapterRegistry::new()),
//!     collaborators(),
//!     NotificationHub::new(),
//!     Config::default(),
//! );
//! system.start();
//! // ... create tasks through system.publish() ...
//! system.shutdown().await;
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod constants;
pub mod engagement;
pub mod error;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod publish;
pub mod queue;
pub mod scheduler;
pub mod staging;
pub mod state_machine;
pub mod store;
pub mod system;
pub mod webhook;

pub use config::Config;
pub use error::{PubflowError, Result};
pub use system::{Collaborators, System};
