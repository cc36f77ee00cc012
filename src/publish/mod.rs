//! # Publish Service and Worker
//!
//! [`PublishService`] is the user-facing entry point: create a task (with
//! synchronous enqueue when the target time is imminent), delete it,
//! reschedule it, or force it to publish now. [`PublishJobHandler`] is the
//! queue consumer that drives one delivery through the adapter and
//! persists the resulting state.
//!
//! Account lookup and publish-record persistence are external concerns
//! reached through the [`AccountSource`] and [`PublishRecordSink`] traits.

mod service;
mod worker;

pub use service::PublishService;
pub use worker::PublishJobHandler;

use crate::error::Result;
use crate::models::{AccountInfo, PublishTask};
use async_trait::async_trait;

/// Account bookkeeping collaborator. Resolves an account identifier to
/// the identities a task needs at creation time.
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn account_info(&self, account_id: &str) -> Result<Option<AccountInfo>>;
}

/// Publish-record persistence collaborator, notified when a task reaches
/// a terminal state. Sink failures are logged and never fail the job.
#[async_trait]
pub trait PublishRecordSink: Send + Sync {
    async fn publish_completed(&self, task: &PublishTask) -> Result<()>;

    async fn publish_failed(&self, task: &PublishTask) -> Result<()>;
}
