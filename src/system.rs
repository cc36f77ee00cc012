//! # System Wiring
//!
//! Explicit process-lifetime composition of the engine: the three
//! dispatch queues, their worker pools, the scheduler and the services.
//! Everything is injected at construction and torn down by
//! [`System::shutdown`]; no component reaches for a global.

use crate::adapters::AdapterRegistry;
use crate::config::Config;
use crate::constants::queues;
use crate::engagement::{
    CommentSource, EngagementDistributor, EngagementService, ReplyGenerator, ReplyJobHandler,
    ReplyPoster,
};
use crate::notifications::NotificationHub;
use crate::publish::{AccountSource, PublishJobHandler, PublishRecordSink, PublishService};
use crate::queue::DispatchQueue;
use crate::scheduler::Scheduler;
use crate::store::TaskStore;
use crate::webhook::WebhookReceiver;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// External collaborators the engine depends on. All out-of-scope
/// concerns (accounts, publish records, comment discovery, reply
/// generation and posting) enter here as trait objects.
#[derive(Clone)]
pub struct Collaborators {
    pub accounts: Arc<dyn AccountSource>,
    pub records: Arc<dyn PublishRecordSink>,
    pub comments: Arc<dyn CommentSource>,
    pub generator: Arc<dyn ReplyGenerator>,
    pub poster: Arc<dyn ReplyPoster>,
}

/// The composed engine. Construct once, [`start`](System::start) once,
/// and [`shutdown`](System::shutdown) on the way out.
pub struct System {
    config: Config,
    publish_queue: Arc<DispatchQueue>,
    distribution_queue: Arc<DispatchQueue>,
    reply_queue: Arc<DispatchQueue>,
    publish_service: PublishService,
    engagement_service: EngagementService,
    webhook_receiver: WebhookReceiver,
    scheduler: Arc<Scheduler>,
    publish_handler: Arc<PublishJobHandler>,
    distribution_handler: Arc<EngagementDistributor>,
    reply_handler: Arc<ReplyJobHandler>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl System {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<AdapterRegistry>,
        collaborators: Collaborators,
        hub: NotificationHub,
        config: Config,
    ) -> Self {
        let publish_queue = DispatchQueue::new(queues::POST_PUBLISH);
        let distribution_queue = DispatchQueue::new(queues::ENGAGEMENT_DISTRIBUTION);
        let reply_queue = DispatchQueue::new(queues::ENGAGEMENT_REPLY);

        let publish_service = PublishService::new(
            store.clone(),
            publish_queue.clone(),
            collaborators.accounts.clone(),
            hub.clone(),
            config.clone(),
        );
        let engagement_service = EngagementService::new(
            store.clone(),
            distribution_queue.clone(),
            config.clone(),
        );
        let webhook_receiver =
            WebhookReceiver::new(store.clone(), publish_queue.clone(), hub.clone());
        let scheduler = Scheduler::new(store.clone(), publish_queue.clone(), config.clone());

        let publish_handler = Arc::new(PublishJobHandler::new(
            store.clone(),
            registry,
            collaborators.records.clone(),
            hub.clone(),
            config.clone(),
        ));
        let distribution_handler = Arc::new(EngagementDistributor::new(
            store.clone(),
            collaborators.comments.clone(),
            collaborators.generator.clone(),
            reply_queue.clone(),
            hub.clone(),
            config.clone(),
        ));
        let reply_handler = Arc::new(ReplyJobHandler::new(
            store,
            collaborators.poster.clone(),
            config.clone(),
        ));

        Self {
            config,
            publish_queue,
            distribution_queue,
            reply_queue,
            publish_service,
            engagement_service,
            webhook_receiver,
            scheduler,
            publish_handler,
            distribution_handler,
            reply_handler,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker pools and the scheduler loop.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }
        handles.extend(
            self.publish_queue
                .start(self.publish_handler.clone(), self.config.publish_workers),
        );
        handles.extend(self.distribution_queue.start(
            self.distribution_handler.clone(),
            self.config.distribution_workers,
        ));
        handles.extend(
            self.reply_queue
                .start(self.reply_handler.clone(), self.config.reply_workers),
        );
        handles.push(self.scheduler.start());
        info!(workers = handles.len() - 1, "engine started");
    }

    /// Stop the scheduler and all workers, waiting for in-flight jobs to
    /// settle.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        self.publish_queue.shutdown();
        self.distribution_queue.shutdown();
        self.reply_queue.shutdown();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "worker task ended abnormally");
            }
        }
        info!("engine stopped");
    }

    pub fn publish(&self) -> &PublishService {
        &self.publish_service
    }

    pub fn engagement(&self) -> &EngagementService {
        &self.engagement_service
    }

    pub fn webhook(&self) -> &WebhookReceiver {
        &self.webhook_receiver
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn publish_queue(&self) -> &Arc<DispatchQueue> {
        &self.publish_queue
    }

    pub fn reply_queue(&self) -> &Arc<DispatchQueue> {
        &self.reply_queue
    }
}
