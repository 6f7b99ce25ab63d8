//! Bus listener and worker pool
//!
//! One worker per prefetch slot; each message flows through the whole
//! pipeline sequentially on one worker. Temporary failures retry in place
//! with bounded exponential backoff and then go back to the bus; permanent
//! failures go to the dead-letter sink with full context.

use chrono::Utc;
use folio_common::config::Config;
use folio_common::events::{EventBus, FolioEvent};
use folio_common::{Disposition, Error};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusConsumer, DeadLetterSink, Delivery};
use crate::ingest::Ingestor;

pub struct Listener {
    consumer: Arc<dyn BusConsumer>,
    dead_letter: Arc<dyn DeadLetterSink>,
    ingestor: Arc<Ingestor>,
    events: EventBus,
    config: Arc<Config>,
}

impl Listener {
    pub fn new(
        consumer: Arc<dyn BusConsumer>,
        dead_letter: Arc<dyn DeadLetterSink>,
        ingestor: Arc<Ingestor>,
        events: EventBus,
        config: Arc<Config>,
    ) -> Self {
        Self {
            consumer,
            dead_letter,
            ingestor,
            events,
            config,
        }
    }

    /// Spawn the worker pool. Worker count equals the prefetch window, so
    /// at most that many messages are in flight per consumer.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let workers = self.config.listener.input.prefetch;
        info!(
            workers,
            queue = %self.config.listener.input.queue,
            "starting listener workers"
        );
        (0..workers)
            .map(|worker| {
                let listener = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { listener.run_worker(worker, shutdown).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker: usize, shutdown: CancellationToken) {
        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => break,
                delivery = self.consumer.receive() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            self.handle(worker, delivery).await;
        }
        debug!(worker, "listener worker stopped");
    }

    async fn handle(&self, worker: usize, delivery: Delivery) {
        let Some(expected_schema) = self
            .config
            .schema
            .schema_for_content_type(&delivery.content_type)
        else {
            self.dead_letter(
                &delivery,
                &Error::UnknownContentType(delivery.content_type.clone()),
            )
            .await;
            return;
        };
        let expected_schema = expected_schema.to_string();

        let actor_timeout = Duration::from_millis(self.config.listener.actor_timeout_ms);
        let mut backoff_ms = self.config.bus.initial_retry_interval_ms;

        loop {
            let attempt =
                tokio::time::timeout(actor_timeout, self.ingestor.ingest(&expected_schema, &delivery.body))
                    .await
                    .unwrap_or(Err(Error::StoreTimeout("message processing")));

            match attempt {
                Ok(outcome) => {
                    debug!(
                        worker,
                        entity_id = %outcome.entity_id,
                        schema = %outcome.schema,
                        "message processed"
                    );
                    self.consumer.ack(delivery.tag).await;
                    return;
                }
                Err(err) if err.disposition() == Disposition::Permanent => {
                    self.dead_letter(&delivery, &err).await;
                    return;
                }
                Err(err) => {
                    if backoff_ms > self.config.bus.max_retry_interval_ms {
                        warn!(
                            worker,
                            error = %err,
                            "backoff window exhausted, returning message to the bus"
                        );
                        self.consumer.nack(delivery.tag, true).await;
                        return;
                    }
                    warn!(
                        worker,
                        error = %err,
                        backoff_ms,
                        "temporary failure, will retry"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2);
                }
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, err: &Error) {
        let reason = err.to_string();
        self.dead_letter.publish(delivery, &reason).await;
        self.events
            .emit(FolioEvent::MessageDeadLettered {
                content_type: delivery.content_type.clone(),
                reason,
                timestamp: Utc::now(),
            })
            .ok();
        self.consumer.nack(delivery.tag, false).await;
    }
}
