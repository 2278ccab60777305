//! Consumer-group claim loop for payment callbacks.
//!
//! Each message is handled with a bounded number of attempts and then
//! marked, whatever the outcome. Shutdown is observed between messages; a
//! message that is already being handled runs to completion first.

use crate::error::{OrderError, Result};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A message detached from its source.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub headers: Vec<(String, Vec<u8>)>,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_slice())
    }

    /// The caller-supplied request id, or a fresh one when it is missing or
    /// not a UUID.
    pub fn request_id(&self) -> Uuid {
        self.header(REQUEST_ID_HEADER)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .unwrap_or_else(Uuid::new_v4)
    }
}

/// One claimed stream of messages.
#[async_trait]
pub trait ConsumerSession: Send {
    /// Waits for the next message. `None` means the source is exhausted.
    async fn next_message(&mut self) -> Result<Option<InboundMessage>>;

    /// Records `message` as processed.
    async fn mark(&mut self, message: &InboundMessage) -> Result<()>;
}

#[async_trait]
pub trait TopicHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per message, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after that.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Backoff between attempts, capped at `max_attempts - 1` retries.
    pub fn backoff_builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.backoff)
            .with_max_delay(Duration::from_secs(30))
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Messages on topics without a registered handler.
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Failed,
    Skipped,
}

pub struct CallbackConsumer {
    handlers: HashMap<String, Arc<dyn TopicHandler>>,
    retry: RetryPolicy,
    ready: watch::Sender<bool>,
}

impl CallbackConsumer {
    pub fn new(retry: RetryPolicy) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            handlers: HashMap::new(),
            retry,
            ready,
        }
    }

    pub fn register_topic_handler(&mut self, topic: impl Into<String>, handler: Arc<dyn TopicHandler>) {
        let topic = topic.into();
        info!(%topic, "registered handler");
        self.handlers.insert(topic, handler);
    }

    pub fn topics(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Flips to `true` once [`run`](Self::run) has set up its session.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Drains `session` until it is exhausted or `shutdown` turns `true`.
    pub async fn run<S>(&self, session: &mut S, mut shutdown: watch::Receiver<bool>) -> Result<ConsumerStats>
    where
        S: ConsumerSession + ?Sized,
    {
        self.ready.send_replace(true);
        info!("consumer session ready");

        let mut stats = ConsumerStats::default();
        loop {
            if *shutdown.borrow() {
                info!("shutdown requested");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => {
                    info!("shutdown requested");
                    break;
                }
                next = session.next_message() => next?,
            };
            let Some(message) = next else {
                info!("message source exhausted");
                break;
            };

            let span = info_span!(
                "claim",
                request_id = %message.request_id(),
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
            );
            let outcome = self.dispatch(&message).instrument(span).await;

            stats.processed += 1;
            match outcome {
                Outcome::Succeeded => stats.succeeded += 1,
                Outcome::Failed => stats.failed += 1,
                Outcome::Skipped => stats.skipped += 1,
            }

            if let Err(err) = session.mark(&message).await {
                error!(error = %err, offset = message.offset, "failed to mark message");
            }
        }

        info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            "consumer session finished"
        );
        Ok(stats)
    }

    async fn dispatch(&self, message: &InboundMessage) -> Outcome {
        let Some(handler) = self.handlers.get(&message.topic) else {
            error!("no handler found for topic");
            return Outcome::Skipped;
        };

        let attempts = AtomicU32::new(0);
        let result = (|| async {
            attempts.fetch_add(1, Ordering::Relaxed);
            handler.handle(message).await
        })
        .retry(self.retry.backoff_builder())
        .when(OrderError::is_retryable)
        .notify(|err: &OrderError, delay: Duration| {
            warn!(
                attempt = attempts.load(Ordering::Relaxed),
                error = %err,
                delay = ?delay,
                "error handling message, retrying"
            );
        })
        .await;

        match result {
            Ok(()) => Outcome::Succeeded,
            Err(err) => {
                error!(
                    attempts = attempts.load(Ordering::Relaxed),
                    error = %err,
                    "error handling message, giving up"
                );
                Outcome::Failed
            }
        }
    }
}

async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let signalled = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !signalled {
        // Sender gone without signalling: never shut down from here.
        std::future::pending::<()>().await;
    }
}
