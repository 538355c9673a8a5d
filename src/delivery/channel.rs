//! Delivery channel: owns the producer, counts outcomes and drives the
//! periodic flush.
//!
//! Sends are fire-and-forget. Every `flush_interval` successfully sent
//! messages the channel blocks on a flush, bounded by `flush_timeout`,
//! which is the only point where broker acknowledgments are awaited.
//! Messages sent after the last flush may be lost on shutdown.

use crate::config::BridgeConfig;
use crate::delivery::producer::{MessageProducer, PulsarProducer};
use crate::{Error, Result};
use bytes::Bytes;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Delivery counters. They only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Records observed by the batch driver.
    pub total: u64,
    /// Records handed to the producer without a dispatch error.
    pub sent: u64,
    /// Records dropped at any stage: decoding, normalization, encoding
    /// or dispatch.
    pub failed: u64,
    /// Periodic flushes acknowledged by the broker.
    pub flush_ok: u64,
    /// Periodic flushes that failed or timed out.
    pub flush_failed: u64,
}

pub struct DeliveryChannel<P = PulsarProducer> {
    producer: Option<P>,
    topic: String,
    flush_interval: u64,
    flush_timeout: Duration,
    stats: DeliveryStats,
}

impl DeliveryChannel<PulsarProducer> {
    /// Connects to the broker and creates the single producer for the
    /// configured topic.
    pub async fn initialize(config: &BridgeConfig) -> Result<Self> {
        info!(
            broker_url = %config.broker_url,
            topic = %config.topic,
            token = %config.masked_token(),
            producer_name = ?config.producer_name,
            compression = %config.compression,
            batching_max_messages = ?config.batching_max_messages,
            batching_max_bytes = ?config.batching_max_bytes,
            batching_max_publish_delay = ?config.batching_max_publish_delay,
            block_if_queue_full = config.block_if_queue_full,
            flush_interval = config.flush_interval,
            flush_timeout_ms = config.flush_timeout.as_millis() as u64,
            "Delivery channel configuration"
        );

        let producer = PulsarProducer::connect(config).await.map_err(|e| {
            error!("Failed to initialize delivery channel: {}", e);
            e
        })?;

        info!("Connected to pulsar: {}, {}", config.broker_url, config.topic);
        Ok(Self::with_producer(producer, config))
    }
}

impl<P: MessageProducer> DeliveryChannel<P> {
    pub fn with_producer(producer: P, config: &BridgeConfig) -> Self {
        Self {
            producer: Some(producer),
            topic: config.topic.clone(),
            flush_interval: config.flush_interval.max(1),
            flush_timeout: config.flush_timeout,
            stats: DeliveryStats::default(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    pub fn is_open(&self) -> bool {
        self.producer.is_some()
    }

    /// Counts a record entering the pipeline.
    pub fn record_observed(&mut self) {
        self.stats.total += 1;
    }

    /// Counts a record dropped before it reached the producer.
    pub fn record_dropped(&mut self) {
        self.stats.failed += 1;
    }

    /// Dispatches one payload. Triggers a flush when the sent count hits
    /// the flush cadence; a failed flush is counted and logged but does not
    /// fail the send.
    pub async fn send(&mut self, payload: Bytes) -> Result<()> {
        let producer = match self.producer.as_mut() {
            Some(producer) => producer,
            None => {
                self.stats.failed += 1;
                return Err(Error::NotInitialized);
            }
        };

        if let Err(e) = producer.send(payload.clone()).await {
            self.stats.failed += 1;
            warn!("send msg error: {}", e);
            return Err(e);
        }

        self.stats.sent += 1;
        if self.stats.sent % self.flush_interval == 0 {
            // Outcome is already counted and logged.
            let _ = self.flush(&payload).await;
        }

        Ok(())
    }

    async fn flush(&mut self, last_record: &[u8]) -> Result<()> {
        let producer = self.producer.as_mut().ok_or(Error::NotInitialized)?;

        let outcome = match timeout(self.flush_timeout, producer.flush()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                message: format!("flush not acknowledged within {:?}", self.flush_timeout),
            }),
        };

        match &outcome {
            Ok(()) => {
                self.stats.flush_ok += 1;
                info!("flush msg ok");
            }
            Err(e) => {
                self.stats.flush_failed += 1;
                warn!("flush msg error: {}", e);
            }
        }

        info!(
            total = self.stats.total,
            sent = self.stats.sent,
            failed = self.stats.failed,
            flush_ok = self.stats.flush_ok,
            flush_failed = self.stats.flush_failed,
            last_record = %String::from_utf8_lossy(last_record),
            "progress"
        );

        outcome
    }

    /// Closes the producer and connection. Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        match self.producer.take() {
            Some(mut producer) => {
                if let Err(e) = producer.close().await {
                    warn!("Error closing producer for {}: {}", self.topic, e);
                }
                info!(
                    total = self.stats.total,
                    sent = self.stats.sent,
                    failed = self.stats.failed,
                    "pulsar shutdown"
                );
            }
            None => info!("pulsar shutdown: nothing to close"),
        }
    }
}
