use crate::config::{BridgeConfig, CompressionKind};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use pulsar::compression::{
    Compression, CompressionLz4, CompressionSnappy, CompressionZlib, CompressionZstd,
};
use pulsar::producer::{ProducerOptions, SendFuture};
use pulsar::{Authentication, Producer, Pulsar, TokioExecutor};
use tracing::{debug, info, instrument};

/// The transport seen by the delivery channel: one producer bound to one
/// topic.
#[async_trait]
pub trait MessageProducer: Send {
    /// Hands a payload to the transport without waiting for the broker.
    async fn send(&mut self, payload: Bytes) -> Result<()>;

    /// Waits until the broker acknowledged everything sent so far.
    async fn flush(&mut self) -> Result<()>;

    /// Closes the producer and its connection.
    async fn close(&mut self) -> Result<()>;
}

pub struct PulsarProducer {
    // Dropping the client tears down the broker connection.
    client: Option<Pulsar<TokioExecutor>>,
    producer: Producer<TokioExecutor>,
    pending: Vec<SendFuture>,
    batching: bool,
}

impl PulsarProducer {
    #[instrument(skip(config), fields(url = %config.broker_url, topic = %config.topic))]
    pub async fn connect(config: &BridgeConfig) -> Result<Self> {
        let mut builder = Pulsar::builder(config.broker_url.as_str(), TokioExecutor);
        if let Some(token) = &config.token {
            builder = builder.with_auth(Authentication {
                name: "token".to_string(),
                data: token.clone().into_bytes(),
            });
        }

        let client: Pulsar<TokioExecutor> = builder.build().await.map_err(|e| {
            Error::Connection(format!("create pulsar client failed: {}, {}", config.broker_url, e))
        })?;

        let options = ProducerOptions {
            compression: Some(compression_for(config.compression)),
            batch_size: config.batching_max_messages,
            batch_byte_size: config.batching_max_bytes,
            batch_timeout: config.batching_max_publish_delay,
            block_queue_if_full: config.block_if_queue_full,
            ..Default::default()
        };

        let mut producer_builder = client
            .producer()
            .with_topic(config.topic.as_str())
            .with_options(options);
        if let Some(name) = &config.producer_name {
            producer_builder = producer_builder.with_name(name.as_str());
        }

        let producer = producer_builder.build().await.map_err(|e| {
            Error::Connection(format!("create pulsar producer failed: {}, {}", config.topic, e))
        })?;

        info!(compression = %config.compression, "Pulsar producer created");

        Ok(Self {
            client: Some(client),
            producer,
            pending: Vec::new(),
            batching: config.batching_max_messages.is_some(),
        })
    }
}

#[async_trait]
impl MessageProducer for PulsarProducer {
    async fn send(&mut self, payload: Bytes) -> Result<()> {
        let receipt = self
            .producer
            .send_non_blocking(payload.to_vec())
            .await
            .map_err(|e| Error::Send {
                message: e.to_string(),
            })?;
        self.pending.push(receipt);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.batching {
            self.producer.send_batch().await?;
        }

        let receipts = std::mem::take(&mut self.pending);
        let expected = receipts.len();
        let failures: Vec<String> = join_all(receipts)
            .await
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();

        debug!(expected, failed = failures.len(), "flush receipts collected");

        match failures.first() {
            None => Ok(()),
            Some(first) => Err(Error::Flush {
                message: format!(
                    "{} of {} messages not acknowledged: {}",
                    failures.len(),
                    expected,
                    first
                ),
            }),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        let result = self.producer.close().await.map_err(Error::from);
        self.client.take();
        result
    }
}

fn compression_for(kind: CompressionKind) -> Compression {
    match kind {
        CompressionKind::None => Compression::None,
        CompressionKind::Lz4 => Compression::Lz4(CompressionLz4::default()),
        CompressionKind::Zlib => Compression::Zlib(CompressionZlib::default()),
        CompressionKind::Zstd => Compression::Zstd(CompressionZstd::default()),
        CompressionKind::Snappy => Compression::Snappy(CompressionSnappy::default()),
    }
}
