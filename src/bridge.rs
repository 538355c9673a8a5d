use crate::config::{BridgeConfig, ConfigSource};
use crate::delivery::{DeliveryChannel, DeliveryStats, JsonSerializer, MessageProducer, PulsarProducer};
use crate::record::{normalize, EventDecoder, RecordValue};
use crate::Result;
use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};

pub const PLUGIN_NAME: &str = "pulsar";
pub const PLUGIN_DESCRIPTION: &str = "Output to Apache Pulsar";

/// Status codes understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Error,
    Ok,
    /// Part of the host's code table only; the bridge never asks for a
    /// retry.
    Retry,
}

impl HostStatus {
    pub fn code(self) -> i32 {
        match self {
            HostStatus::Error => 0,
            HostStatus::Ok => 1,
            HostStatus::Retry => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: &'static str,
    pub description: &'static str,
}

/// The plugin instance driven by the host: one delivery channel, set up
/// by `initialize` and torn down by `exit`.
pub struct Bridge<P = PulsarProducer> {
    channel: Option<DeliveryChannel<P>>,
}

impl<P> Default for Bridge<P> {
    fn default() -> Self {
        Self { channel: None }
    }
}

impl Bridge<PulsarProducer> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the plugin options and connects the delivery channel.
    pub async fn initialize<S: ConfigSource + ?Sized>(&mut self, source: &S) -> HostStatus {
        let config = BridgeConfig::from_source(source);
        match DeliveryChannel::initialize(&config).await {
            Ok(channel) => {
                self.attach(channel).await;
                HostStatus::Ok
            }
            Err(e) => {
                error!("initialize pulsar bridge failed: {}", e);
                HostStatus::Error
            }
        }
    }
}

/// Declares the plugin to the host.
pub fn register() -> Registration {
    info!("register {} output plugin", PLUGIN_NAME);
    Registration {
        name: PLUGIN_NAME,
        description: PLUGIN_DESCRIPTION,
    }
}

impl<P: MessageProducer> Bridge<P> {
    /// Builds a bridge around an already open channel.
    pub fn with_channel(channel: DeliveryChannel<P>) -> Self {
        Self {
            channel: Some(channel),
        }
    }

    /// Installs `channel`, shutting down the one it replaces.
    pub async fn attach(&mut self, channel: DeliveryChannel<P>) {
        if let Some(mut previous) = self.channel.replace(channel) {
            warn!("bridge initialized twice, closing the previous channel");
            previous.shutdown().await;
        }
    }

    pub fn stats(&self) -> Option<DeliveryStats> {
        self.channel.as_ref().map(DeliveryChannel::stats)
    }

    /// Publishes every record in a host batch buffer.
    ///
    /// Failures are confined to the record they happen on; the batch is
    /// always reported as accepted. The tag is not used for routing.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn flush_batch(&mut self, data: &[u8], tag: &str) -> HostStatus {
        let channel = match self.channel.as_mut() {
            Some(channel) => channel,
            None => {
                warn!("batch received before initialization, dropping");
                return HostStatus::Ok;
            }
        };

        let mut records = 0usize;
        for event in EventDecoder::new(data) {
            records += 1;
            channel.record_observed();

            match event {
                Ok(event) => {
                    debug!(timestamp = ?event.timestamp, "record decoded");
                    // Dispatch failures are counted and logged by the channel.
                    let _ = forward_record(channel, event.record).await;
                }
                Err(e) => {
                    channel.record_dropped();
                    error!("decode record error: {}", e);
                }
            }
        }

        debug!(records, "batch processed");
        HostStatus::Ok
    }

    /// Shuts the delivery channel down. Safe without a prior initialize
    /// and safe to call twice.
    pub async fn exit(&mut self) -> HostStatus {
        match self.channel.as_mut() {
            Some(channel) => channel.shutdown().await,
            None => info!("exit called without an initialized channel"),
        }
        HostStatus::Ok
    }
}

/// Runs one record through normalize, serialize and send.
pub async fn forward_record<P: MessageProducer>(
    channel: &mut DeliveryChannel<P>,
    record: RecordValue,
) -> Result<()> {
    let payload = match prepare(record) {
        Ok(payload) => payload,
        Err(e) => {
            channel.record_dropped();
            error!("serialize record error: {}", e);
            return Err(e);
        }
    };

    channel.send(payload).await
}

fn prepare(record: RecordValue) -> Result<Bytes> {
    let normalized = normalize(record)?;
    JsonSerializer::serialize(&normalized)
}
