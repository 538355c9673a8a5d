#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pulsar_bridge::config::BridgeConfig;
use pulsar_bridge::delivery::{DeliveryChannel, MessageProducer};
use pulsar_bridge::{Bridge, Error, Result};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Get test configuration from environment variables
pub fn get_test_config() -> BridgeConfig {
    BridgeConfig {
        broker_url: env::var("TEST_PULSAR_URL")
            .unwrap_or_else(|_| "pulsar://localhost:6650".to_string()),
        topic: format!(
            "persistent://public/default/pulsar_bridge_test_{}",
            std::process::id()
        ),
        token: env::var("TEST_PULSAR_TOKEN").ok().filter(|t| !t.is_empty()),
        flush_interval: 10,
        flush_timeout: Duration::from_secs(5),
        ..BridgeConfig::default()
    }
}

#[derive(Default)]
pub struct ProducerLog {
    pub payloads: Vec<Bytes>,
    pub attempts: usize,
    pub reject: HashSet<usize>,
    pub flushes: usize,
    pub closes: usize,
}

/// In-memory producer; the log stays readable after the producer moved
/// into a channel.
#[derive(Clone, Default)]
pub struct MemoryProducer {
    pub log: Arc<Mutex<ProducerLog>>,
}

impl MemoryProducer {
    pub fn rejecting(attempts: &[usize]) -> Self {
        let producer = Self::default();
        producer.log.lock().unwrap().reject.extend(attempts.iter().copied());
        producer
    }

    pub fn payloads_as_json(&self) -> Vec<serde_json::Value> {
        self.log
            .lock()
            .unwrap()
            .payloads
            .iter()
            .map(|p| serde_json::from_slice(p).unwrap())
            .collect()
    }
}

#[async_trait]
impl MessageProducer for MemoryProducer {
    async fn send(&mut self, payload: Bytes) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        let attempt = log.attempts;
        log.attempts += 1;
        if log.reject.contains(&attempt) {
            return Err(Error::Send {
                message: format!("dispatch {} rejected", attempt),
            });
        }
        log.payloads.push(payload);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.log.lock().unwrap().flushes += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

pub fn create_bridge(producer: &MemoryProducer, flush_interval: u64) -> Bridge<MemoryProducer> {
    let config = BridgeConfig {
        flush_interval,
        ..BridgeConfig::default()
    };
    Bridge::with_channel(DeliveryChannel::with_producer(producer.clone(), &config))
}

/// Serializes as MessagePack `bin`, the way the agent ships raw strings.
pub struct Bin<'a>(pub &'a [u8]);

impl Serialize for Bin<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

/// Appends one `[timestamp, record]` entry to a batch buffer.
pub fn push_entry<T: Serialize>(buf: &mut Vec<u8>, timestamp: u32, record: &T) {
    buf.extend(rmp_serde::to_vec(&(timestamp, record)).unwrap());
}
