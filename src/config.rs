use crate::Result;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const KEY_BROKER_URL: &str = "PulsarBrokerUrl";
pub const KEY_TOPIC: &str = "Topic";
pub const KEY_TOKEN: &str = "Token";
pub const KEY_PRODUCER_NAME: &str = "ProducerName";
pub const KEY_COMPRESSION_TYPE: &str = "CompressionType";
pub const KEY_BATCHING_MAX_MESSAGES: &str = "BatchingMaxMessages";
pub const KEY_BATCHING_MAX_BYTES: &str = "BatchingMaxBytes";
pub const KEY_BATCHING_MAX_PUBLISH_DELAY_MS: &str = "BatchingMaxPublishDelayMs";
pub const KEY_BLOCK_IF_QUEUE_FULL: &str = "BlockIfQueueFull";
pub const KEY_FLUSH_INTERVAL: &str = "FlushInterval";
pub const KEY_FLUSH_TIMEOUT_MS: &str = "FlushTimeoutMs";

pub const DEFAULT_BROKER_URL: &str = "pulsar://localhost:6650";
pub const DEFAULT_TOPIC: &str = "persistent://moego/basic/test";
pub const DEFAULT_FLUSH_INTERVAL: u64 = 200;
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 10_000;

const MASK_VISIBLE_CHARS: usize = 8;
const MASK_MARKER: &str = "****";

/// Host-provided key/value configuration for one plugin instance.
///
/// Lookups are case-insensitive, the same way the host treats its
/// output section keys.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }
}

/// Configuration loaded from a file, with `PULSAR_BRIDGE_*` environment
/// variables layered on top.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    values: HashMap<String, String>,
}

impl FileConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("PULSAR_BRIDGE").prefix_separator("_"))
            .build()?;

        let values = settings.try_deserialize::<HashMap<String, String>>()?;
        Ok(Self { values })
    }
}

impl ConfigSource for FileConfig {
    fn get(&self, key: &str) -> Option<String> {
        ConfigSource::get(&self.values, key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionKind {
    None,
    #[default]
    Lz4,
    Zlib,
    Zstd,
    Snappy,
}

impl CompressionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "NONE" => Some(CompressionKind::None),
            "LZ4" => Some(CompressionKind::Lz4),
            "ZLIB" => Some(CompressionKind::Zlib),
            "ZSTD" => Some(CompressionKind::Zstd),
            "SNAPPY" => Some(CompressionKind::Snappy),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionKind::None => "NONE",
            CompressionKind::Lz4 => "LZ4",
            CompressionKind::Zlib => "ZLIB",
            CompressionKind::Zstd => "ZSTD",
            CompressionKind::Snappy => "SNAPPY",
        };
        f.write_str(name)
    }
}

/// Resolved settings for the bridge.
#[derive(Clone)]
pub struct BridgeConfig {
    pub broker_url: String,
    pub topic: String,
    pub token: Option<String>,
    pub producer_name: Option<String>,
    pub compression: CompressionKind,
    pub batching_max_messages: Option<u32>,
    pub batching_max_bytes: Option<usize>,
    pub batching_max_publish_delay: Option<Duration>,
    pub block_if_queue_full: bool,
    pub flush_interval: u64,
    pub flush_timeout: Duration,
}

// Hand-written so the token never reaches a log line unmasked.
impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("broker_url", &self.broker_url)
            .field("topic", &self.topic)
            .field("token", &self.masked_token())
            .field("producer_name", &self.producer_name)
            .field("compression", &self.compression)
            .field("batching_max_messages", &self.batching_max_messages)
            .field("batching_max_bytes", &self.batching_max_bytes)
            .field("batching_max_publish_delay", &self.batching_max_publish_delay)
            .field("block_if_queue_full", &self.block_if_queue_full)
            .field("flush_interval", &self.flush_interval)
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            token: None,
            producer_name: None,
            compression: CompressionKind::default(),
            batching_max_messages: None,
            batching_max_bytes: None,
            batching_max_publish_delay: None,
            block_if_queue_full: false,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_timeout: Duration::from_millis(DEFAULT_FLUSH_TIMEOUT_MS),
        }
    }
}

impl BridgeConfig {
    /// Resolves every option from `source`, falling back to the documented
    /// default when a key is absent, empty or unusable.
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> Self {
        let defaults = Self::default();

        let compression = match lookup(source, KEY_COMPRESSION_TYPE) {
            Some(value) => CompressionKind::parse(&value).unwrap_or_else(|| {
                warn!("unsupported {}: {}, using {}", KEY_COMPRESSION_TYPE, value, defaults.compression);
                defaults.compression
            }),
            None => defaults.compression,
        };

        Self {
            broker_url: lookup(source, KEY_BROKER_URL).unwrap_or(defaults.broker_url),
            topic: lookup(source, KEY_TOPIC).unwrap_or(defaults.topic),
            token: lookup(source, KEY_TOKEN),
            producer_name: lookup(source, KEY_PRODUCER_NAME),
            compression,
            batching_max_messages: positive::<S, u32>(source, KEY_BATCHING_MAX_MESSAGES),
            batching_max_bytes: positive::<S, usize>(source, KEY_BATCHING_MAX_BYTES),
            batching_max_publish_delay: positive(source, KEY_BATCHING_MAX_PUBLISH_DELAY_MS)
                .map(Duration::from_millis),
            block_if_queue_full: flag(source, KEY_BLOCK_IF_QUEUE_FULL)
                .unwrap_or(defaults.block_if_queue_full),
            flush_interval: positive(source, KEY_FLUSH_INTERVAL).unwrap_or(defaults.flush_interval),
            flush_timeout: positive(source, KEY_FLUSH_TIMEOUT_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_timeout),
        }
    }

    pub fn masked_token(&self) -> String {
        match &self.token {
            Some(token) => mask_secret(token),
            None => "none".to_string(),
        }
    }
}

/// Reveals at most the first eight characters of `secret` followed by a
/// fixed marker.
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(MASK_VISIBLE_CHARS).collect();
    format!("{}{}", visible, MASK_MARKER)
}

fn lookup<S: ConfigSource + ?Sized>(source: &S, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn positive<S, T>(source: &S, key: &str) -> Option<T>
where
    S: ConfigSource + ?Sized,
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = lookup(source, key)?;
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            warn!("ignoring invalid {}: {}", key, raw);
            None
        }
    }
}

fn flag<S: ConfigSource + ?Sized>(source: &S, key: &str) -> Option<bool> {
    let raw = lookup(source, key)?;
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        warn!("ignoring invalid {}: {}", key, raw);
        None
    }
}
