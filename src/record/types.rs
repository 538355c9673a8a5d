use chrono::{DateTime, Utc};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;

/// Key/value pairs of a mapping as they came off the wire. Keys are not
/// yet known to be strings and may repeat.
pub type RecordEntries = Vec<(RecordValue, RecordValue)>;

/// A dynamically typed record value as decoded from the agent's wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Nil,
    /// Raw bytes, interpreted as text when normalized.
    Bytes(Vec<u8>),
    Map(RecordEntries),
    /// Bulk form: a sequence made only of mappings.
    MapArray(Vec<RecordEntries>),
    Array(Vec<RecordValue>),
    Scalar(Scalar),
}

/// Leaf values that pass through normalization unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

impl RecordValue {
    pub fn str(value: impl Into<String>) -> Self {
        RecordValue::Scalar(Scalar::Str(value.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RecordValue::Scalar(Scalar::UInt(n)) => Some(*n),
            RecordValue::Scalar(Scalar::Int(n)) => u64::try_from(*n).ok(),
            _ => None,
        }
    }
}

impl From<Scalar> for RecordValue {
    fn from(scalar: Scalar) -> Self {
        RecordValue::Scalar(scalar)
    }
}

impl<'de> Deserialize<'de> for RecordValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RecordValueVisitor)
    }
}

struct RecordValueVisitor;

impl<'de> Visitor<'de> for RecordValueVisitor {
    type Value = RecordValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a MessagePack value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<RecordValue, E> {
        Ok(RecordValue::Nil)
    }

    fn visit_none<E: de::Error>(self) -> Result<RecordValue, E> {
        Ok(RecordValue::Nil)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<RecordValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        RecordValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RecordValue, E> {
        Ok(Scalar::Bool(v).into())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RecordValue, E> {
        Ok(Scalar::Int(v).into())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RecordValue, E> {
        Ok(Scalar::UInt(v).into())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RecordValue, E> {
        Ok(Scalar::Float(v).into())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RecordValue, E> {
        Ok(Scalar::Str(v.to_owned()).into())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RecordValue, E> {
        Ok(Scalar::Str(v).into())
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<RecordValue, E> {
        Ok(RecordValue::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<RecordValue, E> {
        Ok(RecordValue::Bytes(v))
    }

    // Extension types (e.g. EventTime) surface as a newtype around a
    // (type, data) sequence.
    fn visit_newtype_struct<D>(self, deserializer: D) -> Result<RecordValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        RecordValue::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<RecordValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element::<RecordValue>()? {
            items.push(item);
        }

        let all_maps = !items.is_empty() && items.iter().all(|v| matches!(v, RecordValue::Map(_)));
        if all_maps {
            let maps = items
                .into_iter()
                .filter_map(|v| match v {
                    RecordValue::Map(entries) => Some(entries),
                    _ => None,
                })
                .collect();
            return Ok(RecordValue::MapArray(maps));
        }

        Ok(RecordValue::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<RecordValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0).min(1024));
        while let Some((key, value)) = map.next_entry::<RecordValue, RecordValue>()? {
            entries.push((key, value));
        }
        Ok(RecordValue::Map(entries))
    }
}

/// A record value whose every mapping key is a string.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Null,
    String(String),
    Array(Vec<NormalizedValue>),
    /// Entries keep first-insertion order; keys are unique.
    Object(Vec<(String, NormalizedValue)>),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl NormalizedValue {
    pub fn get(&self, key: &str) -> Option<&NormalizedValue> {
        match self {
            NormalizedValue::Object(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }
}

impl Serialize for NormalizedValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            NormalizedValue::Null => serializer.serialize_unit(),
            NormalizedValue::String(s) => serializer.serialize_str(s),
            NormalizedValue::Bool(b) => serializer.serialize_bool(*b),
            NormalizedValue::Int(n) => serializer.serialize_i64(*n),
            NormalizedValue::UInt(n) => serializer.serialize_u64(*n),
            NormalizedValue::Float(f) => {
                if !f.is_finite() {
                    return Err(ser::Error::custom(format!("unsupported float value: {}", f)));
                }
                serializer.serialize_f64(*f)
            }
            NormalizedValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            NormalizedValue::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// One entry of a host batch: the agent's timestamp plus the record body.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: Option<DateTime<Utc>>,
    pub record: RecordValue,
}
