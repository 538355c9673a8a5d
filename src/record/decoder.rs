use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::io::Cursor;
use tracing::{debug, trace};

use super::types::{LogEvent, RecordValue, Scalar};
use crate::{Error, Result};

const EVENT_TIME_EXT_TYPE: i64 = 0;

/// Decodes the entries of a host batch buffer.
///
/// The buffer is a concatenation of MessagePack values, each shaped
/// `[timestamp, record]` or `[[timestamp, metadata], record]`. A badly
/// shaped entry yields an error and decoding moves on; a buffer that
/// cannot be read any further yields one error and ends the iteration.
pub struct EventDecoder<'a> {
    cursor: Cursor<&'a [u8]>,
    finished: bool,
}

impl<'a> EventDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
            finished: data.is_empty(),
        }
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(self.cursor.position() as usize)
    }
}

impl Iterator for EventDecoder<'_> {
    type Item = Result<LogEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.remaining() == 0 {
            return None;
        }

        let offset = self.cursor.position();
        let mut de = rmp_serde::Deserializer::new(&mut self.cursor);
        match RecordValue::deserialize(&mut de) {
            Ok(entry) => {
                trace!(offset, "decoded batch entry");
                Some(into_event(entry))
            }
            Err(e) => {
                self.finished = true;
                debug!(offset, "stopping batch decode: {}", e);
                Some(Err(Error::Decode {
                    message: format!("corrupt entry at offset {}: {}", offset, e),
                }))
            }
        }
    }
}

fn into_event(entry: RecordValue) -> Result<LogEvent> {
    let mut items = match entry {
        RecordValue::Array(items) if items.len() == 2 => items,
        other => {
            return Err(Error::Decode {
                message: format!("expected [timestamp, record] entry, got {}", shape_name(&other)),
            })
        }
    };

    let record = items.pop().unwrap_or(RecordValue::Nil);
    let header = items.pop().unwrap_or(RecordValue::Nil);

    Ok(LogEvent {
        timestamp: parse_timestamp(&header),
        record,
    })
}

/// Reads an entry timestamp: integer or float seconds, the EventTime
/// extension, or an `[EventTime, metadata]` header.
pub fn parse_timestamp(value: &RecordValue) -> Option<DateTime<Utc>> {
    match value {
        RecordValue::Scalar(Scalar::UInt(secs)) => {
            Utc.timestamp_opt(i64::try_from(*secs).ok()?, 0).single()
        }
        RecordValue::Scalar(Scalar::Int(secs)) => Utc.timestamp_opt(*secs, 0).single(),
        RecordValue::Scalar(Scalar::Float(secs)) if secs.is_finite() => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round() as u32;
            Utc.timestamp_opt(whole as i64, nanos.min(999_999_999)).single()
        }
        RecordValue::Array(items) if items.len() == 2 => match (&items[0], &items[1]) {
            (tag, RecordValue::Bytes(data)) if tag.as_u64() == Some(EVENT_TIME_EXT_TYPE as u64) => {
                parse_event_time(data)
            }
            (inner, RecordValue::Map(_)) => parse_timestamp(inner),
            _ => None,
        },
        _ => None,
    }
}

fn parse_event_time(data: &[u8]) -> Option<DateTime<Utc>> {
    let bytes: [u8; 8] = data.try_into().ok()?;
    let secs = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let nanos = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Utc.timestamp_opt(i64::from(secs), nanos).single()
}

fn shape_name(value: &RecordValue) -> &'static str {
    match value {
        RecordValue::Nil => "nil",
        RecordValue::Bytes(_) => "bytes",
        RecordValue::Map(_) => "map",
        RecordValue::MapArray(_) => "array of maps",
        RecordValue::Array(_) => "array",
        RecordValue::Scalar(_) => "scalar",
    }
}
