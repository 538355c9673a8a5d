use std::collections::HashMap;
use tracing::trace;

use super::types::{NormalizedValue, RecordEntries, RecordValue, Scalar};
use crate::{Error, Result};

/// Containers nested deeper than this are rejected instead of recursed into.
pub const MAX_DEPTH: usize = 128;

/// Converts a decoded record into a string-keyed structure ready for
/// JSON encoding.
///
/// Byte strings become text, mappings get their keys checked to be
/// strings, sequences are converted element by element and every other
/// scalar passes through untouched. A non-string key fails the whole
/// record.
pub fn normalize(value: RecordValue) -> Result<NormalizedValue> {
    normalize_at(value, 0)
}

fn normalize_at(value: RecordValue, depth: usize) -> Result<NormalizedValue> {
    match value {
        RecordValue::Nil => Ok(NormalizedValue::Null),
        RecordValue::Bytes(bytes) => Ok(NormalizedValue::String(bytes_to_text(bytes))),
        RecordValue::Map(entries) => normalize_map(entries, depth + 1),
        RecordValue::MapArray(maps) => {
            check_depth(depth + 1)?;
            maps.into_iter()
                .map(|entries| normalize_map(entries, depth + 2))
                .collect::<Result<Vec<_>>>()
                .map(NormalizedValue::Array)
        }
        RecordValue::Array(items) => {
            check_depth(depth + 1)?;
            items
                .into_iter()
                .map(|item| normalize_at(item, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(NormalizedValue::Array)
        }
        RecordValue::Scalar(scalar) => Ok(scalar.into()),
    }
}

fn normalize_map(entries: RecordEntries, depth: usize) -> Result<NormalizedValue> {
    check_depth(depth)?;

    let mut object: Vec<(String, NormalizedValue)> = Vec::with_capacity(entries.len());
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    for (key, value) in entries {
        let key = match key {
            RecordValue::Scalar(Scalar::Str(key)) => key,
            other => {
                return Err(Error::Normalization {
                    message: format!("mapping key is not a string: {:?}", other),
                })
            }
        };
        let value = normalize_at(value, depth)?;

        // Later duplicates overwrite the value but keep the first position.
        match slots.get(&key) {
            Some(&slot) => {
                trace!("duplicate key '{}' replaced", key);
                object[slot].1 = value;
            }
            None => {
                slots.insert(key.clone(), object.len());
                object.push((key, value));
            }
        }
    }

    Ok(NormalizedValue::Object(object))
}

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::Normalization {
            message: format!("record nesting exceeds {} levels", MAX_DEPTH),
        });
    }
    Ok(())
}

fn bytes_to_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

impl From<Scalar> for NormalizedValue {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => NormalizedValue::Bool(b),
            Scalar::Int(n) => NormalizedValue::Int(n),
            Scalar::UInt(n) => NormalizedValue::UInt(n),
            Scalar::Float(f) => NormalizedValue::Float(f),
            Scalar::Str(s) => NormalizedValue::String(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: RecordValue) -> (RecordValue, RecordValue) {
        (RecordValue::str(key), value)
    }

    #[test]
    fn test_bytes_become_text() {
        let value = normalize(RecordValue::Bytes(b"hello".to_vec())).unwrap();
        assert_eq!(value, NormalizedValue::String("hello".to_string()));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let value = normalize(RecordValue::Bytes(vec![b'o', b'k', 0xff])).unwrap();
        assert_eq!(value, NormalizedValue::String("ok\u{fffd}".to_string()));
    }

    #[test]
    fn test_nil_and_scalars_pass_through() {
        assert_eq!(normalize(RecordValue::Nil).unwrap(), NormalizedValue::Null);
        assert_eq!(
            normalize(Scalar::Int(-7).into()).unwrap(),
            NormalizedValue::Int(-7)
        );
        assert_eq!(
            normalize(Scalar::Bool(true).into()).unwrap(),
            NormalizedValue::Bool(true)
        );
        assert_eq!(
            normalize(RecordValue::str("already text")).unwrap(),
            NormalizedValue::String("already text".to_string())
        );
    }

    #[test]
    fn test_nested_map_and_arrays() {
        let record = RecordValue::Map(vec![
            entry("log", RecordValue::Bytes(b"started".to_vec())),
            entry(
                "kubernetes",
                RecordValue::Map(vec![entry("pod", RecordValue::Bytes(b"api-0".to_vec()))]),
            ),
            entry(
                "tags",
                RecordValue::Array(vec![
                    RecordValue::Bytes(b"a".to_vec()),
                    Scalar::UInt(2).into(),
                    RecordValue::Nil,
                ]),
            ),
        ]);

        let normalized = normalize(record).unwrap();

        assert_eq!(
            normalized.get("log"),
            Some(&NormalizedValue::String("started".to_string()))
        );
        assert_eq!(
            normalized.get("kubernetes").and_then(|k| k.get("pod")),
            Some(&NormalizedValue::String("api-0".to_string()))
        );
        assert_eq!(
            normalized.get("tags"),
            Some(&NormalizedValue::Array(vec![
                NormalizedValue::String("a".to_string()),
                NormalizedValue::UInt(2),
                NormalizedValue::Null,
            ]))
        );
    }

    #[test]
    fn test_map_array_bulk_form() {
        let record = RecordValue::MapArray(vec![
            vec![entry("id", Scalar::Int(1).into())],
            vec![entry("id", Scalar::Int(2).into())],
        ]);

        let normalized = normalize(record).unwrap();
        match normalized {
            NormalizedValue::Array(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].get("id"), Some(&NormalizedValue::Int(2)));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_non_string_key_fails_record() {
        let record = RecordValue::Map(vec![
            entry("ok", RecordValue::Nil),
            (Scalar::Int(42).into(), RecordValue::Nil),
        ]);

        let err = normalize(record).unwrap_err();
        assert!(matches!(err, Error::Normalization { .. }));
    }

    #[test]
    fn test_bytes_key_is_not_a_string() {
        let record = RecordValue::Map(vec![(RecordValue::Bytes(b"k".to_vec()), RecordValue::Nil)]);
        assert!(normalize(record).is_err());
    }

    #[test]
    fn test_non_string_key_inside_bulk_form() {
        let record = RecordValue::MapArray(vec![
            vec![entry("fine", RecordValue::Nil)],
            vec![(Scalar::Bool(false).into(), RecordValue::Nil)],
        ]);
        assert!(normalize(record).is_err());
    }

    #[test]
    fn test_duplicate_keys_last_wins_first_position() {
        let record = RecordValue::Map(vec![
            entry("a", Scalar::Int(1).into()),
            entry("b", Scalar::Int(2).into()),
            entry("a", Scalar::Int(3).into()),
        ]);

        let normalized = normalize(record).unwrap();
        assert_eq!(
            normalized,
            NormalizedValue::Object(vec![
                ("a".to_string(), NormalizedValue::Int(3)),
                ("b".to_string(), NormalizedValue::Int(2)),
            ])
        );
    }

    #[test]
    fn test_wide_map_keeps_order() {
        const WIDTH: usize = 50_000;

        let mut entries: Vec<_> = (0..WIDTH)
            .map(|i| entry(&format!("field_{}", i), Scalar::UInt(i as u64).into()))
            .collect();
        entries.push(entry("field_0", RecordValue::str("replaced")));

        let started = std::time::Instant::now();
        let normalized = normalize(RecordValue::Map(entries)).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(5));

        match normalized {
            NormalizedValue::Object(fields) => {
                assert_eq!(fields.len(), WIDTH);
                assert_eq!(fields[0].0, "field_0");
                assert_eq!(fields[0].1, NormalizedValue::String("replaced".to_string()));
                for (i, (key, value)) in fields.iter().enumerate().skip(1) {
                    assert_eq!(key, &format!("field_{}", i));
                    assert_eq!(value, &NormalizedValue::UInt(i as u64));
                }
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_excessive_nesting_is_rejected() {
        let mut value = RecordValue::Nil;
        for _ in 0..(MAX_DEPTH + 5) {
            value = RecordValue::Array(vec![value]);
        }
        assert!(matches!(
            normalize(value),
            Err(Error::Normalization { .. })
        ));

        let mut shallow = RecordValue::Nil;
        for _ in 0..10 {
            shallow = RecordValue::Map(vec![entry("child", shallow)]);
        }
        assert!(normalize(shallow).is_ok());
    }
}
