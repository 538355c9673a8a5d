use crate::{record::NormalizedValue, Result};
use bytes::Bytes;

pub struct JsonSerializer;

impl JsonSerializer {
    /// Encodes a normalized record as compact JSON.
    pub fn serialize(value: &NormalizedValue) -> Result<Bytes> {
        serde_json::to_vec(value).map(Bytes::from).map_err(Into::into)
    }
}
