use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One identity association: an internal id mapped to an external id, with
/// the creation timestamp and the GC era the record was last touched in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    pub internal_id: String,
    pub external_id: String,
    pub timestamp_micros: u64,
    pub era: i64,
}

/// A reference records that anything named under `internal_id` may reach
/// anything named under a namespace prefix. The prefix rides in the
/// `external_id` slot of the shared tuple shape.
pub type Reference = Tuple;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub version: String,
    pub created_at_micros: u64,
    pub era: i64,
}

pub(crate) fn encode_tuple(tuple: &Tuple) -> Result<Vec<u8>, StoreError> {
    encode("tuple", tuple)
}

pub(crate) fn decode_tuple(bytes: &[u8]) -> Result<Tuple, StoreError> {
    decode("tuple", bytes)
}

pub(crate) fn encode_reference(reference: &Reference) -> Result<Vec<u8>, StoreError> {
    encode("reference", reference)
}

pub(crate) fn decode_reference(bytes: &[u8]) -> Result<Reference, StoreError> {
    decode("reference", bytes)
}

pub(crate) fn encode_meta(meta: &StoreMeta) -> Result<Vec<u8>, StoreError> {
    encode("metadata", meta)
}

pub(crate) fn decode_meta(bytes: &[u8]) -> Result<StoreMeta, StoreError> {
    decode("metadata", bytes)
}

fn encode<T: Serialize>(name: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    rmp_serde::to_vec(value).map_err(|e| StoreError::Encode(format!("failed to encode {name}: {e}")))
}

fn decode<T: DeserializeOwned>(name: &str, bytes: &[u8]) -> Result<T, StoreError> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| StoreError::Corrupt(format!("failed to decode {name}: {e}")))
}

pub(crate) fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
