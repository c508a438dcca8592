use crate::error::StoreError;
use crate::mapping::add_to_garbage;
use crate::record::{self, Tuple};
use crate::refs::expand_references;
use crate::schema::{read_meta, write_meta};
use crate::storage::{GARBAGE, INTERNAL_TO_EXTERNAL};
use crate::txn::Tx;

pub(crate) fn bump_era(tx: &mut Tx) -> Result<(), StoreError> {
    let mut meta = read_meta(tx)?;
    meta.era += 1;
    write_meta(tx, &meta)
}

pub(crate) fn read_era(tx: &Tx) -> Result<i64, StoreError> {
    Ok(read_meta(tx)?.era)
}

/// Copies every mapping under the expanded prefixes whose era is behind the
/// current one into the garbage bucket. Marking only: the live indices stay
/// in place until an explicit remove or purge reclaims them.
pub(crate) fn sweep(tx: &mut Tx, internal_id_prefix: &str) -> Result<usize, StoreError> {
    let era = read_meta(tx)?.era;
    let (prefixes, _) = expand_references(tx, era, internal_id_prefix)?;

    let mut stale: Vec<Tuple> = Vec::new();
    for (key, value) in tx.bucket(INTERNAL_TO_EXTERNAL)? {
        if !prefixes.iter().any(|p| key.starts_with(p.as_bytes())) {
            continue;
        }
        let tuple = record::decode_tuple(value)?;
        if tuple.era < era {
            stale.push(tuple);
        }
    }
    let swept = stale.len();
    for tuple in &stale {
        add_to_garbage(tx, tuple)?;
    }
    Ok(swept)
}

/// All garbage entries whose internal id falls under the expanded prefixes,
/// ascending by creation timestamp.
pub(crate) fn garbage(tx: &Tx, internal_id_prefix: &str) -> Result<Vec<Tuple>, StoreError> {
    let era = read_meta(tx)?.era;
    let (prefixes, _) = expand_references(tx, era, internal_id_prefix)?;

    let mut found = Vec::new();
    for value in tx.bucket(GARBAGE)?.values() {
        let tuple = record::decode_tuple(value)?;
        if prefixes
            .iter()
            .any(|p| tuple.internal_id.starts_with(p.as_str()))
        {
            found.push(tuple);
        }
    }
    found.sort_by_key(|t| t.timestamp_micros);
    Ok(found)
}
