use crate::error::StoreError;
use crate::record::{self, Tuple};
use crate::schema::read_meta;
use crate::storage::{EXTERNAL_TO_INTERNAL, GARBAGE, INTERNAL_TO_EXTERNAL};
use crate::txn::Tx;

/// Associates an internal and an external id in both directions.
///
/// Any existing mapping involving either id moves to the garbage bucket,
/// unless it is an exact match of the desired pair, in which case only the
/// record's era is refreshed.
pub(crate) fn associate(
    tx: &mut Tx,
    internal_id: &str,
    external_id: &str,
) -> Result<(), StoreError> {
    // A garbage entry for this external id comes back to life.
    tx.delete(GARBAGE, external_id.as_bytes())?;

    if let Some(tuple) = read_tuple(tx, internal_id.as_bytes())? {
        if tuple.external_id == external_id {
            return refresh_era(tx, tuple);
        }
        remove_internal(tx, internal_id.as_bytes(), true)?;
    }
    remove_external(tx, external_id.as_bytes(), true)?;

    let era = read_meta(tx)?.era;
    let tuple = Tuple {
        internal_id: internal_id.to_string(),
        external_id: external_id.to_string(),
        timestamp_micros: record::now_micros(),
        era,
    };
    tx.put(
        INTERNAL_TO_EXTERNAL,
        internal_id.as_bytes(),
        record::encode_tuple(&tuple)?,
    )?;
    tx.put(
        EXTERNAL_TO_INTERNAL,
        external_id.as_bytes(),
        internal_id.as_bytes().to_vec(),
    )?;
    Ok(())
}

pub(crate) fn get_external(tx: &mut Tx, internal_id: &str) -> Result<Option<String>, StoreError> {
    let Some(tuple) = read_tuple(tx, internal_id.as_bytes())? else {
        return Ok(None);
    };
    let external_id = tuple.external_id.clone();
    refresh_era(tx, tuple)?;
    Ok(Some(external_id))
}

pub(crate) fn get_internal(tx: &mut Tx, external_id: &str) -> Result<Option<String>, StoreError> {
    let Some(iid) = tx
        .get(EXTERNAL_TO_INTERNAL, external_id.as_bytes())?
        .map(<[u8]>::to_vec)
    else {
        return Ok(None);
    };
    if let Some(tuple) = read_tuple(tx, &iid)? {
        refresh_era(tx, tuple)?;
    }
    let internal_id = String::from_utf8(iid)
        .map_err(|_| StoreError::Corrupt("reverse index holds a non-utf8 internal id".into()))?;
    Ok(Some(internal_id))
}

pub(crate) fn remove_external(
    tx: &mut Tx,
    external_id: &[u8],
    to_garbage: bool,
) -> Result<(), StoreError> {
    let Some(iid) = tx.get(EXTERNAL_TO_INTERNAL, external_id)?.map(<[u8]>::to_vec) else {
        return Ok(());
    };
    tx.delete(EXTERNAL_TO_INTERNAL, external_id)?;

    // Drop the forward entry only while it still points back at this
    // external id; a repointed internal id keeps its newer mapping.
    if let Some(tuple) = read_tuple(tx, &iid)? {
        if tuple.external_id.as_bytes() == external_id {
            tx.delete(INTERNAL_TO_EXTERNAL, &iid)?;
            if to_garbage {
                add_to_garbage(tx, &tuple)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn remove_internal(
    tx: &mut Tx,
    internal_id: &[u8],
    to_garbage: bool,
) -> Result<(), StoreError> {
    let Some(tuple) = read_tuple(tx, internal_id)? else {
        return Ok(());
    };
    tx.delete(INTERNAL_TO_EXTERNAL, internal_id)?;

    // The reverse edge goes too, but only while it still agrees.
    let eid = tuple.external_id.as_bytes().to_vec();
    if tx
        .get(EXTERNAL_TO_INTERNAL, &eid)?
        .is_some_and(|v| v == internal_id)
    {
        tx.delete(EXTERNAL_TO_INTERNAL, &eid)?;
    }
    if to_garbage {
        add_to_garbage(tx, &tuple)?;
    }
    Ok(())
}

pub(crate) fn purge_external(tx: &mut Tx, external_id: &str) -> Result<(), StoreError> {
    remove_external(tx, external_id.as_bytes(), false)?;
    tx.delete(GARBAGE, external_id.as_bytes())
}

pub(crate) fn purge_internal(tx: &mut Tx, internal_id: &str) -> Result<(), StoreError> {
    remove_internal(tx, internal_id.as_bytes(), false)?;

    // Garbage is keyed by external id, so matching entries are found by
    // decoding values.
    let mut stale = Vec::new();
    for (key, value) in tx.bucket(GARBAGE)? {
        if record::decode_tuple(value)?.internal_id == internal_id {
            stale.push(key.clone());
        }
    }
    for key in stale {
        tx.delete(GARBAGE, &key)?;
    }
    Ok(())
}

/// All live tuples whose internal id starts with the prefix, ascending by
/// creation timestamp. An empty prefix matches everything.
pub(crate) fn search(tx: &Tx, internal_id_prefix: &str) -> Result<Vec<Tuple>, StoreError> {
    let mut found = Vec::new();
    for (key, value) in tx.bucket(INTERNAL_TO_EXTERNAL)? {
        if key.starts_with(internal_id_prefix.as_bytes()) {
            found.push(record::decode_tuple(value)?);
        }
    }
    found.sort_by_key(|t| t.timestamp_micros);
    Ok(found)
}

/// Parks a tuple in the garbage bucket, keyed by external id. A re-marked
/// external id overwrites the previous entry.
pub(crate) fn add_to_garbage(tx: &mut Tx, tuple: &Tuple) -> Result<(), StoreError> {
    tx.put(
        GARBAGE,
        tuple.external_id.as_bytes(),
        record::encode_tuple(tuple)?,
    )
}

/// Rewrites the forward tuple stamped with the current era, but only when
/// its era is strictly behind.
pub(crate) fn refresh_era(tx: &mut Tx, mut tuple: Tuple) -> Result<(), StoreError> {
    let era = read_meta(tx)?.era;
    if tuple.era < era {
        tuple.era = era;
        let key = tuple.internal_id.clone();
        tx.put(
            INTERNAL_TO_EXTERNAL,
            key.as_bytes(),
            record::encode_tuple(&tuple)?,
        )?;
    }
    Ok(())
}

pub(crate) fn read_tuple(tx: &Tx, internal_id: &[u8]) -> Result<Option<Tuple>, StoreError> {
    tx.get(INTERNAL_TO_EXTERNAL, internal_id)?
        .map(record::decode_tuple)
        .transpose()
}
