use crate::error::StoreError;
use crate::record::{self, Reference};
use crate::schema::read_meta;
use crate::storage::REFERENCES;
use crate::txn::Tx;

/// In-key separator between the origin id and the target prefix.
/// Well-formed identifiers never contain control bytes; the public surface
/// rejects ones that do.
pub(crate) const REF_SEPARATOR: u8 = 0x01;

pub(crate) fn ref_key(internal_id: &str, other_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(internal_id.len() + 1 + other_id.len());
    key.extend_from_slice(internal_id.as_bytes());
    key.push(REF_SEPARATOR);
    key.extend_from_slice(other_id.as_bytes());
    key
}

/// Records that the namespace under `internal_id` reaches the namespace
/// under the prefix `other_id`. A duplicate add only refreshes the edge's
/// era.
pub(crate) fn add_reference(
    tx: &mut Tx,
    internal_id: &str,
    other_id: &str,
) -> Result<(), StoreError> {
    let key = ref_key(internal_id, other_id);
    if let Some(raw) = tx.get(REFERENCES, &key)? {
        let mut reference = record::decode_reference(raw)?;
        let era = read_meta(tx)?.era;
        if reference.era < era {
            reference.era = era;
            tx.put(REFERENCES, &key, record::encode_reference(&reference)?)?;
        }
        return Ok(());
    }

    let era = read_meta(tx)?.era;
    let reference = Reference {
        internal_id: internal_id.to_string(),
        external_id: other_id.to_string(),
        timestamp_micros: record::now_micros(),
        era,
    };
    tx.put(REFERENCES, &key, record::encode_reference(&reference)?)
}

/// Transitive prefix expansion over reference edges strictly older than
/// `era`. Edges stamped in the current era were added since the last bump
/// and stay invisible to GC.
///
/// Returns the accumulated prefixes (always seeded with the root) together
/// with the keys of the traversed edges, in traversal order.
pub(crate) fn expand_references(
    tx: &Tx,
    era: i64,
    root_prefix: &str,
) -> Result<(Vec<String>, Vec<Vec<u8>>), StoreError> {
    let mut eligible: Vec<Reference> = Vec::new();
    for value in tx.bucket(REFERENCES)?.values() {
        let reference = record::decode_reference(value)?;
        if reference.era < era {
            eligible.push(reference);
        }
    }
    // Oldest first, so edges extending from prefixes introduced by earlier
    // edges resolve in one pass.
    eligible.sort_by_key(|r| r.timestamp_micros);

    let mut prefixes = vec![root_prefix.to_string()];
    let mut traversed = Vec::new();
    for reference in eligible {
        if prefixes
            .iter()
            .any(|p| reference.internal_id.starts_with(p.as_str()))
        {
            traversed.push(ref_key(&reference.internal_id, &reference.external_id));
            prefixes.push(reference.external_id);
        }
    }
    Ok((prefixes, traversed))
}

/// Deletes every reference edge reachable from the prefix whose era is
/// behind the current one. Returns how many edges went away.
pub(crate) fn purge_references(tx: &mut Tx, prefix: &str) -> Result<usize, StoreError> {
    let era = read_meta(tx)?.era;
    let (_, traversed) = expand_references(tx, era, prefix)?;
    let purged = traversed.len();
    for key in traversed {
        tx.delete(REFERENCES, &key)?;
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::{expand_references, ref_key, REF_SEPARATOR};
    use crate::record::{encode_reference, Reference};
    use crate::storage::{StoreImage, REFERENCES};
    use crate::txn::Tx;

    fn tx_with_references(references: &[Reference]) -> Tx {
        let mut image = StoreImage::default();
        image.create_bucket(REFERENCES);
        let bucket = image.bucket_mut(REFERENCES).expect("bucket");
        for reference in references {
            bucket.insert(
                ref_key(&reference.internal_id, &reference.external_id),
                encode_reference(reference).expect("encode"),
            );
        }
        Tx::new(image)
    }

    fn reference(internal_id: &str, other_id: &str, timestamp_micros: u64, era: i64) -> Reference {
        Reference {
            internal_id: internal_id.into(),
            external_id: other_id.into(),
            timestamp_micros,
            era,
        }
    }

    #[test]
    fn ref_key_separates_origin_and_target() {
        let key = ref_key("a:i1", "b:");
        assert_eq!(key, b"a:i1\x01b:");
        assert_eq!(key.iter().filter(|b| **b == REF_SEPARATOR).count(), 1);
    }

    #[test]
    fn expansion_always_contains_the_root() {
        let tx = tx_with_references(&[]);
        let (prefixes, traversed) = expand_references(&tx, 1, "a:").expect("expand");
        assert_eq!(prefixes, vec!["a:".to_string()]);
        assert!(traversed.is_empty());
    }

    #[test]
    fn expansion_follows_chained_prefixes_in_timestamp_order() {
        // b: is only reachable through the older a: edge, and c: only
        // through the newer b: edge.
        let tx = tx_with_references(&[
            reference("b:i9", "c:", 20, 0),
            reference("a:i1", "b:", 10, 0),
        ]);
        let (prefixes, traversed) = expand_references(&tx, 1, "a:").expect("expand");
        assert_eq!(
            prefixes,
            vec!["a:".to_string(), "b:".to_string(), "c:".to_string()]
        );
        assert_eq!(traversed.len(), 2);
        assert_eq!(traversed[0], ref_key("a:i1", "b:"));
        assert_eq!(traversed[1], ref_key("b:i9", "c:"));
    }

    #[test]
    fn edges_outside_the_expansion_are_not_traversed() {
        let tx = tx_with_references(&[
            reference("a:i1", "b:", 10, 0),
            reference("z:i1", "q:", 11, 0),
        ]);
        let (prefixes, traversed) = expand_references(&tx, 1, "a:").expect("expand");
        assert_eq!(prefixes, vec!["a:".to_string(), "b:".to_string()]);
        assert_eq!(traversed, vec![ref_key("a:i1", "b:")]);
    }

    #[test]
    fn current_era_edges_are_invisible_to_expansion() {
        let tx = tx_with_references(&[
            reference("a:i1", "b:", 10, 1),
            reference("a:i2", "c:", 11, 0),
        ]);
        let (prefixes, _) = expand_references(&tx, 1, "a:").expect("expand");
        assert_eq!(prefixes, vec!["a:".to_string(), "c:".to_string()]);
    }
}
