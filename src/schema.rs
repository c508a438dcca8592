use crate::error::StoreError;
use crate::record::{self, StoreMeta};
use crate::storage::{
    EXTERNAL_TO_INTERNAL, GARBAGE, INTERNAL_TO_EXTERNAL, METADATA, METADATA_KEY, REFERENCES,
};
use crate::txn::Tx;
use semver::{Version, VersionReq};
use std::path::Path;

/// Version written by freshly created stores.
pub const STORE_VERSION: &str = "1.1.0";

/// Range of on-disk versions this build can open.
pub const SUPPORTED_VERSIONS: &str = "1.x";

fn supported_versions() -> VersionReq {
    VersionReq::parse(SUPPORTED_VERSIONS).expect("supported version range literal parses")
}

/// Brings the store up to the current schema inside the opening transaction:
/// creates a fresh store, gates the on-disk version, and upgrades 1.0.0
/// stores by adding the references bucket. Rejects pre-versioning stores.
pub(crate) fn ensure_schema(tx: &mut Tx, path: &Path) -> Result<(), StoreError> {
    if tx.bucket_exists(METADATA) {
        let raw = match tx.get(METADATA, METADATA_KEY)? {
            Some(raw) => raw.to_vec(),
            None => {
                return Err(StoreError::Corrupt(format!(
                    "identity store at '{}' has invalid format",
                    path.display()
                )))
            }
        };
        let mut meta = record::decode_meta(&raw)?;
        let version = Version::parse(&meta.version).map_err(|e| {
            StoreError::Corrupt(format!(
                "identity store at '{}' has unparseable version '{}': {e}",
                path.display(),
                meta.version
            ))
        })?;
        if !supported_versions().matches(&version) {
            return Err(StoreError::Incompatible {
                path: path.display().to_string(),
                supported: SUPPORTED_VERSIONS.to_string(),
                found: meta.version,
            });
        }
        if meta.version == "1.0.0" {
            // 1.0.0 predates the reference graph.
            tx.create_bucket(REFERENCES);
            meta.version = STORE_VERSION.to_string();
            write_meta(tx, &meta)?;
        }
        return Ok(());
    }

    // Mapping data without a metadata bucket predates versioned storage and
    // cannot be upgraded in place.
    if tx.bucket_exists(INTERNAL_TO_EXTERNAL) {
        return Err(StoreError::LegacyUnversioned {
            path: path.display().to_string(),
        });
    }

    tx.create_bucket(METADATA);
    tx.create_bucket(INTERNAL_TO_EXTERNAL);
    tx.create_bucket(EXTERNAL_TO_INTERNAL);
    tx.create_bucket(GARBAGE);
    tx.create_bucket(REFERENCES);
    write_meta(
        tx,
        &StoreMeta {
            version: STORE_VERSION.to_string(),
            created_at_micros: record::now_micros(),
            era: 0,
        },
    )
}

pub(crate) fn read_meta(tx: &Tx) -> Result<StoreMeta, StoreError> {
    let raw = tx
        .get(METADATA, METADATA_KEY)?
        .ok_or_else(|| StoreError::Corrupt("metadata record is missing".into()))?;
    record::decode_meta(raw)
}

pub(crate) fn write_meta(tx: &mut Tx, meta: &StoreMeta) -> Result<(), StoreError> {
    tx.put(METADATA, METADATA_KEY, record::encode_meta(meta)?)
}
