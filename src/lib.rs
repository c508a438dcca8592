pub mod config;
pub mod error;
mod gc;
mod mapping;
pub mod record;
mod refs;
mod schema;
mod storage;
mod txn;

pub use crate::config::{DurabilityMode, StoreConfig};
pub use crate::error::{StoreError, StoreErrorCode};
pub use crate::record::{Reference, StoreMeta, Tuple};
pub use crate::schema::{STORE_VERSION, SUPPORTED_VERSIONS};

use crate::refs::REF_SEPARATOR;
use crate::txn::Tx;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default file name for a store created relative to a working directory.
pub const DEFAULT_STORE_FILE: &str = "identity.db";

/// Handle on one identity store file.
///
/// The handle holds no open resources: every operation takes the store file
/// under a bounded exclusive lock, runs a single transaction, and releases
/// it again, so concurrent callers serialize on the lock.
pub struct IdentityStore {
    path: PathBuf,
    config: StoreConfig,
}

impl IdentityStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens the store, creating or upgrading it as needed, and returns the
    /// handle used for all further operations.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let path = std::path::absolute(path)?;
        let store = Self { path, config };
        store.write(|tx| schema::ensure_schema(tx, &store.path))?;
        info!(
            path = %store.path.display(),
            version = STORE_VERSION,
            "opened identity store"
        );
        Ok(store)
    }

    /// Absolute path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Associates an internal and external ID with each other.
    ///
    /// Any existing mapping involving either ID is moved to the garbage
    /// bucket, unless it is an exact match of the desired mapping, in which
    /// case only its GC era is refreshed to the store's current era.
    pub fn associate(&self, internal_id: &str, external_id: &str) -> Result<(), StoreError> {
        require_identifier("internal id", internal_id)?;
        require_identifier("external id", external_id)?;
        self.write(|tx| mapping::associate(tx, internal_id, external_id))
    }

    /// Records that the namespace under `internal_id` reaches the namespace
    /// under the prefix `other_id`, so sweeping the former extends to the
    /// latter.
    pub fn add_reference(&self, internal_id: &str, other_id: &str) -> Result<(), StoreError> {
        require_identifier("internal id", internal_id)?;
        require_identifier("reference prefix", other_id)?;
        self.write(|tx| refs::add_reference(tx, internal_id, other_id))
    }

    /// Returns the external ID associated with the given internal ID, if
    /// any, refreshing the mapping's GC era.
    pub fn get_external(&self, internal_id: &str) -> Result<Option<String>, StoreError> {
        self.write(|tx| mapping::get_external(tx, internal_id))
    }

    /// Returns the internal ID associated with the given external ID, if
    /// any, refreshing the mapping's GC era.
    pub fn get_internal(&self, external_id: &str) -> Result<Option<String>, StoreError> {
        self.write(|tx| mapping::get_internal(tx, external_id))
    }

    /// Moves the mapping for this external ID to the garbage bucket.
    pub fn remove_external(&self, external_id: &str) -> Result<(), StoreError> {
        self.write(|tx| mapping::remove_external(tx, external_id.as_bytes(), true))
    }

    /// Moves the mapping for this internal ID to the garbage bucket.
    pub fn remove_internal(&self, internal_id: &str) -> Result<(), StoreError> {
        self.write(|tx| mapping::remove_internal(tx, internal_id.as_bytes(), true))
    }

    /// Removes any mapping involving this external ID from both the live
    /// indices and the garbage bucket.
    pub fn purge_external(&self, external_id: &str) -> Result<(), StoreError> {
        self.write(|tx| mapping::purge_external(tx, external_id))
    }

    /// Removes any mapping involving this internal ID from both the live
    /// indices and the garbage bucket.
    pub fn purge_internal(&self, internal_id: &str) -> Result<(), StoreError> {
        self.write(|tx| mapping::purge_internal(tx, internal_id))
    }

    /// Deletes all reference edges extending from the prefix whose era is
    /// behind the current one.
    pub fn purge_references(&self, internal_id_prefix: &str) -> Result<(), StoreError> {
        self.write(|tx| {
            let purged = refs::purge_references(tx, internal_id_prefix)?;
            debug!(prefix = internal_id_prefix, purged, "purged reference edges");
            Ok(())
        })
    }

    /// All live mappings whose internal ID starts with the prefix, in the
    /// order they were added. An empty prefix matches everything.
    pub fn search(&self, internal_id_prefix: &str) -> Result<Vec<Tuple>, StoreError> {
        self.read(|tx| mapping::search(tx, internal_id_prefix))
    }

    /// All garbage entries under the prefix (following references), in the
    /// order they were added.
    pub fn garbage(&self, internal_id_prefix: &str) -> Result<Vec<Tuple>, StoreError> {
        self.read(|tx| gc::garbage(tx, internal_id_prefix))
    }

    /// Marks every mapping under the prefix (following references) whose
    /// era is behind the current one by copying it into the garbage bucket.
    /// The live indices are left in place; a purge reclaims them.
    pub fn sweep(&self, internal_id_prefix: &str) -> Result<(), StoreError> {
        self.write(|tx| {
            let swept = gc::sweep(tx, internal_id_prefix)?;
            debug!(
                prefix = internal_id_prefix,
                swept, "swept stale mappings to garbage"
            );
            Ok(())
        })
    }

    /// Advances the store's GC era. Existing records are untouched.
    pub fn bump_era(&self) -> Result<(), StoreError> {
        self.write(gc::bump_era)
    }

    pub fn read_era(&self) -> Result<i64, StoreError> {
        self.read(gc::read_era)
    }

    fn read<T>(&self, f: impl FnOnce(&Tx) -> Result<T, StoreError>) -> Result<T, StoreError> {
        txn::with_read(&self.path, &self.config, f)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tx) -> Result<T, StoreError>) -> Result<T, StoreError> {
        txn::with_write(&self.path, &self.config, f)
    }
}

fn require_identifier(what: &str, value: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::InvalidArgument(format!(
            "{what} must not be empty"
        )));
    }
    if value.bytes().any(|b| b == REF_SEPARATOR) {
        return Err(StoreError::InvalidArgument(format!(
            "{what} must not contain the 0x01 separator byte"
        )));
    }
    Ok(())
}
