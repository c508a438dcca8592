use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::storage::{self, Bucket, StoreImage};
use std::path::Path;

/// One transaction over the store image. Mutations mark the transaction
/// dirty; the harness persists only dirty transactions, so read-only work
/// and no-op writes never rewrite the file.
pub(crate) struct Tx {
    image: StoreImage,
    dirty: bool,
}

impl Tx {
    pub(crate) fn new(image: StoreImage) -> Self {
        Self {
            image,
            dirty: false,
        }
    }

    pub fn bucket_exists(&self, name: &str) -> bool {
        self.image.bucket_exists(name)
    }

    pub fn create_bucket(&mut self, name: &str) {
        if self.image.create_bucket(name) {
            self.dirty = true;
        }
    }

    pub fn bucket(&self, name: &str) -> Result<&Bucket, StoreError> {
        self.image.bucket(name)
    }

    pub fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<&[u8]>, StoreError> {
        Ok(self.image.bucket(bucket)?.get(key).map(Vec::as_slice))
    }

    pub fn put(&mut self, bucket: &str, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.image.bucket_mut(bucket)?.insert(key.to_vec(), value);
        self.dirty = true;
        Ok(())
    }

    pub fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<(), StoreError> {
        if self.image.bucket_mut(bucket)?.remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }
}

/// Runs `f` under the file lock against a read-only view. Nothing is ever
/// written back, even if `f` errors.
pub(crate) fn with_read<T>(
    path: &Path,
    config: &StoreConfig,
    f: impl FnOnce(&Tx) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let _lock = storage::acquire_lock(path, config)?;
    let tx = Tx::new(storage::load_image(path)?);
    f(&tx)
}

/// Runs `f` under the file lock and commits the image atomically when `f`
/// succeeds and touched something. An error from `f` leaves the file
/// untouched; a commit error is reported only when `f` itself succeeded.
pub(crate) fn with_write<T>(
    path: &Path,
    config: &StoreConfig,
    f: impl FnOnce(&mut Tx) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let _lock = storage::acquire_lock(path, config)?;
    let mut tx = Tx::new(storage::load_image(path)?);
    let out = f(&mut tx)?;
    if tx.dirty {
        storage::persist_image(path, &tx.image, config.durability_mode)?;
    }
    Ok(out)
}
