use crate::config::{DurabilityMode, StoreConfig};
use crate::error::StoreError;
use crc32c::crc32c;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

const MAGIC: &[u8; 8] = b"IDSTORE1";
const HEADER_LEN: usize = MAGIC.len() + 4;

pub(crate) const METADATA: &str = "metadata";
pub(crate) const INTERNAL_TO_EXTERNAL: &str = "internalToExternal";
pub(crate) const EXTERNAL_TO_INTERNAL: &str = "externalToInternal";
pub(crate) const GARBAGE: &str = "garbage";
pub(crate) const REFERENCES: &str = "references";

/// Singleton key of the metadata record inside the metadata bucket.
pub(crate) const METADATA_KEY: &[u8] = b"metadata";

pub(crate) type Bucket = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory image of the whole store file: named byte-to-byte buckets.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoreImage {
    buckets: BTreeMap<String, Bucket>,
}

impl StoreImage {
    pub fn bucket_exists(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    /// Creates the bucket if absent. Returns true when it was newly created.
    pub fn create_bucket(&mut self, name: &str) -> bool {
        if self.buckets.contains_key(name) {
            return false;
        }
        self.buckets.insert(name.to_string(), Bucket::new());
        true
    }

    pub fn bucket(&self, name: &str) -> Result<&Bucket, StoreError> {
        self.buckets
            .get(name)
            .ok_or_else(|| missing_bucket(name))
    }

    pub fn bucket_mut(&mut self, name: &str) -> Result<&mut Bucket, StoreError> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| missing_bucket(name))
    }
}

fn missing_bucket(name: &str) -> StoreError {
    StoreError::Corrupt(format!("bucket '{name}' is missing from the store"))
}

/// Loads the store image. A missing or zero-length file is an empty store;
/// anything else must carry the magic, a valid checksum, and a decodable
/// payload.
pub(crate) fn load_image(path: &Path) -> Result<StoreImage, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StoreImage::default()),
        Err(err) => return Err(err.into()),
    };
    if bytes.is_empty() {
        return Ok(StoreImage::default());
    }
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(StoreError::Corrupt(format!(
            "identity store at '{}' has invalid format",
            path.display()
        )));
    }
    let stored_crc = u32::from_be_bytes(
        bytes[MAGIC.len()..HEADER_LEN]
            .try_into()
            .expect("checksum slice is four bytes"),
    );
    let payload = &bytes[HEADER_LEN..];
    if crc32c(payload) != stored_crc {
        return Err(StoreError::Corrupt(format!(
            "identity store at '{}' failed its checksum",
            path.display()
        )));
    }
    rmp_serde::from_slice(payload).map_err(|e| {
        StoreError::Corrupt(format!(
            "identity store at '{}' has undecodable contents: {e}",
            path.display()
        ))
    })
}

/// Commits the image: temp file in the store directory, rename over the
/// store path, directory fsync under full durability. Owner-only mode on
/// unix.
pub(crate) fn persist_image(
    path: &Path,
    image: &StoreImage,
    durability: DurabilityMode,
) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Io(io::Error::other("store path has no parent directory")))?;

    let payload =
        rmp_serde::to_vec(image).map_err(|e| StoreError::Encode(format!("store image: {e}")))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&crc32c(&payload).to_be_bytes());
    out.extend_from_slice(&payload);

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&out)?;
    tmp.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    if durability == DurabilityMode::Full {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    if durability == DurabilityMode::Full {
        fsync_dir(dir)?;
    }
    Ok(())
}

fn fsync_dir(path: &Path) -> Result<(), StoreError> {
    let dir = File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

/// Exclusive advisory lock on the store's sidecar lock file. Held for the
/// duration of one transaction; released on drop.
#[derive(Debug)]
pub(crate) struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

/// Takes the exclusive lock, retrying until the configured timeout elapses.
pub(crate) fn acquire_lock(path: &Path, config: &StoreConfig) -> Result<StoreLock, StoreError> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))?;

    let contended_kind = fs2::lock_contended_error().kind();
    let deadline = Instant::now() + Duration::from_millis(config.lock_timeout_ms);
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(StoreLock { file }),
            Err(err) if err.kind() == contended_kind => {
                if Instant::now() >= deadline {
                    return Err(StoreError::Unavailable {
                        path: path.display().to_string(),
                        timeout_ms: config.lock_timeout_ms,
                    });
                }
                thread::sleep(Duration::from_millis(config.lock_retry_interval_ms));
            }
            Err(err) => return Err(err.into()),
        }
    }
}
