use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    Io,
    Encode,
    Corrupt,
    Unavailable,
    Incompatible,
    LegacyUnversioned,
    InvalidArgument,
}

impl StoreErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreErrorCode::Io => "io",
            StoreErrorCode::Encode => "encode",
            StoreErrorCode::Corrupt => "corrupt",
            StoreErrorCode::Unavailable => "unavailable",
            StoreErrorCode::Incompatible => "incompatible",
            StoreErrorCode::LegacyUnversioned => "legacy_unversioned",
            StoreErrorCode::InvalidArgument => "invalid_argument",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("{0}")]
    Corrupt(String),
    #[error("identity store at '{path}' could not be locked within {timeout_ms} ms")]
    Unavailable { path: String, timeout_ms: u64 },
    #[error(
        "identity store at '{path}' has unsupported data store version. Expected {supported}, got {found}"
    )]
    Incompatible {
        path: String,
        supported: String,
        found: String,
    },
    #[error("identity store at '{path}' predates when store became versioned")]
    LegacyUnversioned { path: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    pub fn code(&self) -> StoreErrorCode {
        match self {
            StoreError::Io(_) => StoreErrorCode::Io,
            StoreError::Encode(_) => StoreErrorCode::Encode,
            StoreError::Corrupt(_) => StoreErrorCode::Corrupt,
            StoreError::Unavailable { .. } => StoreErrorCode::Unavailable,
            StoreError::Incompatible { .. } => StoreErrorCode::Incompatible,
            StoreError::LegacyUnversioned { .. } => StoreErrorCode::LegacyUnversioned,
            StoreError::InvalidArgument(_) => StoreErrorCode::InvalidArgument,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}
