//! Error types for LuaVeil

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("required tool not found: {0}")]
    ToolMissing(String),

    #[error("bitmask {mask} out of range, registry accepts 0..={max}")]
    OutOfRange { mask: u64, max: u64 },

    #[error("bit position {0} does not exist in the registry")]
    UnknownBit(u8),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL rejected: {0}")]
    UrlRejected(String),

    #[error("source too large: {size} bytes exceeds the {limit} byte cap")]
    SourceTooLarge { size: u64, limit: u64 },

    #[error("not a Lua file: {0}")]
    NotLua(String),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
