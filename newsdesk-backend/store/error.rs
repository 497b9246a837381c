use std::io;

/// Errors from key-value store operations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("serialization of {key}: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
