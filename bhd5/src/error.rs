use crate::hash::PathHash;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // dependency errors
    #[error("enum conversion: {0}")]
    Strum(#[from] strum::ParseError),
    #[cfg(feature = "encryption")]
    #[error("rsa: {0}")]
    Rsa(#[from] rsa::errors::Error),
    #[cfg(feature = "encryption")]
    #[error("rsa key is not in PEM format: {0}")]
    RsaPem(#[from] rsa::pkcs8::spki::Error),

    // std errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("utf8 conversion: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("utf16 conversion: {0}")]
    Utf16(#[from] std::string::FromUtf16Error),

    // path/filesystem shape errors
    #[error("not found: {0}")]
    NotFound(String),
    #[error("`{0}` is not a file")]
    NotAFile(String),
    #[error("`{0}` is not a directory")]
    NotADirectory(String),
    #[error("`{0}` is a file, expected a directory")]
    IsAFile(String),
    #[error("`{0}` is a directory, expected a file")]
    IsADirectory(String),
    #[error("expected a relative path but `{path}` (parameter `{param}`) is absolute")]
    Rooted { param: &'static str, path: String },

    // archive/entry errors
    #[error("entry at offset {offset} length {length} exceeds data stream length {stream_len}")]
    MalformedEntry {
        offset: i64,
        length: i64,
        stream_len: i64,
    },
    #[error("hash {hash:#x} is shared by `{existing}` and `{incoming}`")]
    HashCollision {
        hash: PathHash,
        existing: String,
        incoming: String,
    },
    #[error("path `{path}` was already present in the dictionary")]
    DuplicateValue { path: String },
    #[error("archive does not match the expected container format")]
    UnrecognizedArchive,
    #[error("AES/RSA decryption failed")]
    CryptoFailure,
    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}
