use thiserror::Error;

// Stable discriminants; callers dispatch on them. ManifestDecode and
// UnknownManifestShape are non-fatal inside the reader (the offending
// frame is forwarded raw), so they only surface through direct
// Serializer use.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("byte stream truncated mid-frame")]
    Truncated,

    #[error("value outside varint range")]
    ValueOutOfRange,

    #[error("manifest body rejected by serializer")]
    ManifestDecode,

    #[error("manifest record of unknown shape")]
    UnknownManifestShape,

    #[error("content id mismatch: expected {expected}, computed {computed}")]
    CidMismatch { expected: String, computed: String },

    #[error("chunk decryption failed")]
    DecryptFailure,

    #[error("no decoder for filter {0:?}")]
    UnresolvedFilter(String),

    #[error("cid collector has no slots")]
    EmptyCollector,
}

pub type Result<T> = std::result::Result<T, Error>;

// Keeps the typed error as the source so Read consumers can downcast
// back to the discriminant
impl From<Error> for std::io::Error {
    fn from(e: Error) -> std::io::Error {
        match e {
            Error::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}
