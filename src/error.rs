use thiserror::Error;

/// Failures while decoding the serialized value format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("expected {expected} at offset {offset}")]
    Unexpected { expected: &'static str, offset: usize },
    #[error("invalid number at offset {offset}")]
    InvalidNumber { offset: usize },
    #[error("unsupported type tag '{tag}' at offset {offset}")]
    UnsupportedType { tag: char, offset: usize },
    #[error("trailing data at offset {offset}")]
    TrailingData { offset: usize },
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
}

/// Infrastructure failures. Authentication failures are never errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt value in {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: CodecError,
    },
    #[error("invalid table prefix: {0:?}")]
    InvalidPrefix(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("entropy source failure: {0}")]
    Entropy(#[from] rand::Error),
    #[error("hash error")]
    Hash,
    #[error("no key material configured for {0}")]
    MissingKey(String),
}

impl StoreError {
    pub(crate) fn decode(context: impl Into<String>, source: CodecError) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
