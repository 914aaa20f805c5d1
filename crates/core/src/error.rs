use thiserror::Error;

#[derive(Error, Debug)]
pub enum GlossError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("invalid offsets in {region}: paragraph {paragraph_start}..{paragraph_end}, word {word_start}..{word_end}")]
    InvalidOffsets {
        region: String,
        paragraph_start: usize,
        paragraph_end: usize,
        word_start: usize,
        word_end: usize,
    },
    #[error("lookup error: {0}")]
    Lookup(String),
    #[error("other: {0}")]
    Other(String),
}

impl GlossError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }
}

pub type Result<T> = std::result::Result<T, GlossError>;

impl From<anyhow::Error> for GlossError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
