use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeIndexError {
    #[error("codeindex: {0}")]
    Io(String),

    #[error("codeindex: serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for CodeIndexError {
    fn from(e: std::io::Error) -> Self {
        CodeIndexError::Io(e.to_string())
    }
}
