use thiserror::Error;

#[derive(Error, Debug)]
pub enum NnError {
    #[error("nnindex: no data provided to build over")]
    EmptyCorpus,

    #[error("nnindex: query descriptor has an empty vector")]
    EmptyQuery,

    #[error("nnindex: index is empty; build it before querying")]
    EmptyIndex,

    #[error(
        "nnindex: index built in process {built} queried from process {current} \
         with no persisted artifacts to reload from"
    )]
    StaleProcess { built: u32, current: u32 },

    #[error("nnindex: {0}")]
    Io(String),

    #[error("nnindex: serialization error: {0}")]
    Serialization(String),

    #[error("nnindex: backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for NnError {
    fn from(e: std::io::Error) -> Self {
        NnError::Io(e.to_string())
    }
}
