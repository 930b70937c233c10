use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin: duplicate implementation name {name:?} (sources {first:?} and {second:?})")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },

    #[error("plugin: no implementation named {0:?}")]
    UnknownName(String),

    #[error("plugin: source error: {0}")]
    Source(String),
}
