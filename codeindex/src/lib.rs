pub mod codeindex;
pub mod error;

pub use codeindex::CodeIndex;
pub use error::CodeIndexError;
