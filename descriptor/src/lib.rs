pub mod classification;
pub mod descriptor;
pub mod error;

pub use classification::{
    ClassificationElement, ClassificationFactory, MemoryClassificationFactory,
};
pub use descriptor::{Descriptor, VectorDescriptor};
pub use error::DescriptorError;
