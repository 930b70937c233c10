pub mod batch;
pub mod classifier;
pub mod error;

pub use batch::{ClassifyOptions, classify_async};
pub use classifier::{
    Classifier, NEGATIVE_LABEL, SupervisedClassifier, validate_training_input,
};
pub use error::ClassifierError;
