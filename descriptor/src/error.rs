use thiserror::Error;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor: empty classification map")]
    EmptyClassification,

    #[error("descriptor: confidence {value} for label {label:?} outside [0, 1]")]
    ConfidenceOutOfRange { label: String, value: f64 },

    #[error("descriptor: element has no classification set")]
    NoClassification,
}
