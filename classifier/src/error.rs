use percept_descriptor::DescriptorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier: instance already has a model; refusing to overwrite it")]
    AlreadyTrained,

    #[error("classifier: reserved label {label:?} found in positive classes")]
    ReservedLabel { label: String },

    #[error("classifier: no positive classes provided")]
    EmptyPositives,

    #[error("classifier: no negative examples provided")]
    EmptyNegatives,

    #[error("classifier: no model loaded")]
    NoModel,

    #[error("classifier: compute failed: {0}")]
    Compute(String),

    #[error(transparent)]
    Element(#[from] DescriptorError),

    #[error("classifier: {failed} of {total} batch items failed; see logs for causes")]
    Batch { failed: usize, total: usize },
}
