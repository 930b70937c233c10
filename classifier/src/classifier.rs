use std::collections::HashMap;

use tracing::debug;

use percept_descriptor::{ClassificationElement, ClassificationFactory, Descriptor};

use crate::error::ClassifierError;

/// Label reserved for the negative class in supervised training.
pub const NEGATIVE_LABEL: &str = "negative";

/// Classifier maps descriptors to discrete labels and/or label confidences.
///
/// Implementations may act discretely (one label at 1.0, the rest at 0.0) or
/// continuously (every label gets a confidence in [0, 1]); either way,
/// [`classify_one`](Classifier::classify_one) must return a value for every
/// label the loaded model supports.
///
/// A modeled classifier is read-only, so concurrent `classify` calls on one
/// instance are safe.
pub trait Classifier<D: Descriptor>: Send + Sync {
    /// Name of this classifier; keys classification elements.
    fn name(&self) -> &str;

    /// The fixed label set of the loaded model.
    /// Fails with [`ClassifierError::NoModel`] before a model exists.
    fn labels(&self) -> Result<Vec<String>, ClassifierError>;

    /// The per-descriptor compute primitive: label→confidence for every
    /// supported label.
    fn classify_one(&self, d: &D) -> Result<HashMap<String, f64>, ClassifierError>;

    /// Resolve the classification element for `d` and fill it.
    ///
    /// When the element already holds a result and `overwrite` is false, it
    /// is returned unchanged without invoking the compute primitive.
    fn classify<F>(
        &self,
        d: &D,
        factory: &F,
        overwrite: bool,
    ) -> Result<ClassificationElement, ClassifierError>
    where
        F: ClassificationFactory + ?Sized,
    {
        let elem = factory.new_classification(self.name(), d.uuid());
        if overwrite || !elem.has_classifications() {
            let c = self.classify_one(d)?;
            elem.set_classification(c)?;
        } else {
            debug!(
                classifier = self.name(),
                uuid = %d.uuid(),
                "found existing classification in resolved element"
            );
        }
        Ok(elem)
    }
}

/// Classifiers trainable from labeled descriptor examples.
///
/// Lifecycle is one-way: unmodeled → [`train`](SupervisedClassifier::train) →
/// modeled. Training an already-modeled instance fails; there is no reverse
/// transition.
pub trait SupervisedClassifier<D: Descriptor>: Classifier<D> {
    /// Whether a model is currently loaded.
    fn has_model(&self) -> bool;

    /// Fit a model from positive examples per label plus negative examples.
    ///
    /// Implementations must call [`validate_training_input`] before fitting;
    /// the validation is deliberately a standalone function rather than an
    /// implicit part of this trait.
    fn train(
        &mut self,
        positives: HashMap<String, Vec<D>>,
        negatives: Vec<D>,
    ) -> Result<(), ClassifierError>;
}

/// Shared validation for [`SupervisedClassifier::train`] input.
///
/// Fails when a model is already loaded, when the reserved
/// [`NEGATIVE_LABEL`] appears among the positive classes, or when either
/// example set is empty.
pub fn validate_training_input<D>(
    has_model: bool,
    positives: &HashMap<String, Vec<D>>,
    negatives: &[D],
) -> Result<(), ClassifierError> {
    if has_model {
        return Err(ClassifierError::AlreadyTrained);
    }
    if positives.contains_key(NEGATIVE_LABEL) {
        return Err(ClassifierError::ReservedLabel {
            label: NEGATIVE_LABEL.to_string(),
        });
    }
    if positives.is_empty() {
        return Err(ClassifierError::EmptyPositives);
    }
    if negatives.is_empty() {
        return Err(ClassifierError::EmptyNegatives);
    }
    Ok(())
}
