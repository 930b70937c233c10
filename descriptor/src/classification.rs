use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::DescriptorError;

type Slot = Arc<RwLock<Option<HashMap<String, f64>>>>;

/// ClassificationElement holds the label→confidence result one named
/// classifier produced for one descriptor.
///
/// Clones of an element share the same underlying result slot, so a result
/// written through one handle is visible through every handle resolved for
/// the same (classifier, descriptor) key.
#[derive(Clone, Debug)]
pub struct ClassificationElement {
    name: String,
    uuid: Uuid,
    slot: Slot,
}

impl ClassificationElement {
    fn new(name: String, uuid: Uuid, slot: Slot) -> Self {
        Self { name, uuid, slot }
    }

    /// Name of the classifier that owns this element.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of the classified descriptor.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// True once a classification result has been stored.
    pub fn has_classifications(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Store a classification result. The map must be non-empty and every
    /// confidence must lie in [0, 1].
    pub fn set_classification(
        &self,
        map: HashMap<String, f64>,
    ) -> Result<(), DescriptorError> {
        if map.is_empty() {
            return Err(DescriptorError::EmptyClassification);
        }
        for (label, &value) in &map {
            if !(0.0..=1.0).contains(&value) {
                return Err(DescriptorError::ConfidenceOutOfRange {
                    label: label.clone(),
                    value,
                });
            }
        }
        *self.slot.write() = Some(map);
        Ok(())
    }

    /// Current result map, if one has been stored.
    pub fn classification(&self) -> Option<HashMap<String, f64>> {
        self.slot.read().clone()
    }

    /// Label with the highest confidence.
    pub fn max_label(&self) -> Result<String, DescriptorError> {
        let guard = self.slot.read();
        let map = guard.as_ref().ok_or(DescriptorError::NoClassification)?;
        let mut best: Option<(&String, f64)> = None;
        for (label, &value) in map {
            match best {
                Some((_, bv)) if bv >= value => {}
                _ => best = Some((label, value)),
            }
        }
        // set_classification rejects empty maps, so best is always present.
        Ok(best.map(|(l, _)| l.clone()).unwrap_or_default())
    }
}

/// ClassificationFactory resolves the element for a (classifier, descriptor)
/// key, creating an empty one on first resolution.
pub trait ClassificationFactory: Send + Sync {
    fn new_classification(&self, name: &str, uuid: Uuid) -> ClassificationElement;
}

/// In-memory [ClassificationFactory]. Elements resolved for the same key
/// share one slot, which is what gives repeated classification its
/// at-most-once compute behavior.
#[derive(Default)]
pub struct MemoryClassificationFactory {
    slots: RwLock<HashMap<(String, Uuid), Slot>>,
}

impl MemoryClassificationFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClassificationFactory for MemoryClassificationFactory {
    fn new_classification(&self, name: &str, uuid: Uuid) -> ClassificationElement {
        if let Some(slot) = self.slots.read().get(&(name.to_string(), uuid)) {
            return ClassificationElement::new(name.to_string(), uuid, slot.clone());
        }
        let mut slots = self.slots.write();
        let slot = slots
            .entry((name.to_string(), uuid))
            .or_insert_with(|| Arc::new(RwLock::new(None)))
            .clone();
        ClassificationElement::new(name.to_string(), uuid, slot)
    }
}
