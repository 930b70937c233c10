use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Descriptor is one unit of content: a fixed-length feature vector with a
/// stable identity. Descriptors are owned by the caller and treated as
/// immutable by this workspace.
pub trait Descriptor: Send + Sync {
    /// Stable identity of this descriptor.
    fn uuid(&self) -> Uuid;

    /// The feature vector.
    fn vector(&self) -> &[f32];
}

/// VectorDescriptor is the plain in-memory [Descriptor] implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDescriptor {
    uuid: Uuid,
    vector: Vec<f32>,
}

impl VectorDescriptor {
    pub fn new(uuid: Uuid, vector: Vec<f32>) -> Self {
        Self { uuid, vector }
    }

    /// Wrap a vector under a freshly generated identity.
    pub fn from_vec(vector: Vec<f32>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            vector,
        }
    }
}

impl Descriptor for VectorDescriptor {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn vector(&self) -> &[f32] {
        &self.vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_descriptor() {
        let d = VectorDescriptor::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(d.vector(), &[1.0, 2.0, 3.0]);

        let d2 = VectorDescriptor::new(d.uuid(), vec![1.0, 2.0, 3.0]);
        assert_eq!(d, d2);
    }

    #[test]
    fn test_fresh_identities_differ() {
        let a = VectorDescriptor::from_vec(vec![0.0]);
        let b = VectorDescriptor::from_vec(vec![0.0]);
        assert_ne!(a.uuid(), b.uuid());
    }
}
