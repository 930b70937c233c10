use serde::{Deserialize, Serialize};

/// Distance metric a [SearchBackend](crate::backend::SearchBackend) is built
/// with.
///
/// All metrics are true distances (smaller = closer) except [Hik]
/// (histogram intersection), which is a similarity the index normalizes
/// back into distance convention at query time.
///
/// [Hik]: DistanceMethod::Hik
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMethod {
    Euclidean,
    Manhattan,
    ChiSquare,
    Hik,
}

impl DistanceMethod {
    /// True when larger backend scores mean closer matches.
    pub fn is_similarity(self) -> bool {
        matches!(self, DistanceMethod::Hik)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMethod::Euclidean => "euclidean",
            DistanceMethod::Manhattan => "manhattan",
            DistanceMethod::ChiSquare => "chi_square",
            DistanceMethod::Hik => "hik",
        }
    }
}

impl std::fmt::Display for DistanceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
