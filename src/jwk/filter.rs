use super::key::{JwkKey, JwkSet};

/// Selects which keys of the upstream set are exposed on a route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyFilter {
    /// Keep every key.
    None,

    /// Keep only keys that declare a non-empty `alg`. Consumers verifying
    /// signatures need to know the algorithm up front.
    #[default]
    WithAlgorithm,
}

impl KeyFilter {
    /// Returns `true` if `key` should be kept.
    pub fn keep(self, key: &JwkKey) -> bool {
        match self {
            KeyFilter::None => true,
            KeyFilter::WithAlgorithm => key.algorithm().is_some(),
        }
    }

    /// Filters `set`, preserving the relative order of the retained keys.
    pub fn apply(self, set: JwkSet) -> JwkSet {
        JwkSet {
            keys: set.keys.into_iter().filter(|key| self.keep(key)).collect(),
        }
    }

    /// Short name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            KeyFilter::None => "none",
            KeyFilter::WithAlgorithm => "with-algorithm",
        }
    }
}
