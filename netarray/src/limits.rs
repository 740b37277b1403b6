//! Bounds enforced while decoding delta records.

/// Upper bounds on the per-record counts a decoder accepts.
///
/// Records exceeding either bound are rejected before any item is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeltaLimits {
    /// Maximum number of deleted identities in one record.
    pub max_deleted: usize,
    /// Maximum number of added or changed items in one record.
    pub max_changed: usize,
}

impl Default for DeltaLimits {
    fn default() -> Self {
        Self {
            max_deleted: 2048,
            max_changed: 2048,
        }
    }
}

impl DeltaLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_deleted: 16,
            max_changed: 16,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_deleted: usize::MAX,
            max_changed: usize::MAX,
        }
    }
}
