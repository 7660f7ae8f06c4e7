//! Quota limit resolution types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Effective hard limit for a (project, resource) pair.
///
/// Limits are resolved in priority order:
/// 1. Per-project override (from the `project_quotas` table)
/// 2. Resource default (from `quota.limits` config)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaLimit {
    /// At most this many units may be in use plus reserved.
    Limited(i64),
    /// No limit; admission always passes.
    Unlimited,
}

impl QuotaLimit {
    /// Whether a projected total of `in_use + reserved + delta` exceeds
    /// this limit.
    pub fn is_exceeded_by(&self, projected: i64) -> bool {
        match self {
            Self::Limited(max) => projected > *max,
            Self::Unlimited => false,
        }
    }

    /// Return the numeric limit, or `None` for unlimited.
    pub fn as_max(&self) -> Option<i64> {
        match self {
            Self::Limited(max) => Some(*max),
            Self::Unlimited => None,
        }
    }

    /// Storage representation: unlimited is stored as `-1`.
    pub fn as_stored(&self) -> i64 {
        self.as_max().unwrap_or(-1)
    }
}

impl From<i64> for QuotaLimit {
    /// Convert a stored hard limit. Negative values mean unlimited.
    fn from(value: i64) -> Self {
        if value < 0 {
            Self::Unlimited
        } else {
            Self::Limited(value)
        }
    }
}

impl fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{max}"),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}
