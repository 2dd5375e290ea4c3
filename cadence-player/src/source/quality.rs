//! Quality fallback ordering

use cadence_common::QualityKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fallback direction when the preferred tier is unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Try nearer lower tiers first
    #[default]
    Lower,
    /// Try nearer higher tiers first
    Higher,
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingPolicy::Lower => write!(f, "lower"),
            MissingPolicy::Higher => write!(f, "higher"),
        }
    }
}

impl FromStr for MissingPolicy {
    type Err = std::convert::Infallible;

    /// Anything other than `lower` biases upward
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "lower" => MissingPolicy::Lower,
            _ => MissingPolicy::Higher,
        })
    }
}

/// Candidate tiers to probe, in order
///
/// The preference comes first. Under [`MissingPolicy::Lower`] the tiers below
/// it follow nearest-first, then the tiers above it nearest-first;
/// [`MissingPolicy::Higher`] mirrors that. Every tier appears exactly once.
pub fn quality_order(preference: QualityKey, policy: MissingPolicy) -> Vec<QualityKey> {
    let rank = preference.rank();
    let below = QualityKey::ALL[..rank].iter().rev().copied();
    let above = QualityKey::ALL[rank + 1..].iter().copied();

    let mut order = Vec::with_capacity(QualityKey::ALL.len());
    order.push(preference);
    match policy {
        MissingPolicy::Lower => order.extend(below.chain(above)),
        MissingPolicy::Higher => order.extend(above.chain(below)),
    }
    order
}
