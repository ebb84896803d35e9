//! Outcome type for best-effort recovery of LLM output.
//!
//! Extraction and normalization never fail with an error. Instead they say
//! how much the caller should trust what came back.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum Salvage<T> {
    /// The model returned exactly the requested shape.
    Trusted(T),
    /// Usable data was reconstructed from a malformed response.
    Degraded { value: T, reason: String },
    /// Nothing usable could be recovered.
    Failed { reason: String },
}

impl<T> Salvage<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Trusted(value) | Self::Degraded { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Trusted(value) | Self::Degraded { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Trusted(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Trusted(_) => None,
            Self::Degraded { reason, .. } | Self::Failed { reason } => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Salvage<U> {
        match self {
            Self::Trusted(value) => Salvage::Trusted(f(value)),
            Self::Degraded { value, reason } => Salvage::Degraded {
                value: f(value),
                reason,
            },
            Self::Failed { reason } => Salvage::Failed { reason },
        }
    }

    /// Keeps the value but downgrades a trusted result.
    pub fn downgrade(self, reason: impl Into<String>) -> Self {
        match self {
            Self::Trusted(value) => Self::degraded(value, reason),
            other => other,
        }
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            Self::Trusted(_) => Provenance::Trusted,
            Self::Degraded { .. } => Provenance::Reconstructed,
            Self::Failed { .. } => Provenance::Placeholder,
        }
    }
}

/// How a generated document's content was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Computed locally or returned by the model in the requested shape.
    Trusted,
    /// Recovered from a malformed model response.
    Reconstructed,
    /// Deterministic stand-in; needs regeneration.
    Placeholder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downgrade_only_affects_trusted() {
        let trusted = Salvage::Trusted(1).downgrade("backfilled years");
        assert_eq!(trusted.reason(), Some("backfilled years"));
        assert_eq!(trusted.value(), Some(&1));

        let failed: Salvage<i32> = Salvage::failed("empty").downgrade("ignored");
        assert!(failed.is_failed());
        assert_eq!(failed.reason(), Some("empty"));
    }

    #[test]
    fn test_provenance_mapping() {
        assert_eq!(Salvage::Trusted(()).provenance(), Provenance::Trusted);
        assert_eq!(
            Salvage::degraded((), "x").provenance(),
            Provenance::Reconstructed
        );
        assert_eq!(
            Salvage::<()>::failed("x").provenance(),
            Provenance::Placeholder
        );
    }
}
