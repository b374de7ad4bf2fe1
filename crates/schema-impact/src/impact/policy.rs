//! Approval decisioning.

use super::OverallImpactSummary;
use crate::types::ImpactLevel;

/// Decides whether an analysis outcome needs human sign-off.
///
/// Implementations must be pure: the same summary always yields the same answer.
pub trait ApprovalPolicy: Send + Sync {
    /// Whether `summary` requires approval.
    fn requires_approval(&self, summary: &OverallImpactSummary) -> bool;

    /// One-line description for reports.
    fn describe(&self) -> String;

    /// Return `summary` with `requires_approval` set by this policy.
    fn apply(&self, mut summary: OverallImpactSummary) -> OverallImpactSummary {
        summary.requires_approval = self.requires_approval(&summary);
        summary
    }
}

/// Requires approval once the worst impact level reaches a threshold.
///
/// A summary at `ImpactLevel::None` never requires approval, whatever the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdApprovalPolicy {
    threshold: ImpactLevel,
}

impl Default for ThresholdApprovalPolicy {
    fn default() -> Self {
        Self::new(ImpactLevel::High)
    }
}

impl ThresholdApprovalPolicy {
    /// Create a policy with the given threshold.
    #[must_use]
    pub fn new(threshold: ImpactLevel) -> Self {
        Self { threshold }
    }

    /// The configured threshold.
    #[must_use]
    pub fn threshold(&self) -> ImpactLevel {
        self.threshold
    }
}

impl ApprovalPolicy for ThresholdApprovalPolicy {
    fn requires_approval(&self, summary: &OverallImpactSummary) -> bool {
        summary.worst_impact_level != ImpactLevel::None
            && summary.worst_impact_level >= self.threshold
    }

    fn describe(&self) -> String {
        format!("approval required at {} impact or above", self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityRef, EntityType};
    use rstest::rstest;

    fn summary(level: ImpactLevel) -> OverallImpactSummary {
        OverallImpactSummary {
            worst_impact_level: level,
            ..OverallImpactSummary::none(&EntityRef::new(EntityType::Table, 1))
        }
    }

    #[rstest]
    #[case::none(ImpactLevel::None, false)]
    #[case::low(ImpactLevel::Low, false)]
    #[case::medium(ImpactLevel::Medium, false)]
    #[case::high(ImpactLevel::High, true)]
    #[case::critical(ImpactLevel::Critical, true)]
    fn default_threshold_is_high(#[case] level: ImpactLevel, #[case] expected: bool) {
        let policy = ThresholdApprovalPolicy::default();
        assert_eq!(policy.requires_approval(&summary(level)), expected);
    }

    #[test]
    fn none_never_requires_approval() {
        let policy = ThresholdApprovalPolicy::new(ImpactLevel::None);
        assert!(!policy.requires_approval(&summary(ImpactLevel::None)));
        assert!(policy.requires_approval(&summary(ImpactLevel::Low)));
    }

    #[test]
    fn apply_sets_flag() {
        let policy = ThresholdApprovalPolicy::new(ImpactLevel::Medium);
        let applied = policy.apply(summary(ImpactLevel::Medium));
        assert!(applied.requires_approval);
        assert!(policy.describe().contains("medium"));
    }
}
