//! Quota groups (spec.md §3 / §6's job-usage view).

use serde::{Deserialize, Serialize};

/// A quota bucket a job's owner is billed against. `quota` of `None` means
/// unlimited (spec.md §3: "quota may be null, meaning unconstrained").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    pub group_id: String,
    pub quota: Option<u64>,
    /// Running total deducted by job accounting (spec.md §4.4).
    #[serde(default)]
    pub quota_used: u64,
}

impl UserGroup {
    /// `used + additional` fits under quota; unlimited groups always fit.
    pub fn has_headroom(&self, used: u64, additional: u64) -> bool {
        match self.quota {
            None => true,
            Some(quota) => used.saturating_add(additional) <= quota,
        }
    }

    /// Deducts `amount` from this group's remaining quota (spec.md §4.4:
    /// "deduct from user_groups.quota"). `quota` itself is the cap and is
    /// left untouched; `quota_used` tracks what has been spent against it.
    pub fn deduct(&mut self, amount: u64) {
        self.quota_used = self.quota_used.saturating_add(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_group_always_has_headroom() {
        let group = UserGroup { group_id: "g".into(), quota: None, quota_used: 0 };
        assert!(group.has_headroom(u64::MAX - 1, 10));
    }

    #[test]
    fn limited_group_rejects_overflowing_spend() {
        let group = UserGroup { group_id: "g".into(), quota: Some(100), quota_used: 0 };
        assert!(group.has_headroom(90, 10));
        assert!(!group.has_headroom(90, 11));
    }

    #[test]
    fn deduct_accumulates_into_quota_used() {
        let mut group = UserGroup { group_id: "g".into(), quota: Some(100), quota_used: 0 };
        group.deduct(30);
        group.deduct(25);
        assert_eq!(group.quota_used, 55);
    }
}
