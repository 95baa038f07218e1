use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum number of distinct condition types kept on a status.
pub const MAX_CONDITIONS: usize = 8;

/// Condition type recording the outcome of the last sync into the
/// authorization model.
pub const CONDITION_SYNCED: &str = "Synced";

/// Condition type recording whether every `policyRef` of a role resolved.
pub const CONDITION_POLICIES_RESOLVED: &str = "PoliciesResolved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A single status observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub observed_generation: u64,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: u64,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }

    /// Same observation, ignoring the transition timestamp.
    pub fn same_observation(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}

/// Upsert `condition` by type. Returns `true` when the list changed.
///
/// The stored transition time is kept when the status did not flip, so
/// repeating an identical observation leaves the list untouched. When a new
/// type would exceed [`MAX_CONDITIONS`], the entry with the oldest transition
/// is dropped.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.same_observation(&condition) {
            return false;
        }
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time;
        }
        *existing = condition;
        return true;
    }

    if conditions.len() >= MAX_CONDITIONS {
        if let Some(oldest) = conditions
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.last_transition_time)
            .map(|(i, _)| i)
        {
            conditions.remove(oldest);
        }
    }
    conditions.push(condition);
    true
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(status: ConditionStatus, reason: &str) -> Condition {
        Condition::new(CONDITION_SYNCED, status, reason, "", 1)
    }

    #[test]
    fn identical_observation_is_a_noop() {
        let mut conditions = Vec::new();
        assert!(set_condition(&mut conditions, synced(ConditionStatus::True, "Synced")));
        let before = conditions.clone();
        assert!(!set_condition(&mut conditions, synced(ConditionStatus::True, "Synced")));
        assert_eq!(conditions, before);
    }

    #[test]
    fn transition_time_kept_without_status_flip() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, synced(ConditionStatus::False, "InvalidRule"));
        let first = conditions[0].last_transition_time;

        set_condition(&mut conditions, synced(ConditionStatus::False, "InvalidStatement"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, "InvalidStatement");
        assert_eq!(conditions[0].last_transition_time, first);
    }

    #[test]
    fn caps_distinct_types() {
        let mut conditions = Vec::new();
        for i in 0..MAX_CONDITIONS + 3 {
            set_condition(
                &mut conditions,
                Condition::new(format!("Type{i}"), ConditionStatus::True, "Ok", "", 1),
            );
        }
        assert_eq!(conditions.len(), MAX_CONDITIONS);
        assert!(find_condition(&conditions, &format!("Type{}", MAX_CONDITIONS + 2)).is_some());
    }
}
