//! Alarm snapshot reconciliation.

use std::collections::{HashMap, HashSet};

use topostream_types::{AlarmId, RawAlarm};

/// Difference between the alarm cache and a fresh backend listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmDiff {
    /// Alarms that are new, or whose cached value is stale.
    pub upserts: Vec<RawAlarm>,
    /// Cached alarms missing from the listing.
    pub deletes: Vec<RawAlarm>,
}

impl AlarmDiff {
    /// Compare `cache` against `snapshot`.
    ///
    /// An alarm present on both sides with an unchanged value yields
    /// nothing. An alarm present on both sides with a changed value is an
    /// upsert only, never also a delete.
    pub fn compute(cache: &HashMap<AlarmId, RawAlarm>, snapshot: &[RawAlarm]) -> Self {
        let upserts = snapshot
            .iter()
            .filter(|alarm| cache.get(&alarm.id) != Some(*alarm))
            .cloned()
            .collect();

        let live: HashSet<AlarmId> = snapshot.iter().map(|alarm| alarm.id).collect();
        let mut deletes: Vec<RawAlarm> = cache
            .values()
            .filter(|alarm| !live.contains(&alarm.id))
            .cloned()
            .collect();
        deletes.sort_by_key(|alarm| alarm.id);

        Self { upserts, deletes }
    }

    /// Whether the cache already matches the listing.
    pub const fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use topostream_types::Severity;

    use super::*;

    fn alarm(id: i64, severity: Severity) -> RawAlarm {
        RawAlarm {
            id: AlarmId::new(id),
            reduction_key: format!("k{id}"),
            severity,
            description: String::new(),
            last_event_time: Utc::now(),
            node: None,
            situation: false,
            related_alarms: Vec::new(),
        }
    }

    fn cache_of(alarms: &[RawAlarm]) -> HashMap<AlarmId, RawAlarm> {
        alarms.iter().map(|a| (a.id, a.clone())).collect()
    }

    #[test]
    fn new_alarm_is_an_upsert() {
        let diff = AlarmDiff::compute(&HashMap::new(), &[alarm(1, Severity::Minor)]);
        assert_eq!(diff.upserts.len(), 1);
        assert!(diff.deletes.is_empty());
    }

    #[test]
    fn vanished_alarm_is_a_delete() {
        let cached = alarm(1, Severity::Minor);
        let diff = AlarmDiff::compute(&cache_of(std::slice::from_ref(&cached)), &[]);
        assert!(diff.upserts.is_empty());
        assert_eq!(diff.deletes, vec![cached]);
    }

    #[test]
    fn changed_alarm_is_only_an_upsert() {
        let before = alarm(1, Severity::Minor);
        let mut after = before.clone();
        after.severity = Severity::Critical;

        let diff = AlarmDiff::compute(&cache_of(&[before]), std::slice::from_ref(&after));
        assert_eq!(diff.upserts, vec![after]);
        assert!(diff.deletes.is_empty());
    }

    #[test]
    fn unchanged_listing_is_empty() {
        let alarms = [alarm(1, Severity::Minor), alarm(2, Severity::Major)];
        assert!(AlarmDiff::compute(&cache_of(&alarms), &alarms).is_empty());
    }
}
