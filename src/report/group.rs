//! Grouping and ordering of flat result records for display.

use chrono::{DateTime, Utc};

use super::record::{RunRecord, WeeklyBuildRecord};

/// Anything that can be partitioned by project and ordered by recency.
pub trait ProjectRecord {
    /// Grouping key; implementations substitute a sentinel for missing names.
    fn project_key(&self) -> &str;

    /// Sort instant; a record without a timestamp sorts as oldest.
    fn sort_timestamp(&self) -> DateTime<Utc>;
}

impl ProjectRecord for RunRecord {
    fn project_key(&self) -> &str {
        RunRecord::project_key(self)
    }

    fn sort_timestamp(&self) -> DateTime<Utc> {
        self.time_stamp.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl ProjectRecord for WeeklyBuildRecord {
    fn project_key(&self) -> &str {
        WeeklyBuildRecord::project_key(self)
    }

    fn sort_timestamp(&self) -> DateTime<Utc> {
        self.time_stamp.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Partition records by project and order everything newest-first.
///
/// Each partition keeps the full history (not just the latest record) ordered
/// by timestamp descending; partitions themselves are ordered by their newest
/// record. Sorts are stable, so records with identical timestamps keep their
/// input order. Empty input yields empty output.
pub fn group_and_sort<T: ProjectRecord>(records: Vec<T>) -> Vec<(String, Vec<T>)> {
    let mut groups: Vec<(String, Vec<T>)> = Vec::new();

    for record in records {
        let key = record.project_key();
        match groups.iter_mut().find(|(k, _)| k == key) {
            Some((_, members)) => members.push(record),
            None => groups.push((key.to_string(), vec![record])),
        }
    }

    for (_, members) in &mut groups {
        members.sort_by(|a, b| b.sort_timestamp().cmp(&a.sort_timestamp()));
    }

    // A partition can only be empty if constructed elsewhere; sort it last.
    groups.sort_by(|(_, a), (_, b)| {
        let newest_a = a
            .first()
            .map(|r| r.sort_timestamp())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let newest_b = b
            .first()
            .map(|r| r.sort_timestamp())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        newest_b.cmp(&newest_a)
    });

    groups.retain(|(_, members)| !members.is_empty());
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(project: Option<&str>, ts: Option<i64>) -> RunRecord {
        let mut r: RunRecord = serde_json::from_str("{}").unwrap();
        r.project = project.map(str::to_string);
        r.time_stamp = ts.map(|s| Utc.timestamp_opt(s, 0).unwrap());
        r
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let out = group_and_sort(Vec::<RunRecord>::new());
        assert!(out.is_empty());
    }

    #[test]
    fn test_partition_keys_are_unique_and_nonempty() {
        let out = group_and_sort(vec![
            rec(Some("Alpha"), Some(10)),
            rec(Some("Beta"), Some(20)),
            rec(Some("Alpha"), Some(30)),
        ]);
        let keys: Vec<&str> = out.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys.len(), 2);
        assert!(out.iter().all(|(_, m)| !m.is_empty()));
    }

    #[test]
    fn test_records_within_partition_newest_first() {
        let out = group_and_sort(vec![
            rec(Some("Alpha"), Some(10)),
            rec(Some("Alpha"), Some(30)),
            rec(Some("Alpha"), Some(20)),
        ]);
        assert_eq!(out.len(), 1);
        let stamps: Vec<i64> = out[0]
            .1
            .iter()
            .map(|r| r.sort_timestamp().timestamp())
            .collect();
        assert_eq!(stamps, vec![30, 20, 10]);
    }

    #[test]
    fn test_partitions_ordered_by_newest_record() {
        // Alpha has T=10 and T=20, Beta only T=15: Alpha leads on T=20.
        let out = group_and_sort(vec![
            rec(Some("Alpha"), Some(10)),
            rec(Some("Beta"), Some(15)),
            rec(Some("Alpha"), Some(20)),
        ]);
        assert_eq!(out[0].0, "Alpha");
        assert_eq!(out[0].1[0].sort_timestamp().timestamp(), 20);
        assert_eq!(out[1].0, "Beta");
    }

    #[test]
    fn test_full_history_is_kept() {
        let out = group_and_sort(vec![
            rec(Some("Alpha"), Some(10)),
            rec(Some("Alpha"), Some(20)),
        ]);
        assert_eq!(out[0].1.len(), 2);
    }

    #[test]
    fn test_missing_project_groups_under_sentinel() {
        let out = group_and_sort(vec![rec(None, Some(10)), rec(Some(""), Some(20))]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "NoProject");
        assert_eq!(out[0].1.len(), 2);
    }

    #[test]
    fn test_missing_timestamp_sorts_oldest_without_panicking() {
        let out = group_and_sort(vec![
            rec(Some("Alpha"), None),
            rec(Some("Alpha"), Some(10)),
        ]);
        assert_eq!(out[0].1[0].sort_timestamp().timestamp(), 10);
        assert_eq!(out[0].1[1].sort_timestamp(), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let mut a = rec(Some("Alpha"), Some(10));
        a.package_success = Some(true);
        let mut b = rec(Some("Alpha"), Some(10));
        b.package_success = Some(false);

        let out = group_and_sort(vec![a, b]);
        assert_eq!(out[0].1[0].package_success, Some(true));
        assert_eq!(out[0].1[1].package_success, Some(false));
    }
}
