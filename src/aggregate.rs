use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::record::UpdateRecord;

/// `now` minus `days`, saturating at the earliest representable instant.
pub fn lookback_cutoff(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Window, dedup and order records for the report.
///
/// Records released before `cutoff` are dropped, the first record seen for a
/// dedup key wins, and the result is newest first with ties broken by
/// product, KB numbers and title.
pub fn aggregate(records: Vec<UpdateRecord>, cutoff: DateTime<Utc>) -> Vec<UpdateRecord> {
    // window before dedup
    let mut seen = HashSet::new();
    let mut kept: Vec<UpdateRecord> = records
        .into_iter()
        .filter(|r| r.release_date >= cutoff)
        .filter(|r| seen.insert(r.dedup_key()))
        .collect();

    // newest first, then product, KB numbers, title
    kept.sort_by(|a, b| {
        b.release_date
            .cmp(&a.release_date)
            .then_with(|| a.product.cmp(&b.product))
            .then_with(|| a.kb_ids.cmp(&b.kb_ids))
            .then_with(|| a.title.cmp(&b.title))
    });
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn cutoff_is_days_before_now() {
        assert_eq!(lookback_cutoff(now(), 30), Utc.with_ymd_and_hms(2025, 10, 21, 12, 0, 0).unwrap());
    }

    #[test]
    fn huge_lookback_saturates_instead_of_overflowing() {
        assert_eq!(lookback_cutoff(now(), u32::MAX), DateTime::<Utc>::MIN_UTC);
        let old = record("Windows 11", &["KB5044384"], "Old", (1990, 1, 1));
        assert_eq!(aggregate(vec![old], lookback_cutoff(now(), u32::MAX)).len(), 1);
    }

    #[test]
    fn drops_records_older_than_cutoff() {
        let cutoff = lookback_cutoff(now(), 30);
        let out = aggregate(
            vec![
                record("Windows 11", &["KB5044384"], "Old", (2025, 9, 1)),
                record("Windows 11", &["KB5068861"], "New", (2025, 11, 11)),
                record("Windows 11", &[], "Undated", (1970, 1, 1)),
            ],
            cutoff,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "New");
        assert!(out.iter().all(|r| r.release_date >= cutoff));
    }

    #[test]
    fn same_announcement_from_two_links_collapses() {
        let a = record("Windows 11", &["KB5044384"], "Update", (2025, 11, 6));
        let mut b = a.clone();
        b.source_link = "https://support.microsoft.com/en-us/help/5044384".to_string();
        b.description = "Seen on a second page".to_string();

        let out = aggregate(vec![a.clone(), b], lookback_cutoff(now(), 30));
        assert_eq!(out, vec![a]);
    }

    #[test]
    fn different_products_are_kept_apart() {
        let a = record("Windows 11", &["KB5044384"], "Update", (2025, 11, 6));
        let b = record("Windows 10 22H2", &["KB5044384"], "Update", (2025, 11, 6));
        assert_eq!(aggregate(vec![a, b], lookback_cutoff(now(), 30)).len(), 2);
    }

    #[test]
    fn sorted_newest_first_then_product_kb_title() {
        let out = aggregate(
            vec![
                record("Windows 11", &["KB5000002"], "B", (2025, 11, 1)),
                record("Windows 11", &["KB5000001"], "Z", (2025, 11, 1)),
                record("Windows 10 22H2", &["KB5000009"], "A", (2025, 11, 1)),
                record("Windows 11", &["KB5000003"], "C", (2025, 11, 12)),
                record("Windows 11", &["KB5000001"], "A", (2025, 11, 1)),
            ],
            lookback_cutoff(now(), 30),
        );
        let order: Vec<(&str, &str)> = out.iter().map(|r| (r.kb_ids[0].as_str(), r.title.as_str())).collect();
        assert_eq!(
            order,
            vec![("KB5000003", "C"), ("KB5000009", "A"), ("KB5000001", "A"), ("KB5000001", "Z"), ("KB5000002", "B")]
        );
        assert!(out.windows(2).all(|w| w[0].release_date >= w[1].release_date));
    }

    #[test]
    fn aggregating_twice_changes_nothing() {
        let cutoff = lookback_cutoff(now(), 30);
        let input = vec![
            record("Windows 11", &["KB5000002"], "B", (2025, 11, 1)),
            record("Windows 11", &["KB5000002"], "B", (2025, 11, 1)),
            record("Windows Server 2022", &[], "Servicing stack update", (2025, 11, 3)),
            record("Windows 11", &["KB5000001"], "Old", (2025, 8, 1)),
        ];
        let once = aggregate(input, cutoff);
        let twice = aggregate(once.clone(), cutoff);
        assert_eq!(once, twice);

        let keys: HashSet<_> = once.iter().map(UpdateRecord::dedup_key).collect();
        assert_eq!(keys.len(), once.len());
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(aggregate(Vec::new(), lookback_cutoff(now(), 30)).is_empty());
    }
}
