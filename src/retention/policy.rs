//! Watermark computation.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::RetentionConfig;

/// Max ages for the two series classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_age_plain: Duration,
    max_age_tagged: Duration,
}

/// The watermarks of one cycle.
///
/// A path whose latest version is at or before the watermark of its class
/// is obsolete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub plain: DateTime<Utc>,
    pub tagged: DateTime<Utc>,
    /// The earlier of the two. Bounds the value-table delete.
    pub combined: DateTime<Utc>,
}

impl RetentionPolicy {
    pub fn new(max_age_plain: Duration, max_age_tagged: Duration) -> Self {
        Self {
            max_age_plain,
            max_age_tagged,
        }
    }

    pub fn from_config(config: &RetentionConfig) -> Self {
        Self::new(
            config.max_age_plain.as_std(),
            config.max_age_tagged.as_std(),
        )
    }

    pub fn max_age_plain(&self) -> Duration {
        self.max_age_plain
    }

    pub fn max_age_tagged(&self) -> Duration {
        self.max_age_tagged
    }

    /// Derive the watermarks for a cycle starting at `now`.
    pub fn watermarks(&self, now: DateTime<Utc>) -> Watermarks {
        let plain = subtract(now, self.max_age_plain);
        let tagged = subtract(now, self.max_age_tagged);
        Watermarks {
            plain,
            tagged,
            combined: plain.min(tagged),
        }
    }
}

/// `now - age`, saturating at the earliest representable instant.
fn subtract(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    const DAY: u64 = 86_400;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case::equal_ages(14, 14, "2024-06-01")]
    #[case::plain_older(30, 14, "2024-05-16")]
    #[case::tagged_older(7, 21, "2024-05-25")]
    fn test_watermarks(
        #[case] plain_days: i64,
        #[case] tagged_days: i64,
        #[case] combined_date: &str,
    ) {
        let policy = RetentionPolicy::new(
            Duration::from_secs(plain_days as u64 * DAY),
            Duration::from_secs(tagged_days as u64 * DAY),
        );
        let wm = policy.watermarks(now());

        assert_eq!(wm.plain, now() - TimeDelta::days(plain_days));
        assert_eq!(wm.tagged, now() - TimeDelta::days(tagged_days));
        assert_eq!(wm.combined.date_naive().to_string(), combined_date);
    }

    #[test]
    fn test_equal_ages_coincide() {
        let policy = RetentionPolicy::new(Duration::from_secs(DAY), Duration::from_secs(DAY));
        let wm = policy.watermarks(now());
        assert_eq!(wm.plain, wm.tagged);
        assert_eq!(wm.plain, wm.combined);
    }

    #[test]
    fn test_combined_is_true_minimum() {
        // Plain is the earlier watermark here; the combined bound must follow it.
        let policy = RetentionPolicy::new(
            Duration::from_secs(30 * DAY),
            Duration::from_secs(14 * DAY),
        );
        let wm = policy.watermarks(now());
        assert_eq!(wm.combined, wm.plain);
        assert!(wm.combined < wm.tagged);
    }

    #[test]
    fn test_huge_age_saturates() {
        let policy = RetentionPolicy::new(Duration::MAX, Duration::from_secs(DAY));
        let wm = policy.watermarks(now());
        assert_eq!(wm.plain, DateTime::<Utc>::MIN_UTC);
        assert_eq!(wm.combined, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_from_config() {
        let config = RetentionConfig::default();
        let policy = RetentionPolicy::from_config(&config);
        assert_eq!(policy.max_age_plain(), Duration::from_secs(14 * DAY));
        assert_eq!(policy.max_age_tagged(), Duration::from_secs(14 * DAY));
    }

    proptest! {
        #[test]
        fn combined_is_min_and_watermarks_not_after_now(
            now_secs in 0i64..4_000_000_000,
            plain_secs in 0u64..10_000 * DAY,
            tagged_secs in 0u64..10_000 * DAY,
        ) {
            let now = DateTime::<Utc>::from_timestamp(now_secs, 0).unwrap();
            let policy = RetentionPolicy::new(
                Duration::from_secs(plain_secs),
                Duration::from_secs(tagged_secs),
            );
            let wm = policy.watermarks(now);

            prop_assert_eq!(wm.combined, wm.plain.min(wm.tagged));
            prop_assert!(wm.plain <= now);
            prop_assert!(wm.tagged <= now);
            prop_assert_eq!(wm.plain, now - TimeDelta::seconds(plain_secs as i64));
        }
    }
}
