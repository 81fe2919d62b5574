use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::progress::streak::roll_daily_progress;
use crate::store::operations::profile::{LearnerProfile, ProgressMarkers};

/// Returns `true` when a heart was removed.
pub fn lose_heart(profile: &mut LearnerProfile) -> bool {
    if profile.hearts == 0 {
        return false;
    }
    profile.hearts -= 1;
    true
}

/// Returns `true` when a heart was added.
pub fn gain_heart(profile: &mut LearnerProfile, max_hearts: u32) -> bool {
    if profile.hearts >= max_hearts {
        return false;
    }
    profile.hearts += 1;
    true
}

/// Adds up to `amount` hearts without passing the cap. Returns the number granted.
pub fn reward_hearts(profile: &mut LearnerProfile, amount: u32, max_hearts: u32) -> u32 {
    let target = profile.hearts.saturating_add(amount).min(max_hearts);
    let granted = target.saturating_sub(profile.hearts);
    profile.hearts = profile.hearts.max(target);
    granted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regeneration {
    pub hearts: u32,
    pub last_granted: DateTime<Utc>,
    pub granted: bool,
}

/// One regeneration check.
///
/// Grants at most one heart per call once a full `period` has elapsed since
/// `last_granted`; missed periods are not caught up. A missing anchor, or a
/// learner already at the cap, re-anchors to `now`.
pub fn apply_elapsed(
    hearts: u32,
    max_hearts: u32,
    last_granted: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    period: Duration,
) -> Regeneration {
    let unchanged = |anchor| Regeneration {
        hearts,
        last_granted: anchor,
        granted: false,
    };

    let Some(anchor) = last_granted else {
        return unchanged(now);
    };
    if hearts >= max_hearts {
        return Regeneration {
            hearts: max_hearts,
            last_granted: now,
            granted: false,
        };
    }
    if now - anchor < period {
        return unchanged(anchor);
    }

    Regeneration {
        hearts: hearts + 1,
        last_granted: now,
        granted: true,
    }
}

pub fn needs_daily_reset(last_reset: Option<NaiveDate>, today: NaiveDate) -> bool {
    last_reset != Some(today)
}

/// Refills hearts and starts a fresh daily tally. Returns `false` when today
/// was already handled.
pub fn apply_daily_reset(
    profile: &mut LearnerProfile,
    markers: &mut ProgressMarkers,
    today: NaiveDate,
    max_hearts: u32,
) -> bool {
    if !needs_daily_reset(markers.last_daily_reset, today) {
        return false;
    }
    profile.hearts = max_hearts;
    roll_daily_progress(profile, today);
    markers.last_daily_reset = Some(today);
    true
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, minute, 0).unwrap()
    }

    #[test]
    fn losing_stops_at_zero_and_gaining_at_cap() {
        let mut p = LearnerProfile::new(5);
        p.hearts = 1;
        assert!(lose_heart(&mut p));
        assert!(!lose_heart(&mut p));
        assert_eq!(p.hearts, 0);

        p.hearts = 5;
        assert!(!gain_heart(&mut p, 5));
        assert_eq!(p.hearts, 5);
    }

    #[test]
    fn reward_is_capped() {
        let mut p = LearnerProfile::new(5);
        p.hearts = 3;
        assert_eq!(reward_hearts(&mut p, 5, 5), 2);
        assert_eq!(p.hearts, 5);
    }

    #[test]
    fn grants_one_heart_per_elapsed_period() {
        let period = Duration::minutes(5);
        let early = apply_elapsed(2, 5, Some(at(0)), at(4), period);
        assert!(!early.granted);
        assert_eq!(early.last_granted, at(0));

        let due = apply_elapsed(2, 5, Some(at(0)), at(5), period);
        assert!(due.granted);
        assert_eq!(due.hearts, 3);
        assert_eq!(due.last_granted, at(5));
    }

    #[test]
    fn long_absence_still_grants_one() {
        let r = apply_elapsed(0, 5, Some(at(0)), at(59), Duration::minutes(5));
        assert_eq!(r.hearts, 1);
    }

    #[test]
    fn missing_anchor_initializes_without_grant() {
        let r = apply_elapsed(1, 5, None, at(10), Duration::minutes(5));
        assert_eq!(r.hearts, 1);
        assert!(!r.granted);
        assert_eq!(r.last_granted, at(10));
    }

    #[test]
    fn full_hearts_reanchor() {
        let r = apply_elapsed(5, 5, Some(at(0)), at(30), Duration::minutes(5));
        assert!(!r.granted);
        assert_eq!(r.last_granted, at(30));
    }

    #[test]
    fn clock_moving_backwards_grants_nothing() {
        let r = apply_elapsed(1, 5, Some(at(30)), at(10), Duration::minutes(5));
        assert!(!r.granted);
        assert_eq!(r.last_granted, at(30));
    }

    #[test]
    fn daily_reset_is_idempotent() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let mut p = LearnerProfile::new(5);
        p.hearts = 1;
        p.daily_progress = 9;
        p.daily_progress_date = today.pred_opt();
        let mut markers = ProgressMarkers::default();

        assert!(apply_daily_reset(&mut p, &mut markers, today, 5));
        assert_eq!(p.hearts, 5);
        assert_eq!(p.daily_progress, 0);

        p.hearts = 2;
        p.daily_progress = 4;
        assert!(!apply_daily_reset(&mut p, &mut markers, today, 5));
        assert_eq!(p.hearts, 2);
        assert_eq!(p.daily_progress, 4);
    }
}
