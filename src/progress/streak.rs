use chrono::NaiveDate;

use crate::store::operations::profile::LearnerProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakOutcome {
    /// No prior activity; today was recorded.
    Started,
    Unchanged,
    Maintained { streak: u32 },
    Lost { days_missed: i64 },
    /// Stored date lies in the future; nothing was changed.
    ClockSkew { days_ahead: i64 },
}

/// Applies the calendar-day streak rules for `today`. Idempotent within a day.
pub fn evaluate(profile: &mut LearnerProfile, today: NaiveDate) -> StreakOutcome {
    let Some(last) = profile.last_activity_date else {
        profile.last_activity_date = Some(today);
        return StreakOutcome::Started;
    };

    match (today - last).num_days() {
        0 => StreakOutcome::Unchanged,
        1 => {
            profile.streak = profile.streak.saturating_add(1);
            reset_daily_progress(profile, today);
            profile.last_activity_date = Some(today);
            StreakOutcome::Maintained {
                streak: profile.streak,
            }
        }
        days if days > 1 => {
            profile.streak = 0;
            reset_daily_progress(profile, today);
            profile.last_activity_date = Some(today);
            StreakOutcome::Lost { days_missed: days }
        }
        days => StreakOutcome::ClockSkew { days_ahead: -days },
    }
}

fn reset_daily_progress(profile: &mut LearnerProfile, today: NaiveDate) {
    profile.daily_progress = 0;
    profile.daily_progress_date = Some(today);
}

/// Zeroes `daily_progress` once per calendar day, whichever rule gets there
/// first. Progress without a recorded day is attributed to the last active day.
pub fn roll_daily_progress(profile: &mut LearnerProfile, today: NaiveDate) -> bool {
    let owner = profile.daily_progress_date.or(profile.last_activity_date);
    let rolled = owner != Some(today) && profile.daily_progress > 0;
    if owner != Some(today) {
        profile.daily_progress = 0;
    }
    profile.daily_progress_date = Some(today);
    rolled
}
