use chrono::NaiveDate;

use crate::constants::{DAILY_GOAL_BONUS_XP, PASS_THRESHOLD_PERCENT, PERFECT_LESSON_BONUS_XP};
use crate::progress::streak::roll_daily_progress;
use crate::store::operations::profile::{LearnerProfile, ProgressMarkers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpAward {
    /// XP credited by the call itself, excluding any goal bonus.
    pub amount: u64,
    pub goal_bonus: Option<u64>,
    pub level_before: u32,
    pub level_after: u32,
}

impl XpAward {
    pub fn leveled_up(&self) -> bool {
        self.level_after > self.level_before
    }

    pub fn total(&self) -> u64 {
        self.amount + self.goal_bonus.unwrap_or(0)
    }
}

/// Credits XP for `today`. Negative amounts count as zero.
///
/// Crossing `daily_goal` for the first time in a day adds a fixed bonus,
/// starts a streak at 1 when none is running and marks today as active.
pub fn award_xp(
    profile: &mut LearnerProfile,
    markers: &mut ProgressMarkers,
    amount: i64,
    today: NaiveDate,
    daily_goal: u64,
) -> XpAward {
    let amount = u64::try_from(amount).unwrap_or(0);
    let level_before = profile.level;

    roll_daily_progress(profile, today);
    profile.xp = profile.xp.saturating_add(amount);
    profile.daily_progress = profile.daily_progress.saturating_add(amount);

    let goal_bonus = if profile.daily_progress >= daily_goal
        && markers.last_daily_goal != Some(today)
    {
        profile.xp = profile.xp.saturating_add(DAILY_GOAL_BONUS_XP);
        profile.daily_progress = profile.daily_progress.saturating_add(DAILY_GOAL_BONUS_XP);
        if profile.streak == 0 {
            profile.streak = 1;
        }
        profile.last_activity_date = Some(today);
        markers.last_daily_goal = Some(today);
        Some(DAILY_GOAL_BONUS_XP)
    } else {
        None
    };

    profile.recompute_level();
    XpAward {
        amount,
        goal_bonus,
        level_before,
        level_after: profile.level,
    }
}

/// Minimum correct answers to pass: ceil(total * 70%).
pub fn min_correct_to_pass(total: usize) -> usize {
    (total * PASS_THRESHOLD_PERCENT).div_ceil(100)
}

pub fn accuracy_percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    correct as f64 / total as f64 * 100.0
}

/// Completion XP for a passed lesson. Per-answer XP was already granted,
/// so the lesson reward shrinks by two per correct answer.
pub fn lesson_completion_xp(xp_reward: u64, correct: usize, total: usize) -> u64 {
    let base = xp_reward.saturating_sub(correct as u64 * 2);
    let perfect = total > 0 && correct == total;
    base + if perfect { PERFECT_LESSON_BONUS_XP } else { 0 }
}
