use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

use crate::config::ProgressConfig;
use crate::constants::{
    EVENT_CHANNEL_CAPACITY, LOCAL_LEARNER_ID, DEFAULT_LEARNER_NAME, XP_PER_CORRECT_ANSWER,
};
use crate::progress::catalog::{CatalogError, LessonSummary, LevelCatalog};
use crate::progress::challenge::{build_question_list, find_challenge, ChallengeDefinition};
use crate::progress::clock::Clock;
use crate::progress::events::ProgressEvent;
use crate::progress::hearts::{self, apply_elapsed};
use crate::progress::rewards::{award_xp, lesson_completion_xp, XpAward};
use crate::progress::session::{
    AnswerInput, AnswerOutcome, ExerciseSession, SessionError, SessionSource, SessionSummary,
    SessionView,
};
use crate::progress::streak::{self, StreakOutcome};
use crate::progress::unlock::is_unlocked;
use crate::store::legacy;
use crate::store::operations::leaderboard::LeaderboardEntry;
use crate::store::operations::profile::{LearnerProfile, ProgressMarkers};
use crate::store::operations::sync_queue::{OperationKind, PendingOperation};
use crate::store::{Store, StoreError};
use crate::sync::{Outbox, SyncClient};

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("lesson {0} is locked")]
    LessonLocked(u32),
    #[error("no hearts left")]
    NoHearts,
    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),
    #[error("no exercises available for challenge {0}")]
    NoChallengeContent(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    #[serde(flatten)]
    pub profile: LearnerProfile,
    pub max_hearts: u32,
    pub daily_goal_xp: u64,
    pub daily_goal_met: bool,
    /// When the next heart is due; `None` at the cap.
    pub next_heart_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStatus {
    #[serde(flatten)]
    pub summary: LessonSummary,
    pub unlocked: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub passed: bool,
    pub summary: SessionSummary,
    /// XP granted on completion, excluding per-answer XP and goal bonus.
    pub xp_awarded: u64,
    pub hearts_awarded: u32,
    pub level: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// `None` when the answer arrived after the deadline.
    pub outcome: Option<AnswerOutcome>,
    pub timed_out: bool,
    pub hearts: u32,
    pub xp: u64,
    pub level: u32,
    pub completion: Option<CompletionReport>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityUpdate {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Owns the learner's progression.
///
/// Every read-modify-write of the profile happens under `session`, which
/// also holds the single active exercise session, so scheduled checks and
/// request handlers never interleave. Events are broadcast only after the
/// change they describe has been persisted.
pub struct ProgressEngine {
    store: Arc<Store>,
    catalog: Arc<LevelCatalog>,
    config: ProgressConfig,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ProgressEvent>,
    session: Mutex<Option<ExerciseSession>>,
    outbox: Option<Outbox>,
}

impl ProgressEngine {
    pub fn new(
        store: Arc<Store>,
        catalog: Arc<LevelCatalog>,
        config: ProgressConfig,
        clock: Arc<dyn Clock>,
        sync: Option<Arc<SyncClient>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            catalog,
            config,
            clock,
            events,
            session: Mutex::new(None),
            outbox: sync.map(Outbox::spawn),
        }
    }

    pub fn catalog(&self) -> &LevelCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Process-start pass: streak evaluation, daily refill and one
    /// regeneration check.
    pub async fn startup_checks(&self) -> Result<ProfileSnapshot, ProgressError> {
        let _guard = self.session.lock().await;
        let (mut profile, mut markers) = self.load()?;
        let mut events = Vec::new();

        self.apply_day_rules(&mut profile, &mut markers, &mut events);
        self.apply_regeneration(&mut profile, &mut markers, &mut events);

        self.store.save_progress(&profile, &markers)?;
        self.emit(events);
        tracing::info!(
            xp = profile.xp,
            streak = profile.streak,
            hearts = profile.hearts,
            level = profile.level,
            "Progress startup checks complete"
        );
        Ok(self.snapshot(profile, &markers))
    }

    pub async fn profile(&self) -> Result<ProfileSnapshot, ProgressError> {
        let _guard = self.session.lock().await;
        let (profile, markers) = self.load()?;
        Ok(self.snapshot(profile, &markers))
    }

    pub async fn update_identity(
        &self,
        update: IdentityUpdate,
    ) -> Result<ProfileSnapshot, ProgressError> {
        let _guard = self.session.lock().await;
        let (mut profile, markers) = self.load()?;
        let created = profile.id.is_none() && update.id.is_some();
        let previous_entry_id = leaderboard_entry(&profile).id;

        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        if let Some(id) = clean(update.id) {
            profile.id = Some(id);
        }
        if let Some(name) = clean(update.name) {
            profile.name = Some(name);
        }
        if let Some(email) = clean(update.email) {
            profile.email = Some(email);
        }
        self.store.save_profile(&profile)?;
        let entry = leaderboard_entry(&profile);
        if entry.id != previous_entry_id {
            self.store
                .rekey_leaderboard_entry(&previous_entry_id, &entry)?;
            tracing::info!(from = %previous_entry_id, to = %entry.id, "Leaderboard entry re-keyed");
        }

        let kind = if created {
            OperationKind::CreateUser
        } else {
            OperationKind::UpdateUser
        };
        self.mirror(vec![(
            kind,
            json!({ "id": profile.id, "name": profile.name, "email": profile.email }),
        )]);
        Ok(self.snapshot(profile, &markers))
    }

    pub async fn lessons_overview(&self) -> Result<Vec<LessonStatus>, ProgressError> {
        let _guard = self.session.lock().await;
        let (profile, _) = self.load()?;
        Ok(self
            .catalog
            .summaries()
            .into_iter()
            .map(|summary| LessonStatus {
                unlocked: is_unlocked(
                    summary.id,
                    &profile.completed_lessons,
                    profile.hearts,
                    &self.catalog,
                ),
                completed: profile.completed_lessons.contains(&summary.id),
                summary,
            })
            .collect())
    }

    /// Opens a lesson session, replacing any session already in memory.
    pub async fn start_lesson(&self, lesson_id: u32) -> Result<SessionView, ProgressError> {
        let mut slot = self.session.lock().await;
        let lesson = self.catalog.get(lesson_id)?;

        let (mut profile, mut markers) = self.load()?;
        let mut events = Vec::new();
        self.apply_day_rules(&mut profile, &mut markers, &mut events);
        self.store.save_progress(&profile, &markers)?;
        self.emit(events);

        if !is_unlocked(lesson_id, &profile.completed_lessons, profile.hearts, &self.catalog) {
            let previous_done =
                lesson_id <= 1 || profile.completed_lessons.contains(&(lesson_id - 1));
            return Err(if previous_done {
                ProgressError::NoHearts
            } else {
                ProgressError::LessonLocked(lesson_id)
            });
        }
        if profile.hearts == 0 {
            return Err(ProgressError::NoHearts);
        }

        let session = ExerciseSession::new(
            SessionSource::Lesson {
                lesson_id,
                xp_reward: lesson.xp_reward,
            },
            lesson.exercises.clone(),
            self.clock.now(),
            None,
        );
        tracing::info!(lesson_id, session_id = %session.id(), "Lesson started");
        Ok(Self::replace_session(&mut slot, session))
    }

    pub async fn start_challenge(&self, challenge_id: &str) -> Result<SessionView, ProgressError> {
        let mut slot = self.session.lock().await;
        let definition: &ChallengeDefinition = find_challenge(challenge_id)
            .ok_or_else(|| ProgressError::ChallengeNotFound(challenge_id.to_string()))?;

        let (mut profile, mut markers) = self.load()?;
        let mut events = Vec::new();
        self.apply_day_rules(&mut profile, &mut markers, &mut events);
        self.store.save_progress(&profile, &markers)?;
        self.emit(events);

        if profile.hearts == 0 {
            return Err(ProgressError::NoHearts);
        }

        let exercises = {
            let mut rng = StdRng::from_entropy();
            build_question_list(&self.catalog, definition.question_count, &mut rng)
        };
        if exercises.is_empty() {
            return Err(ProgressError::NoChallengeContent(challenge_id.to_string()));
        }

        let now = self.clock.now();
        let deadline = definition
            .time_limit_secs
            .map(|secs| now + Duration::seconds(secs));
        let session = ExerciseSession::new(
            SessionSource::Challenge {
                challenge_id: definition.id.clone(),
                required_accuracy: definition.required_accuracy,
                heart_reward: definition.heart_reward,
                xp_reward: definition.xp_reward,
            },
            exercises,
            now,
            deadline,
        );
        tracing::info!(challenge_id, session_id = %session.id(), "Challenge started");
        Ok(Self::replace_session(&mut slot, session))
    }

    pub async fn session_view(&self, session_id: &str) -> Result<SessionView, ProgressError> {
        let slot = self.session.lock().await;
        let session = slot
            .as_ref()
            .filter(|s| s.id() == session_id)
            .ok_or_else(|| ProgressError::SessionNotFound(session_id.to_string()))?;
        let mut rng = StdRng::from_entropy();
        Ok(session.view(&mut rng))
    }

    /// Drops the session. Effects already applied per answer are kept.
    pub async fn abandon_session(&self, session_id: &str) -> Result<(), ProgressError> {
        let mut slot = self.session.lock().await;
        match slot.as_ref() {
            Some(s) if s.id() == session_id => {
                tracing::info!(
                    session_id,
                    answered = s.answer_log().len(),
                    "Session abandoned"
                );
                *slot = None;
                Ok(())
            }
            _ => Err(ProgressError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Scores one answer and applies its effects immediately: XP for a
    /// correct answer, a heart for a wrong one. The final answer (or a late
    /// one) completes the session and pays out.
    pub async fn submit_answer(
        &self,
        session_id: &str,
        input: &AnswerInput,
    ) -> Result<SubmitResponse, ProgressError> {
        let mut slot = self.session.lock().await;
        let session = slot
            .as_mut()
            .filter(|s| s.id() == session_id)
            .ok_or_else(|| ProgressError::SessionNotFound(session_id.to_string()))?;

        let now = self.clock.now();
        let today = self.clock.today();
        let (mut profile, mut markers) = self.load()?;
        let mut events = Vec::new();

        let (outcome, timed_out) = match session.submit(input, now) {
            Ok(outcome) => {
                if outcome.correct {
                    let award = award_xp(
                        &mut profile,
                        &mut markers,
                        XP_PER_CORRECT_ANSWER as i64,
                        today,
                        self.config.daily_goal_xp,
                    );
                    push_award_events(&award, &profile, &mut events);
                } else {
                    let was_full = profile.hearts >= self.config.max_hearts;
                    if hearts::lose_heart(&mut profile) {
                        if was_full {
                            markers.last_heart_granted = Some(now);
                        }
                        events.push(ProgressEvent::HeartLost {
                            hearts: profile.hearts,
                        });
                    }
                }
                (Some(outcome), false)
            }
            Err(SessionError::Expired) => {
                tracing::info!(session_id, "Answer arrived after the deadline");
                (None, true)
            }
            Err(e) => return Err(e.into()),
        };

        let completion = if session.is_completed() {
            Some(self.finalize(session, &mut profile, &mut markers, today, &mut events))
        } else {
            None
        };

        self.store.save_progress(&profile, &markers)?;
        if completion.is_some() {
            self.store
                .upsert_leaderboard_entry(&leaderboard_entry(&profile))?;
        }
        self.emit(events);

        if let Some(report) = &completion {
            self.mirror(vec![
                (OperationKind::SaveProgress, json!(profile)),
                (
                    OperationKind::UpdateRanking,
                    json!(leaderboard_entry(&profile)),
                ),
                (
                    OperationKind::TrackEvent,
                    json!({
                        "event": "session_completed",
                        "source": session.source(),
                        "summary": report.summary,
                    }),
                ),
            ]);
        }

        Ok(SubmitResponse {
            outcome,
            timed_out,
            hearts: profile.hearts,
            xp: profile.xp,
            level: profile.level,
            completion,
        })
    }

    /// Scheduled check: at most one heart per call. Also closes a timed
    /// session whose deadline has passed.
    pub async fn regenerate_hearts(&self) -> Result<bool, ProgressError> {
        let mut slot = self.session.lock().await;
        let (mut profile, mut markers) = self.load()?;
        let mut events = Vec::new();

        let granted = self.apply_regeneration(&mut profile, &mut markers, &mut events);

        let now = self.clock.now();
        let mut completion = None;
        if let Some(session) = slot.as_mut().filter(|s| !s.is_completed()) {
            if session.is_past_deadline(now) {
                session.expire();
                let today = self.clock.today();
                completion =
                    Some(self.finalize(session, &mut profile, &mut markers, today, &mut events));
            }
        }

        self.store.save_progress(&profile, &markers)?;
        if completion.is_some() {
            self.store
                .upsert_leaderboard_entry(&leaderboard_entry(&profile))?;
        }
        self.emit(events);
        Ok(granted)
    }

    /// Scheduled day-boundary pass. Idempotent within a calendar day.
    pub async fn daily_rollover(&self) -> Result<bool, ProgressError> {
        let _guard = self.session.lock().await;
        let (mut profile, mut markers) = self.load()?;
        let mut events = Vec::new();

        let changed = self.apply_day_rules(&mut profile, &mut markers, &mut events);
        if changed {
            self.store.save_progress(&profile, &markers)?;
            self.emit(events);
        }
        Ok(changed)
    }

    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, ProgressError> {
        let _guard = self.session.lock().await;
        let (profile, _) = self.load()?;
        let own = leaderboard_entry(&profile);
        // 本地学习者始终参与排名，即使尚未完成任何课程
        self.store.upsert_leaderboard_entry(&own)?;
        Ok(self.store.list_leaderboard(limit)?)
    }

    /// Writes a legacy browser storage dump and folds it immediately.
    pub async fn import_local_storage(
        &self,
        dump: &BTreeMap<String, String>,
    ) -> Result<(usize, ProfileSnapshot), ProgressError> {
        let _guard = self.session.lock().await;
        let written = self.store.import_local_storage(dump)?;
        legacy::fold_if_present(&self.store, self.config.max_hearts)?;
        let (profile, markers) = self.load()?;
        Ok((written, self.snapshot(profile, &markers)))
    }

    fn load(&self) -> Result<(LearnerProfile, ProgressMarkers), StoreError> {
        let profile = self.store.load_profile(self.config.max_hearts)?;
        let markers = self.store.load_markers()?;
        Ok((profile, markers))
    }

    fn snapshot(&self, profile: LearnerProfile, markers: &ProgressMarkers) -> ProfileSnapshot {
        let next_heart_at = (profile.hearts < self.config.max_hearts)
            .then(|| markers.last_heart_granted.map(|at| at + self.regen_period()))
            .flatten();
        ProfileSnapshot {
            daily_goal_met: markers.last_daily_goal == Some(self.clock.today()),
            max_hearts: self.config.max_hearts,
            daily_goal_xp: self.config.daily_goal_xp,
            next_heart_at,
            profile,
        }
    }

    fn regen_period(&self) -> Duration {
        Duration::minutes(self.config.heart_regen_minutes.max(1))
    }

    fn replace_session(slot: &mut Option<ExerciseSession>, session: ExerciseSession) -> SessionView {
        if let Some(previous) = slot.as_ref().filter(|s| !s.is_completed()) {
            tracing::info!(session_id = %previous.id(), "Replacing unfinished session");
        }
        let mut rng = StdRng::from_entropy();
        let view = session.view(&mut rng);
        *slot = Some(session);
        view
    }

    /// Streak evaluation followed by the daily refill. Returns whether
    /// anything changed.
    fn apply_day_rules(
        &self,
        profile: &mut LearnerProfile,
        markers: &mut ProgressMarkers,
        events: &mut Vec<ProgressEvent>,
    ) -> bool {
        let today = self.clock.today();
        let mut changed = false;

        match streak::evaluate(profile, today) {
            StreakOutcome::Started => changed = true,
            StreakOutcome::Unchanged => {}
            StreakOutcome::Maintained { streak } => {
                changed = true;
                events.push(ProgressEvent::StreakMaintained { streak });
            }
            StreakOutcome::Lost { days_missed } => {
                changed = true;
                tracing::info!(days_missed, "Streak lost");
                events.push(ProgressEvent::StreakLost { days_missed });
            }
            StreakOutcome::ClockSkew { days_ahead } => {
                tracing::warn!(
                    days_ahead,
                    last_activity = ?profile.last_activity_date,
                    %today,
                    "Last activity lies in the future, streak left unchanged"
                );
            }
        }

        if hearts::apply_daily_reset(profile, markers, today, self.config.max_hearts) {
            changed = true;
            events.push(ProgressEvent::HeartsRefilled {
                hearts: profile.hearts,
            });
        }
        changed
    }

    fn apply_regeneration(
        &self,
        profile: &mut LearnerProfile,
        markers: &mut ProgressMarkers,
        events: &mut Vec<ProgressEvent>,
    ) -> bool {
        let regen = apply_elapsed(
            profile.hearts,
            self.config.max_hearts,
            markers.last_heart_granted,
            self.clock.now(),
            self.regen_period(),
        );
        profile.hearts = regen.hearts;
        markers.last_heart_granted = Some(regen.last_granted);
        if regen.granted {
            events.push(ProgressEvent::HeartGained {
                hearts: profile.hearts,
            });
        }
        regen.granted
    }

    /// Pays out a completed session. Per-answer effects were already applied.
    fn finalize(
        &self,
        session: &ExerciseSession,
        profile: &mut LearnerProfile,
        markers: &mut ProgressMarkers,
        today: NaiveDate,
        events: &mut Vec<ProgressEvent>,
    ) -> CompletionReport {
        let summary = session.summary();
        let passed = summary.passed.unwrap_or(false);
        let mut xp_awarded = 0;
        let mut hearts_awarded = 0;

        match session.source() {
            SessionSource::Lesson {
                lesson_id,
                xp_reward,
            } => {
                if passed {
                    xp_awarded =
                        lesson_completion_xp(*xp_reward, summary.correct, summary.total);
                    let award = award_xp(
                        profile,
                        markers,
                        xp_awarded as i64,
                        today,
                        self.config.daily_goal_xp,
                    );
                    push_award_events(&award, profile, events);
                    profile.completed_lessons.insert(*lesson_id);
                }
                tracing::info!(
                    lesson_id,
                    passed,
                    correct = summary.correct,
                    total = summary.total,
                    xp_awarded,
                    "Lesson completed"
                );
                events.push(ProgressEvent::LessonCompleted {
                    lesson_id: *lesson_id,
                    passed,
                    xp_awarded,
                    accuracy: summary.accuracy,
                });
            }
            SessionSource::Challenge {
                challenge_id,
                heart_reward,
                xp_reward,
                ..
            } => {
                if passed {
                    hearts_awarded =
                        hearts::reward_hearts(profile, *heart_reward, self.config.max_hearts);
                    xp_awarded = *xp_reward;
                    let award = award_xp(
                        profile,
                        markers,
                        xp_awarded as i64,
                        today,
                        self.config.daily_goal_xp,
                    );
                    push_award_events(&award, profile, events);
                }
                tracing::info!(
                    challenge_id = %challenge_id,
                    passed,
                    timed_out = summary.timed_out,
                    hearts_awarded,
                    xp_awarded,
                    "Challenge completed"
                );
                events.push(ProgressEvent::ChallengeCompleted {
                    challenge_id: challenge_id.clone(),
                    succeeded: passed,
                    hearts_awarded,
                    xp_awarded,
                });
            }
        }

        CompletionReport {
            passed,
            summary,
            xp_awarded,
            hearts_awarded,
            level: profile.level,
        }
    }

    fn emit(&self, events: Vec<ProgressEvent>) {
        for event in events {
            // 没有订阅者时发送失败是正常情况
            let _ = self.events.send(event);
        }
    }

    /// Hands operations to the sync client without blocking the caller.
    /// Called under the engine lock, so the outbox sees them in commit order.
    fn mirror(&self, ops: Vec<(OperationKind, serde_json::Value)>) {
        let Some(outbox) = &self.outbox else {
            return;
        };
        let now = self.clock.now();
        for (kind, payload) in ops {
            outbox.send(PendingOperation::new(kind, payload, now));
        }
    }
}

fn push_award_events(award: &XpAward, profile: &LearnerProfile, events: &mut Vec<ProgressEvent>) {
    if award.amount > 0 {
        events.push(ProgressEvent::XpGained {
            amount: award.amount,
            total: profile.xp,
        });
    }
    if let Some(bonus) = award.goal_bonus {
        events.push(ProgressEvent::DailyGoalCompleted { bonus });
    }
    if award.leveled_up() {
        events.push(ProgressEvent::LevelUp {
            level: award.level_after,
        });
    }
}

fn leaderboard_entry(profile: &LearnerProfile) -> LeaderboardEntry {
    LeaderboardEntry {
        id: profile
            .id
            .clone()
            .unwrap_or_else(|| LOCAL_LEARNER_ID.to_string()),
        name: profile
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_LEARNER_NAME.to_string()),
        xp: profile.xp,
        streak: profile.streak,
        level: profile.level,
        last_activity: profile.last_activity_date,
    }
}
