//! Per-recipient suggestion scheduling.
//!
//! One cancellable timer per recipient id. Timers fire concurrently with each
//! other and with user actions; the store's atomic check-and-insert is the
//! correctness boundary, and the fire handler re-validates against the latest
//! roster snapshot rather than a copy captured at schedule time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::domain::recipient::RecipientProfile;
use crate::errors::SuggestError;
use crate::events::{EventSender, SuggestionEvent};
use crate::service::SuggestionService;
use crate::store::{StoreError, SuggestionStore};

/// Latest view of the tracked recipients, read fresh at fire time.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn snapshot(&self) -> Vec<RecipientProfile>;
}

/// Current session budget. `None` or a non-positive value blocks automatic
/// suggestions with a user-facing warning.
pub trait BudgetSource: Send + Sync {
    fn current_budget(&self) -> Option<f64>;
}

/// One armed timer. Destroyed when the timer fires, is cancelled, or is
/// superseded by a fresh schedule call for the same recipient.
///
/// The generation ties the entry to the task that owns it: once `fire` has
/// returned there is no await left for `abort` to hit, so a superseding
/// entry inserted in that window must not be deleted by the old task.
struct SchedulerEntry {
    handle: JoinHandle<()>,
    generation: u64,
}

/// Owns the per-recipient timers and drives the automatic suggestion path.
///
/// Invariants:
/// - at most one armed timer per recipient (schedule supersedes);
/// - a recipient with any stored suggestion is never scheduled;
/// - the in-flight entry is removed on every fire exit path, so a later
///   explicit re-schedule is never permanently blocked.
pub struct RecipientScheduler {
    entries: Arc<Mutex<HashMap<String, SchedulerEntry>>>,
    store: Arc<SuggestionStore>,
    roster: Arc<dyn RosterSource>,
    budget: Arc<dyn BudgetSource>,
    service: Arc<dyn SuggestionService>,
    events: EventSender,
    config: SchedulerConfig,
    rng: Mutex<StdRng>,
    generation: AtomicU64,
}

impl RecipientScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<SuggestionStore>,
        roster: Arc<dyn RosterSource>,
        budget: Arc<dyn BudgetSource>,
        service: Arc<dyn SuggestionService>,
        events: EventSender,
    ) -> Self {
        Self::with_rng(config, store, roster, budget, service, events, StdRng::from_entropy())
    }

    /// Seeded constructor so tests control the delay draw.
    #[allow(clippy::too_many_arguments)]
    pub fn with_rng(
        config: SchedulerConfig,
        store: Arc<SuggestionStore>,
        roster: Arc<dyn RosterSource>,
        budget: Arc<dyn BudgetSource>,
        service: Arc<dyn SuggestionService>,
        events: EventSender,
        rng: StdRng,
    ) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            store,
            roster,
            budget,
            service,
            events,
            config,
            rng: Mutex::new(rng),
            generation: AtomicU64::new(0),
        }
    }

    /// Explicit startup reset: drop all in-memory schedule state. Never
    /// touches stored suggestions or the roster.
    pub fn reset(&self) {
        self.cancel_all();
    }

    /// Arm a one-shot timer for the recipient after a uniform random delay.
    ///
    /// Supersede semantics: an existing timer for the same recipient is
    /// cancelled first, so re-adding a recipient restarts the wait instead of
    /// stacking timers. A recipient who already has a suggestion is skipped.
    pub fn schedule(&self, recipient: &RecipientProfile) {
        let mut entries = self.entries.lock().expect("scheduler entries lock poisoned");
        if let Some(previous) = entries.remove(&recipient.id) {
            previous.handle.abort();
            debug!(
                event_name = "scheduler.schedule.superseded",
                recipient_id = %recipient.id,
                "cancelled previously armed timer"
            );
        }

        if self.store.has_suggestion(&recipient.id) {
            debug!(
                event_name = "scheduler.schedule.skipped",
                recipient_id = %recipient.id,
                reason = "suggestion_exists",
                "recipient already has a suggestion; not scheduling"
            );
            return;
        }

        let delay = self.pick_delay();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            event_name = "scheduler.schedule.armed",
            recipient_id = %recipient.id,
            delay_secs = delay.as_secs(),
            "armed automatic suggestion timer"
        );

        let handle = tokio::spawn({
            let entries = Arc::clone(&self.entries);
            let store = Arc::clone(&self.store);
            let roster = Arc::clone(&self.roster);
            let budget = Arc::clone(&self.budget);
            let service = Arc::clone(&self.service);
            let events = self.events.clone();
            let recipient_id = recipient.id.clone();
            async move {
                tokio::time::sleep(delay).await;
                fire(&recipient_id, &store, roster.as_ref(), budget.as_ref(), service.as_ref(), &events)
                    .await;
                // In-flight marker cleared whether the fire succeeded,
                // failed, or was skipped.
                clear_entry(&entries, &recipient_id, generation);
            }
        });

        entries.insert(recipient.id.clone(), SchedulerEntry { handle, generation });
    }

    /// Cancel the timer for a single recipient, if armed. Used on recipient
    /// deletion.
    pub fn cancel(&self, recipient_id: &str) {
        let mut entries = self.entries.lock().expect("scheduler entries lock poisoned");
        if let Some(entry) = entries.remove(recipient_id) {
            entry.handle.abort();
            info!(
                event_name = "scheduler.cancelled",
                recipient_id = %recipient_id,
                "cancelled automatic suggestion timer"
            );
        }
    }

    /// Cancel every outstanding timer and clear all in-flight markers. Used
    /// on session reset and on "clear all suggestions".
    pub fn cancel_all(&self) {
        let mut entries = self.entries.lock().expect("scheduler entries lock poisoned");
        let cancelled = entries.len();
        for (_, entry) in entries.drain() {
            entry.handle.abort();
        }
        if cancelled > 0 {
            info!(
                event_name = "scheduler.cancelled_all",
                cancelled,
                "cancelled all automatic suggestion timers"
            );
        }
    }

    pub fn is_scheduled(&self, recipient_id: &str) -> bool {
        self.entries.lock().expect("scheduler entries lock poisoned").contains_key(recipient_id)
    }

    pub fn scheduled_recipients(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("scheduler entries lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn pick_delay(&self) -> Duration {
        let mut rng = self.rng.lock().expect("scheduler rng lock poisoned");
        let secs =
            rng.gen_range(self.config.min_delay_secs..=self.config.max_delay_secs);
        Duration::from_secs(secs)
    }
}

impl Drop for RecipientScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Remove the recipient's entry only if it still belongs to the finishing
/// task. A superseding `schedule` may have replaced the entry between the
/// fire body returning and this cleanup; that newer timer keeps its marker.
fn clear_entry(
    entries: &Mutex<HashMap<String, SchedulerEntry>>,
    recipient_id: &str,
    generation: u64,
) {
    let mut entries = entries.lock().expect("scheduler entries lock poisoned");
    if entries.get(recipient_id).is_some_and(|entry| entry.generation == generation) {
        entries.remove(recipient_id);
    }
}

/// Timer fire handler. Re-validates, in order, before any ranking work:
/// the recipient still exists in the current roster, a positive budget is
/// configured, and no suggestion appeared for the recipient since the timer
/// was armed. The first two run against live sources, and the store's
/// check-and-insert re-checks the third at write time.
async fn fire(
    recipient_id: &str,
    store: &SuggestionStore,
    roster: &dyn RosterSource,
    budget: &dyn BudgetSource,
    service: &dyn SuggestionService,
    events: &EventSender,
) {
    let snapshot = roster.snapshot().await;
    let Some(recipient) = snapshot.into_iter().find(|profile| profile.id == recipient_id) else {
        debug!(
            event_name = "scheduler.fire.skipped",
            recipient_id = %recipient_id,
            reason = "recipient_removed",
            "recipient no longer in roster; skipping"
        );
        return;
    };

    let Some(budget_amount) = budget.current_budget().filter(|amount| *amount > 0.0) else {
        warn!(
            event_name = "scheduler.fire.no_budget",
            recipient_id = %recipient.id,
            "no budget configured; skipping automatic suggestion"
        );
        let _ = events.send(SuggestionEvent::error(
            &recipient.id,
            SuggestError::NoBudget.to_string(),
        ));
        return;
    };

    if store.has_suggestion(&recipient.id) {
        debug!(
            event_name = "scheduler.fire.skipped",
            recipient_id = %recipient.id,
            reason = "suggestion_exists",
            "suggestion appeared while waiting; skipping"
        );
        return;
    }

    match service.suggest_one(&recipient, budget_amount).await {
        Ok(Some(candidate)) => match store.upsert_pending(&recipient.id, candidate) {
            Ok(suggestion) => {
                info!(
                    event_name = "scheduler.fire.suggestion_ready",
                    recipient_id = %recipient.id,
                    product = %suggestion.product.name,
                    score = suggestion.score,
                    "automatic suggestion created"
                );
                let _ = events.send(SuggestionEvent::ready(suggestion));
            }
            Err(StoreError::AlreadyExists { .. }) => {
                // Lost the race against another insert; the other result
                // stands and this one is discarded.
                debug!(
                    event_name = "scheduler.fire.skipped",
                    recipient_id = %recipient.id,
                    reason = "duplicate_insert",
                    "another path inserted first; discarding result"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "scheduler.fire.store_error",
                    recipient_id = %recipient.id,
                    error = %error,
                    "could not persist automatic suggestion"
                );
            }
        },
        Ok(None) => {
            info!(
                event_name = "scheduler.fire.no_candidates",
                recipient_id = %recipient.id,
                "ranking produced no candidates"
            );
            let _ = events.send(SuggestionEvent::error(
                &recipient.id,
                SuggestError::NoCandidates.to_string(),
            ));
        }
        Err(error) => {
            // A failed automatic attempt is terminal for this fire; the user
            // must act (manual re-fetch) to try again.
            warn!(
                event_name = "scheduler.fire.failed",
                recipient_id = %recipient.id,
                error = %error,
                "automatic suggestion failed; not retrying"
            );
            let _ = events.send(SuggestionEvent::error(&recipient.id, error.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::domain::product::Product;
    use crate::domain::suggestion::ScoredCandidate;
    use crate::events::{event_channel, EventReceiver};

    struct StaticRoster {
        recipients: Mutex<Vec<RecipientProfile>>,
    }

    impl StaticRoster {
        fn of(recipients: Vec<RecipientProfile>) -> Arc<Self> {
            Arc::new(Self { recipients: Mutex::new(recipients) })
        }

        fn remove(&self, recipient_id: &str) {
            self.recipients
                .lock()
                .expect("roster lock")
                .retain(|profile| profile.id != recipient_id);
        }
    }

    #[async_trait]
    impl RosterSource for StaticRoster {
        async fn snapshot(&self) -> Vec<RecipientProfile> {
            self.recipients.lock().expect("roster lock").clone()
        }
    }

    struct FixedBudget(f64);

    impl BudgetSource for FixedBudget {
        fn current_budget(&self) -> Option<f64> {
            Some(self.0)
        }
    }

    struct ScriptedService {
        responses: AsyncMutex<VecDeque<Result<Option<ScoredCandidate>, SuggestError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedService {
        fn with_script(
            responses: Vec<Result<Option<ScoredCandidate>, SuggestError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: AsyncMutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SuggestionService for ScriptedService {
        async fn suggest_one(
            &self,
            _recipient: &RecipientProfile,
            _budget: f64,
        ) -> Result<Option<ScoredCandidate>, SuggestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().await.pop_front().unwrap_or(Ok(None))
        }
    }

    fn candidate() -> ScoredCandidate {
        ScoredCandidate {
            product: Product::new("p1", "Rose Posy").with_price(24.0),
            score: 5,
            reasons: vec!["Within budget (£24)".to_string()],
        }
    }

    fn alice() -> RecipientProfile {
        RecipientProfile::new("r1", "Alice")
    }

    fn test_config() -> SchedulerConfig {
        SchedulerConfig { min_delay_secs: 1, max_delay_secs: 2, auto_suggest: true }
    }

    struct Harness {
        scheduler: RecipientScheduler,
        store: Arc<SuggestionStore>,
        roster: Arc<StaticRoster>,
        service: Arc<ScriptedService>,
        events: EventReceiver,
    }

    fn harness(
        budget: f64,
        responses: Vec<Result<Option<ScoredCandidate>, SuggestError>>,
    ) -> Harness {
        let store = Arc::new(SuggestionStore::new());
        let roster = StaticRoster::of(vec![alice()]);
        let service = ScriptedService::with_script(responses);
        let (sender, events) = event_channel();

        let scheduler = RecipientScheduler::with_rng(
            test_config(),
            Arc::clone(&store),
            Arc::clone(&roster) as Arc<dyn RosterSource>,
            Arc::new(FixedBudget(budget)),
            Arc::clone(&service) as Arc<dyn SuggestionService>,
            sender,
            StdRng::seed_from_u64(42),
        );

        Harness { scheduler, store, roster, service, events }
    }

    /// Advance past the delay window and wait for the fire task to clear its
    /// in-flight marker.
    async fn wait_for_fire(scheduler: &RecipientScheduler, recipient_id: &str) {
        for _ in 0..50 {
            if !scheduler.is_scheduled(recipient_id) {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("timer for {recipient_id} never fired");
    }

    #[tokio::test(start_paused = true)]
    async fn fire_creates_suggestion_and_emits_ready_event() {
        let mut harness = harness(50.0, vec![Ok(Some(candidate()))]);

        harness.scheduler.schedule(&alice());
        assert!(harness.scheduler.is_scheduled("r1"));

        let event = harness.events.recv().await.expect("event should arrive");
        assert!(matches!(event, SuggestionEvent::Ready { ref recipient_id, .. } if recipient_id == "r1"));

        wait_for_fire(&harness.scheduler, "r1").await;
        assert_eq!(harness.store.len(), 1);
        assert_eq!(harness.service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn double_schedule_leaves_exactly_one_armed_timer() {
        let harness = harness(50.0, vec![Ok(Some(candidate()))]);

        harness.scheduler.schedule(&alice());
        harness.scheduler.schedule(&alice());
        assert_eq!(harness.scheduler.scheduled_recipients(), vec!["r1".to_string()]);

        wait_for_fire(&harness.scheduler, "r1").await;
        // The superseded timer was aborted, so the service ran once.
        assert_eq!(harness.service.calls(), 1);
        assert_eq!(harness.store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_is_a_noop_when_a_suggestion_exists() {
        let harness = harness(50.0, vec![Ok(Some(candidate()))]);
        harness.store.upsert_pending("r1", candidate()).unwrap();

        harness.scheduler.schedule(&alice());
        assert!(!harness.scheduler.is_scheduled("r1"));
        assert_eq!(harness.service.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_recipient_is_skipped_silently() {
        let mut harness = harness(50.0, vec![Ok(Some(candidate()))]);

        harness.scheduler.schedule(&alice());
        harness.roster.remove("r1");

        wait_for_fire(&harness.scheduler, "r1").await;
        assert!(harness.store.is_empty());
        assert_eq!(harness.service.calls(), 0);
        assert!(harness.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_emits_warning_event_and_aborts() {
        let mut harness = harness(0.0, vec![Ok(Some(candidate()))]);

        harness.scheduler.schedule(&alice());
        let event = harness.events.recv().await.expect("event should arrive");
        assert!(matches!(event, SuggestionEvent::Error { ref recipient_id, .. } if recipient_id == "r1"));

        wait_for_fire(&harness.scheduler, "r1").await;
        assert!(harness.store.is_empty());
        assert_eq!(harness.service.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn suggestion_created_by_another_path_discards_the_fire() {
        let mut harness = harness(50.0, vec![Ok(Some(candidate()))]);

        harness.scheduler.schedule(&alice());
        // A manual fetch wins the race while the timer is waiting.
        let manual = harness.store.upsert_pending("r1", candidate()).unwrap();

        wait_for_fire(&harness.scheduler, "r1").await;
        assert_eq!(harness.store.get("r1").unwrap().id, manual.id);
        assert_eq!(harness.service.calls(), 0);
        assert!(harness.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_emits_error_and_never_retries() {
        let mut harness =
            harness(50.0, vec![Err(SuggestError::Transport("connection refused".to_string()))]);

        harness.scheduler.schedule(&alice());
        let event = harness.events.recv().await.expect("event should arrive");
        assert!(matches!(event, SuggestionEvent::Error { .. }));

        wait_for_fire(&harness.scheduler, "r1").await;
        assert!(harness.store.is_empty());
        assert_eq!(harness.service.calls(), 1);
        // No automatic retry: the timer is gone and nothing re-arms it.
        assert!(!harness.scheduler.is_scheduled("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_candidates_emits_informational_error_event() {
        let mut harness = harness(50.0, vec![Ok(None)]);

        harness.scheduler.schedule(&alice());
        let event = harness.events.recv().await.expect("event should arrive");
        assert!(matches!(event, SuggestionEvent::Error { .. }));

        wait_for_fire(&harness.scheduler, "r1").await;
        assert!(harness.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_removes_a_single_timer() {
        let harness = harness(50.0, vec![Ok(Some(candidate()))]);

        harness.scheduler.schedule(&alice());
        harness.scheduler.cancel("r1");
        assert!(!harness.scheduler.is_scheduled("r1"));

        // Give the aborted task time it will never use.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(harness.store.is_empty());
        assert_eq!(harness.service.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_every_armed_timer() {
        let bob = RecipientProfile::new("r2", "Bob");
        let harness = harness(50.0, vec![Ok(Some(candidate())), Ok(Some(candidate()))]);

        harness.scheduler.schedule(&alice());
        harness.scheduler.schedule(&bob);
        assert_eq!(harness.scheduler.scheduled_recipients().len(), 2);

        harness.scheduler.cancel_all();
        assert!(harness.scheduler.scheduled_recipients().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(harness.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_fire_cleanup_leaves_a_superseding_entry_in_place() {
        // A finished fire task must only remove the entry it armed. If a
        // superseding schedule replaced the entry first, the newer timer's
        // marker stays.
        let entries = Mutex::new(HashMap::new());
        entries.lock().expect("entries lock").insert(
            "r1".to_string(),
            SchedulerEntry { handle: tokio::spawn(async {}), generation: 2 },
        );

        clear_entry(&entries, "r1", 1);
        assert!(entries.lock().expect("entries lock").contains_key("r1"));

        clear_entry(&entries, "r1", 2);
        assert!(!entries.lock().expect("entries lock").contains_key("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_drops_schedule_state_but_not_suggestions() {
        let harness = harness(50.0, vec![Ok(Some(candidate()))]);
        harness.store.upsert_pending("r9", candidate()).unwrap();

        harness.scheduler.schedule(&alice());
        harness.scheduler.reset();

        assert!(harness.scheduler.scheduled_recipients().is_empty());
        assert_eq!(harness.store.len(), 1);
    }
}
