//! the top-level loop: keeps a bounded number of attempts in flight and
//! reacts to their outcomes
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::auth::{Authenticator, CredentialStore};
use crate::classifier::SuccessCriteria;
use crate::error::SiegelineError;
use crate::executor::{AttemptExecutor, TargetConfig};
use crate::generator::{Attempt, CombinationStream};
use crate::params::ParameterSpace;
use crate::responses::{AttemptResult, Outcome};
use crate::sink::{NullSink, ResultSink, SuccessRecord};
use crate::statistics::Statistics;
use crate::{atomic_load, atomic_store};

/// what a completed run hands back
#[derive(Debug)]
pub struct RunSummary {
    /// every success recorded before cancellation, in confirmation order
    pub successes: Vec<SuccessRecord>,

    /// the run's counters
    pub statistics: Statistics,
}

impl RunSummary {
    /// true when at least one combination succeeded
    #[must_use]
    pub fn found_any(&self) -> bool {
        !self.successes.is_empty()
    }
}

/// drives the whole attack: pulls combinations, keeps exactly `concurrency`
/// attempts in flight, classifies outcomes, requeues transient failures,
/// rotates credentials, and enforces the stop conditions
///
/// built via [`Scheduler::new`]; consumed by [`Scheduler::run`]
///
/// # Examples
///
/// ```no_run
/// # use siegeline::classifier::SuccessCriteria;
/// # use siegeline::corpora::Wordlist;
/// # use siegeline::executor::TargetConfig;
/// # use siegeline::params::ParameterSpace;
/// # use siegeline::scheduler::Scheduler;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # tokio_test::block_on(async {
/// let space = ParameterSpace::new()
///     .field(Wordlist::from_file("users.txt")?.name("username").build())
///     .field(Wordlist::from_file("passes.txt")?.name("password").build())
///     .zip_fields(["username", "password"])
///     .build()?;
///
/// let scheduler = Scheduler::new()
///     .target(TargetConfig::new("https://example.com/login")?)
///     .parameters(space)
///     .criteria(SuccessCriteria::new().include_text("Welcome"))
///     .concurrency(10)
///     .stop_on_success()
///     .build()?;
///
/// let summary = scheduler.run().await?;
///
/// for record in &summary.successes {
///     println!("{}", record.payload);
/// }
/// # Result::<(), Box<dyn std::error::Error>>::Ok(())
/// # })?;
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    generator: CombinationStream,

    /// one executor per worker slot; an attempt lands in slot
    /// `id % concurrency` and reuses that slot's connections
    slots: Vec<AttemptExecutor>,

    criteria: SuccessCriteria,
    authenticator: Option<Authenticator>,
    store: Option<CredentialStore>,
    sink: Box<dyn ResultSink>,
    statistics: Statistics,

    cancelled: Arc<AtomicBool>,

    concurrency: usize,
    max_attempts: u64,
    stop_on_success: bool,
    max_requeue: usize,
    reauth_threshold: usize,
}

impl Scheduler {
    /// create a new [`SchedulerBuilder`]
    ///
    /// mandatory build methods:
    /// - [`SchedulerBuilder::target`]
    /// - [`SchedulerBuilder::parameters`]
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> SchedulerBuilder<NoTarget, NoParameters> {
        SchedulerBuilder::default()
    }

    /// a handle for cooperative cancellation from outside the run, i.e. a
    /// ctrl-c handler in the embedding binary
    ///
    /// setting the flag stops new dispatches and discards outcomes that are
    /// still in flight; already-sent requests are not forcibly aborted
    #[must_use]
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// drive the run to completion
    ///
    /// termination: the attempt budget is exhausted, or the combination
    /// stream runs dry, or the cancellation flag is set -- in every case only
    /// once no attempts remain in flight
    ///
    /// # Errors
    ///
    /// returns an error when the initial login exchange fails (before any
    /// attempt is dispatched) or when a runtime credential rotation fails
    /// (after in-flight attempts drain)
    #[instrument(skip_all, fields(%self.concurrency, %self.max_attempts), name = "attack-loop", level = "trace")]
    pub async fn run(mut self) -> Result<RunSummary, SiegelineError> {
        self.statistics.mark_start();

        // the initial login happens before any attempt is dispatched; failure
        // here aborts the whole run
        if let (Some(authenticator), Some(store)) = (self.authenticator.as_mut(), self.store.as_ref()) {
            info!("performing initial authentication");
            authenticator.authenticate(store).await?;
        }

        // each in-flight attempt posts exactly one outcome here; capacity
        // equals the concurrency bound so sends never block
        let (outcomes, mut completed) = mpsc::channel::<Outcome>(self.concurrency);

        let mut in_flight: usize = 0;
        let mut dispatched: u64 = 0;
        let mut consecutive_failures: usize = 0;
        let mut requeue_ledger: HashMap<String, usize> = HashMap::new();
        let mut successes: Vec<SuccessRecord> = Vec::new();
        let mut rotation_failure: Option<SiegelineError> = None;

        info!("starting attack run");

        // initial fill
        while in_flight < self.concurrency && self.within_attempt_budget(dispatched) {
            let Some(attempt) = self.generator.next_attempt() else {
                break;
            };

            self.dispatch(attempt, &outcomes);
            in_flight += 1;
            dispatched += 1;
        }

        while in_flight > 0 {
            let Some(outcome) = completed.recv().await else {
                // we hold a sender, so the channel can't close; nothing to do
                // but stop cleanly if it somehow does
                break;
            };

            in_flight -= 1;

            if atomic_load!(self.cancelled) {
                // outcomes that arrive after cancellation are discarded with
                // no side effects, and freed slots are not re-armed
                continue;
            }

            let Outcome {
                attempt,
                elapsed,
                result,
            } = outcome;

            match result {
                AttemptResult::Transport { kind, message } => {
                    self.statistics.update_from_error(kind);

                    warn!(id = %attempt.id, payload = %attempt.payload, %message, "request error");

                    let count = requeue_ledger
                        .entry(attempt.payload.fingerprint())
                        .and_modify(|count| *count += 1)
                        .or_insert(1);

                    if self.max_requeue == 0 || *count <= self.max_requeue {
                        debug!(
                            id = %attempt.id,
                            retry = *count,
                            "re-submitting payload after transport error"
                        );

                        self.statistics.increment_requeues();

                        // the requeue keeps its id and payload, occupies an
                        // ordinary slot, and doesn't count against the
                        // attempt budget
                        self.dispatch(attempt, &outcomes);
                        in_flight += 1;
                    } else {
                        warn!(
                            payload = %attempt.payload,
                            "requeue budget exhausted; payload will not be tried again"
                        );

                        self.statistics.increment_abandoned();
                        self.statistics.increment_failures();
                    }
                }
                AttemptResult::Response(response) => {
                    self.statistics.update_from_status(response.status_code());

                    if self.criteria.classify(&response, elapsed) {
                        consecutive_failures = 0;

                        let record = SuccessRecord {
                            payload: attempt.payload,
                            status: response.status_code(),
                            elapsed,
                            body_length: response.content_length(),
                        };

                        info!(
                            payload = %record.payload,
                            status = record.status,
                            length = record.body_length,
                            "SUCCESS"
                        );

                        self.statistics.increment_successes();

                        if let Err(sink_error) = self.sink.record(&record) {
                            // the record survives in the summary either way
                            warn!(%sink_error, "could not persist success record");
                        }

                        successes.push(record);

                        if self.stop_on_success {
                            atomic_store!(self.cancelled, true);
                        }
                    } else {
                        self.statistics.increment_failures();
                        consecutive_failures += 1;

                        debug!(
                            id = %attempt.id,
                            payload = %attempt.payload,
                            status = response.status_code(),
                            "failed attempt"
                        );

                        if self.reauth_threshold > 0
                            && consecutive_failures >= self.reauth_threshold
                        {
                            if let (Some(authenticator), Some(store)) =
                                (self.authenticator.as_mut(), self.store.as_ref())
                            {
                                info!(
                                    %consecutive_failures,
                                    "failure threshold reached; rotating credential"
                                );

                                // dispatch is blocked until the exchange
                                // completes; at most one rotation runs at a time
                                match authenticator.authenticate(store).await {
                                    Ok(()) => {
                                        self.statistics.increment_rotations();
                                        consecutive_failures = 0;
                                    }
                                    Err(auth_error) => {
                                        error!(
                                            %auth_error,
                                            "credential rotation failed; cancelling the run"
                                        );

                                        atomic_store!(self.cancelled, true);
                                        rotation_failure = Some(auth_error);
                                    }
                                }
                            }
                        }
                    }
                }
            }

            // re-arm the freed slot
            if !atomic_load!(self.cancelled) && self.within_attempt_budget(dispatched) {
                if let Some(attempt) = self.generator.next_attempt() {
                    self.dispatch(attempt, &outcomes);
                    in_flight += 1;
                    dispatched += 1;
                }
            }
        }

        self.statistics.finalize();

        if let Some(auth_error) = rotation_failure {
            return Err(SiegelineError::RotationFailed {
                source: Box::new(auth_error),
            });
        }

        info!(statistics = %self.statistics, "attack run complete");

        Ok(RunSummary {
            successes,
            statistics: self.statistics,
        })
    }

    /// original dispatches count against `max_attempts`; 0 means unlimited
    const fn within_attempt_budget(&self, dispatched: u64) -> bool {
        self.max_attempts == 0 || dispatched < self.max_attempts
    }

    /// hand an attempt to its worker slot
    ///
    /// the credential snapshot is captured here, at dispatch time; an attempt
    /// that straddles a rotation keeps the snapshot it left with
    fn dispatch(&mut self, attempt: Attempt, outcomes: &mpsc::Sender<Outcome>) {
        let slot = usize::try_from(attempt.id.get() % self.slots.len() as u64)
            .expect("slot index fits in usize by construction");

        let executor = self.slots[slot].clone();
        let snapshot = self.store.as_ref().map(CredentialStore::snapshot);
        let outcomes = outcomes.clone();

        debug!(id = %attempt.id, payload = %attempt.payload, slot, "dispatching attempt");

        self.statistics.increment_requests();

        tokio::spawn(async move {
            let outcome = executor.send(attempt, snapshot).await;

            // a send failure means the run is already over and the outcome is
            // of no interest to anyone
            let _ = outcomes.send(outcome).await;
        });
    }
}

// typestate information for the scheduler builder; not useful for anything else
pub trait SchedulerBuildState {}

/// no target configured yet
pub struct NoTarget;

/// the target has been configured
pub struct HasTarget;

/// no parameter space configured yet
pub struct NoParameters;

/// the parameter space has been configured
pub struct HasParameters;

impl SchedulerBuildState for NoTarget {}
impl SchedulerBuildState for HasTarget {}
impl SchedulerBuildState for NoParameters {}
impl SchedulerBuildState for HasParameters {}

/// create a new [`SchedulerBuilder`] that, when finalized with
/// [`SchedulerBuilder::build`], will create a [`Scheduler`]
///
/// mandatory build methods:
/// - [`SchedulerBuilder::target`]
/// - [`SchedulerBuilder::parameters`]
///
/// optional build methods:
/// - [`SchedulerBuilder::criteria`]
/// - [`SchedulerBuilder::authenticator`]
/// - [`SchedulerBuilder::sink`]
/// - [`SchedulerBuilder::concurrency`]
/// - [`SchedulerBuilder::max_attempts`]
/// - [`SchedulerBuilder::stop_on_success`]
/// - [`SchedulerBuilder::max_requeue`]
/// - [`SchedulerBuilder::reauth_threshold`]
pub struct SchedulerBuilder<TS, PS>
where
    TS: SchedulerBuildState,
    PS: SchedulerBuildState,
{
    target: Option<TargetConfig>,
    space: Option<ParameterSpace>,
    criteria: SuccessCriteria,
    authenticator: Option<Authenticator>,
    sink: Option<Box<dyn ResultSink>>,
    concurrency: usize,
    max_attempts: u64,
    stop_on_success: bool,
    max_requeue: usize,
    reauth_threshold: usize,

    _target_state: PhantomData<TS>,
    _parameters_state: PhantomData<PS>,
}

impl Default for SchedulerBuilder<NoTarget, NoParameters> {
    fn default() -> Self {
        Self {
            target: None,
            space: None,
            criteria: SuccessCriteria::new(),
            authenticator: None,
            sink: None,
            concurrency: 10,
            max_attempts: 0,
            stop_on_success: false,
            max_requeue: 5,
            reauth_threshold: 0,
            _target_state: PhantomData,
            _parameters_state: PhantomData,
        }
    }
}

impl<PS> SchedulerBuilder<NoTarget, PS>
where
    PS: SchedulerBuildState,
{
    /// set the target every attempt is sent against
    pub fn target(self, target: TargetConfig) -> SchedulerBuilder<HasTarget, PS> {
        SchedulerBuilder {
            target: Some(target),
            space: self.space,
            criteria: self.criteria,
            authenticator: self.authenticator,
            sink: self.sink,
            concurrency: self.concurrency,
            max_attempts: self.max_attempts,
            stop_on_success: self.stop_on_success,
            max_requeue: self.max_requeue,
            reauth_threshold: self.reauth_threshold,
            _target_state: PhantomData,
            _parameters_state: PhantomData,
        }
    }
}

impl<TS> SchedulerBuilder<TS, NoParameters>
where
    TS: SchedulerBuildState,
{
    /// set the parameter space whose combinations are attempted
    pub fn parameters(self, space: ParameterSpace) -> SchedulerBuilder<TS, HasParameters> {
        SchedulerBuilder {
            target: self.target,
            space: Some(space),
            criteria: self.criteria,
            authenticator: self.authenticator,
            sink: self.sink,
            concurrency: self.concurrency,
            max_attempts: self.max_attempts,
            stop_on_success: self.stop_on_success,
            max_requeue: self.max_requeue,
            reauth_threshold: self.reauth_threshold,
            _target_state: PhantomData,
            _parameters_state: PhantomData,
        }
    }
}

impl<TS, PS> SchedulerBuilder<TS, PS>
where
    TS: SchedulerBuildState,
    PS: SchedulerBuildState,
{
    /// set the success criteria; with none configured every response is a
    /// failure
    #[must_use]
    pub fn criteria(mut self, criteria: SuccessCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// enable credential rotation through the given authenticator
    ///
    /// an initial login is performed before any attempt is dispatched
    #[must_use]
    pub fn authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// send confirmed successes to the given sink as they happen
    #[must_use]
    pub fn sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// number of worker slots, i.e. the bound on in-flight attempts
    /// (default: 10)
    #[must_use]
    pub const fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// stop after this many original dispatches; 0 means unlimited
    /// (default: 0)
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// stop the run at the first confirmed success
    #[must_use]
    pub const fn stop_on_success(mut self) -> Self {
        self.stop_on_success = true;
        self
    }

    /// per-payload budget for transport-error resubmissions; 0 means
    /// unlimited (default: 5)
    #[must_use]
    pub const fn max_requeue(mut self, max_requeue: usize) -> Self {
        self.max_requeue = max_requeue;
        self
    }

    /// rotate the credential after this many consecutive classified
    /// failures; 0 disables rotation (default: 0)
    #[must_use]
    pub const fn reauth_threshold(mut self, threshold: usize) -> Self {
        self.reauth_threshold = threshold;
        self
    }
}

impl SchedulerBuilder<HasTarget, HasParameters> {
    /// finalize the scheduler
    ///
    /// # Errors
    ///
    /// returns an error when a worker slot's http client can't be built
    pub fn build(self) -> Result<Scheduler, SiegelineError> {
        let target = self.target.unwrap(); // mandatory, can't get here without it being set
        let space = self.space.unwrap();

        // a pool needs at least one slot
        let concurrency = self.concurrency.max(1);

        let slots = (0..concurrency)
            .map(|_| AttemptExecutor::new(target.clone()))
            .collect::<Result<Vec<AttemptExecutor>, SiegelineError>>()?;

        if self.authenticator.is_some() && target.credential_placement().is_none() {
            warn!(
                "an authenticator is configured but the target has no credential placement; \
                 rotated credentials will never be sent"
            );
        }

        let store = self.authenticator.is_some().then(CredentialStore::new);

        Ok(Scheduler {
            generator: CombinationStream::new(space),
            slots,
            criteria: self.criteria,
            authenticator: self.authenticator,
            store,
            sink: self.sink.unwrap_or_else(|| Box::new(NullSink)),
            statistics: Statistics::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            concurrency,
            max_attempts: self.max_attempts,
            stop_on_success: self.stop_on_success,
            max_requeue: self.max_requeue,
            reauth_threshold: self.reauth_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, CredentialPlacement};
    use crate::corpora::Wordlist;
    use crate::sink::JsonLinesSink;
    use httpmock::prelude::*;
    use std::time::{Duration, Instant};

    fn single_field_space(name: &str, words: &[&str]) -> ParameterSpace {
        ParameterSpace::new()
            .field(Wordlist::with_words(words.to_vec()).name(name).build())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn finds_the_matching_combination_and_records_it() {
        let server = MockServer::start_async().await;
        let hit = server
            .mock_async(|when, then| {
                when.method(POST).path("/login").body_contains("pin=10");
                then.status(200).body("Welcome");
            })
            .await;
        // everything else falls through to the mock server's implicit 404

        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("found.jsonl");

        let space = ParameterSpace::new()
            .declare("pin=generate:01:2")
            .build()
            .unwrap();

        let scheduler = Scheduler::new()
            .target(TargetConfig::new(&server.url("/login")).unwrap())
            .parameters(space)
            .criteria(SuccessCriteria::new().status_code(200))
            .sink(Box::new(JsonLinesSink::append(&out_path).unwrap()))
            .concurrency(2)
            .build()
            .unwrap();

        let summary = scheduler.run().await.unwrap();

        hit.assert_async().await;

        assert_eq!(summary.successes.len(), 1);
        assert!(summary.found_any());
        assert_eq!(summary.successes[0].payload.fields()[0].value, "10");
        assert_eq!(summary.statistics.requests(), 4);
        assert_eq!(summary.statistics.successes(), 1);
        assert_eq!(summary.statistics.failures(), 3);

        let written = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains(r#""pin":"10""#));
    }

    #[tokio::test]
    async fn stop_on_success_halts_dispatch() {
        let server = MockServer::start_async().await;
        let hit = server
            .mock_async(|when, then| {
                when.method(POST).path("/login").body_contains("user=a");
                then.status(200).body("Welcome");
            })
            .await;

        let scheduler = Scheduler::new()
            .target(TargetConfig::new(&server.url("/login")).unwrap())
            .parameters(single_field_space("user", &["a", "b", "c", "d"]))
            .criteria(SuccessCriteria::new().include_text("Welcome"))
            .concurrency(1)
            .stop_on_success()
            .build()
            .unwrap();

        let summary = scheduler.run().await.unwrap();

        // the first (and only) dispatched attempt succeeded; nothing was
        // dispatched after the flag went up
        assert_eq!(hit.hits_async().await, 1);
        assert_eq!(summary.statistics.requests(), 1);
        assert_eq!(summary.successes.len(), 1);
    }

    #[tokio::test]
    async fn outcomes_arriving_after_cancellation_are_discarded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/login").body_contains("user=a");
                then.status(200).body("Welcome");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/login").body_contains("user=b");
                then.status(200).body("nope").delay(Duration::from_millis(400));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/login").body_contains("user=c");
                then.status(200).body("nope").delay(Duration::from_millis(400));
            })
            .await;

        let scheduler = Scheduler::new()
            .target(TargetConfig::new(&server.url("/login")).unwrap())
            .parameters(single_field_space("user", &["a", "b", "c"]))
            .criteria(SuccessCriteria::new().include_text("Welcome"))
            .concurrency(3)
            .stop_on_success()
            .build()
            .unwrap();

        let summary = scheduler.run().await.unwrap();

        // all three went out in the initial fill; the slow outcomes landed
        // after cancellation and left no trace
        assert_eq!(summary.statistics.requests(), 3);
        assert_eq!(summary.successes.len(), 1);
        assert_eq!(summary.statistics.failures(), 0);
    }

    #[tokio::test]
    async fn max_attempts_bounds_original_dispatches() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|when, then| {
                when.method(POST).path("/login");
                then.status(403).body("nope");
            })
            .await;

        let scheduler = Scheduler::new()
            .target(TargetConfig::new(&server.url("/login")).unwrap())
            .parameters(single_field_space("user", &["a", "b", "c", "d", "e"]))
            .criteria(SuccessCriteria::new().status_code(200))
            .concurrency(2)
            .max_attempts(3)
            .build()
            .unwrap();

        let summary = scheduler.run().await.unwrap();

        assert_eq!(any.hits_async().await, 3);
        assert_eq!(summary.statistics.requests(), 3);
        assert_eq!(summary.statistics.failures(), 3);
        assert!(!summary.found_any());
    }

    #[tokio::test]
    async fn transport_errors_requeue_until_the_budget_is_exhausted() {
        // nothing listens on port 1; every attempt is a connect error
        let scheduler = Scheduler::new()
            .target(
                TargetConfig::new("http://127.0.0.1:1/login")
                    .unwrap()
                    .timeout(Duration::from_secs(2)),
            )
            .parameters(single_field_space("user", &["only"]))
            .criteria(SuccessCriteria::new().status_code(200))
            .concurrency(1)
            .max_requeue(2)
            .build()
            .unwrap();

        let summary = scheduler.run().await.unwrap();

        // dispatched 3 times total (1 original + 2 requeues), then abandoned
        assert_eq!(summary.statistics.requests(), 3);
        assert_eq!(summary.statistics.requeues(), 2);
        assert_eq!(summary.statistics.abandoned(), 1);
        assert_eq!(summary.statistics.failures(), 1);
        assert!(!summary.found_any());
    }

    #[tokio::test]
    async fn failure_threshold_triggers_exactly_one_rotation() {
        let auth_server = MockServer::start_async().await;
        let login = auth_server
            .mock_async(|when, then| {
                when.method(POST).path("/session");
                then.status(200)
                    .header("set-cookie", "session=rotating-token; Path=/");
            })
            .await;

        let target_server = MockServer::start_async().await;
        let guesses = target_server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/guess")
                    .header("cookie", "session=rotating-token");
                then.status(200).body("Invalid credentials");
            })
            .await;

        let config = AuthConfig::new(&auth_server.url("/session"), "admin", "hunter2").unwrap();

        let scheduler = Scheduler::new()
            .target(
                TargetConfig::new(&target_server.url("/guess"))
                    .unwrap()
                    .credential(CredentialPlacement::Cookie("session".to_string())),
            )
            .parameters(single_field_space("code", &["111", "222", "333"]))
            .criteria(SuccessCriteria::new().include_text("Welcome"))
            .authenticator(Authenticator::new(config).unwrap())
            .concurrency(1)
            .reauth_threshold(3)
            .build()
            .unwrap();

        let summary = scheduler.run().await.unwrap();

        // one initial login plus exactly one rotation at the third failure
        assert_eq!(login.hits_async().await, 2);
        assert_eq!(guesses.hits_async().await, 3);
        assert_eq!(summary.statistics.rotations(), 1);
        assert_eq!(summary.statistics.failures(), 3);
    }

    #[tokio::test]
    async fn success_resets_the_failure_counter() {
        let auth_server = MockServer::start_async().await;
        let login = auth_server
            .mock_async(|when, then| {
                when.method(POST).path("/session");
                then.status(200).header("set-cookie", "session=tok");
            })
            .await;

        let target_server = MockServer::start_async().await;
        target_server
            .mock_async(|when, then| {
                when.method(POST).path("/guess").body_contains("code=ok");
                then.status(200).body("Welcome");
            })
            .await;
        // the other codes fall through to the implicit 404

        let config = AuthConfig::new(&auth_server.url("/session"), "admin", "hunter2").unwrap();

        // two failures, a success, two more failures: the counter never
        // reaches the threshold of three, so only the initial login happens
        let scheduler = Scheduler::new()
            .target(
                TargetConfig::new(&target_server.url("/guess"))
                    .unwrap()
                    .credential(CredentialPlacement::Cookie("session".to_string())),
            )
            .parameters(single_field_space("code", &["x1", "x2", "ok", "x3", "x4"]))
            .criteria(SuccessCriteria::new().include_text("Welcome"))
            .authenticator(Authenticator::new(config).unwrap())
            .concurrency(1)
            .reauth_threshold(3)
            .build()
            .unwrap();

        let summary = scheduler.run().await.unwrap();

        assert_eq!(login.hits_async().await, 1);
        assert_eq!(summary.statistics.rotations(), 0);
        assert_eq!(summary.successes.len(), 1);
        assert_eq!(summary.statistics.failures(), 4);
    }

    #[tokio::test]
    async fn initial_authentication_failure_aborts_before_any_attempt() {
        let auth_server = MockServer::start_async().await;
        auth_server
            .mock_async(|when, then| {
                when.method(POST).path("/session");
                then.status(500);
            })
            .await;

        let target_server = MockServer::start_async().await;
        let guesses = target_server
            .mock_async(|when, then| {
                when.method(POST).path("/guess");
                then.status(200);
            })
            .await;

        let config = AuthConfig::new(&auth_server.url("/session"), "admin", "hunter2").unwrap();

        let scheduler = Scheduler::new()
            .target(TargetConfig::new(&target_server.url("/guess")).unwrap())
            .parameters(single_field_space("code", &["111", "222"]))
            .authenticator(Authenticator::new(config).unwrap())
            .build()
            .unwrap();

        let result = scheduler.run().await;

        assert!(matches!(
            result,
            Err(SiegelineError::AuthRejected { status: 500, .. })
        ));
        assert_eq!(guesses.hits_async().await, 0);
    }

    #[tokio::test]
    async fn rotation_failure_cancels_the_run() {
        let auth_server = MockServer::start_async().await;
        let mut login_ok = auth_server
            .mock_async(|when, then| {
                when.method(POST).path("/session");
                then.status(200).header("set-cookie", "session=tok");
            })
            .await;

        let target_server = MockServer::start_async().await;
        target_server
            .mock_async(|when, then| {
                when.method(POST).path("/guess");
                then.status(200)
                    .body("Invalid credentials")
                    .delay(Duration::from_millis(400));
            })
            .await;

        let config = AuthConfig::new(&auth_server.url("/session"), "admin", "hunter2").unwrap();

        let scheduler = Scheduler::new()
            .target(TargetConfig::new(&target_server.url("/guess")).unwrap())
            .parameters(single_field_space("code", &["111", "222", "333"]))
            .criteria(SuccessCriteria::new().include_text("Welcome"))
            .authenticator(Authenticator::new(config).unwrap())
            .concurrency(1)
            .reauth_threshold(1)
            .build()
            .unwrap();

        let running = tokio::spawn(scheduler.run());

        // the initial login lands immediately; while the first (slow) attempt
        // is in flight, take the login mock away so the rotation triggered by
        // that attempt's failure falls through to the implicit 404
        tokio::time::sleep(Duration::from_millis(200)).await;
        login_ok.delete_async().await;

        let result = running.await.unwrap();

        assert!(matches!(result, Err(SiegelineError::RotationFailed { .. })));
    }

    #[tokio::test]
    async fn in_flight_attempts_never_exceed_the_concurrency_bound() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/login");
                then.status(403).delay(Duration::from_millis(250));
            })
            .await;

        let scheduler = Scheduler::new()
            .target(TargetConfig::new(&server.url("/login")).unwrap())
            .parameters(single_field_space("user", &["a", "b", "c", "d"]))
            .criteria(SuccessCriteria::new().status_code(200))
            .concurrency(2)
            .build()
            .unwrap();

        let wall = Instant::now();
        let summary = scheduler.run().await.unwrap();
        let total = wall.elapsed();

        // 4 requests at 250ms each through 2 slots can't finish in under two
        // batches' worth of wall time
        assert!(total >= Duration::from_millis(500));
        assert_eq!(summary.statistics.requests(), 4);
    }

    #[tokio::test]
    async fn empty_parameter_space_completes_without_dispatching() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|when, then| {
                when.method(POST).path("/login");
                then.status(200);
            })
            .await;

        let scheduler = Scheduler::new()
            .target(TargetConfig::new(&server.url("/login")).unwrap())
            .parameters(single_field_space("user", &[]))
            .build()
            .unwrap();

        let summary = scheduler.run().await.unwrap();

        assert_eq!(any.hits_async().await, 0);
        assert_eq!(summary.statistics.requests(), 0);
        assert!(!summary.found_any());
    }
}
