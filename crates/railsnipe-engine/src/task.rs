// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reservation task.
//!
//! One task drives one [`ReservationRequest`] through
//! PENDING -> RUNNING -> {SUCCESS, FAILED, CANCELLED}. While running it
//! repeats SEARCH, SELECT, ATTEMPT and, on failure, CLASSIFY and WAIT. The
//! classification is handed to the [`RetryPolicy`]; the task only carries
//! out its decision.
//!
//! Cancellation is checked at the top of every cycle and aborts SEARCH and
//! WAIT immediately. A reserve or pay call already in flight is allowed to
//! finish (bounded by the per-call timeout) so that no booking is made
//! without the task seeing it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use railsnipe_core::{
    BookingResult, ErrorClass, PaymentMethods, ProgressKind, RawRecord, ReservationRequest,
    SeatClass, SeatPolicy, SessionHandle, SessionKey, TaskError, TaskState, TaskStatus,
    TrainOption, UpstreamClient, UpstreamError,
};
use railsnipe_session::SessionManager;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broadcast::ProgressPublisher;
use crate::resolver;
use crate::scheduler::{Decision, Resume, RetryPolicy, RetryState};

/// Collaborators shared by every task of a supervisor.
pub struct TaskDeps {
    pub upstream: Arc<dyn UpstreamClient>,
    pub sessions: Arc<SessionManager>,
    pub payments: Arc<dyn PaymentMethods>,
    pub policy: RetryPolicy,
    /// Bound on a single upstream call.
    pub call_timeout: Duration,
}

/// The train and seat class chosen by SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub train: TrainOption,
    pub class: SeatClass,
}

/// SELECT: the first candidate, in priority order, with an open seat class
/// allowed by the policy and a departure inside the requested window.
pub fn select(request: &ReservationRequest, listing: &[TrainOption]) -> Option<Selection> {
    request.candidates.iter().find_map(|candidate| {
        let train = listing
            .iter()
            .find(|t| t.train_no == *candidate && request.criteria.window_contains(t.dep_time))?;
        request
            .seat_policy
            .classes()
            .iter()
            .find(|class| train.has_open(**class))
            .map(|class| Selection {
                train: train.clone(),
                class: *class,
            })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Search,
    Attempt,
}

/// A classified failure of one step.
struct Failure {
    error: UpstreamError,
    /// The handle the failing call was made with, if it got that far.
    handle: Option<Arc<SessionHandle>>,
    during_login: bool,
}

impl Failure {
    fn call(error: UpstreamError, handle: Arc<SessionHandle>) -> Self {
        Self {
            error,
            handle: Some(handle),
            during_login: false,
        }
    }

    fn login(error: UpstreamError) -> Self {
        Self {
            error,
            handle: None,
            during_login: true,
        }
    }

    fn no_seat(message: impl Into<String>, handle: Option<Arc<SessionHandle>>) -> Self {
        Self {
            error: UpstreamError::new(ErrorClass::NoSeat, message),
            handle,
            during_login: false,
        }
    }
}

enum StepOutcome {
    Listed(Vec<TrainOption>),
    Reserved {
        handle: Arc<SessionHandle>,
        record: RawRecord,
        selection: Selection,
    },
    Failed(Failure),
    Cancelled,
}

/// Runs `call` with the per-call timeout; running out counts as a network failure.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, UpstreamError>>,
) -> Result<T, UpstreamError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::transient(format!(
            "upstream call timed out after {}s",
            limit.as_secs_f64()
        ))),
    }
}

pub struct ReservationTask {
    request: ReservationRequest,
    key: SessionKey,
    deps: Arc<TaskDeps>,
    progress: ProgressPublisher,
    cancel: CancellationToken,
    rng: StdRng,
    retry: RetryState,
}

impl ReservationTask {
    pub fn new(
        request: ReservationRequest,
        deps: Arc<TaskDeps>,
        progress: ProgressPublisher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            key: request.session_key(),
            request,
            deps,
            progress,
            cancel,
            rng: StdRng::from_entropy(),
            retry: RetryState::default(),
        }
    }

    /// Drives the task to a terminal state and returns it.
    #[instrument(skip_all, fields(task_id = %self.progress.state().task_id, provider = %self.request.provider))]
    pub async fn run(mut self) -> TaskState {
        if self.cancel.is_cancelled() {
            self.progress
                .transition(
                    TaskStatus::Cancelled,
                    ProgressKind::Update,
                    "cancelled before start",
                    None,
                )
                .await;
            return self.progress.into_state();
        }
        self.progress
            .transition(TaskStatus::Running, ProgressKind::Update, "started", None)
            .await;

        if let Err(reason) = self.request.validate() {
            return self.fail(TaskError::validation(reason)).await;
        }

        let mut step = Step::Search;
        let mut selection: Option<Selection> = None;
        loop {
            if self.cancel.is_cancelled() {
                return self.cancelled().await;
            }

            let outcome = match step {
                Step::Search => self.search().await,
                Step::Attempt => self.attempt(selection.as_ref()).await,
            };
            let failure = match outcome {
                StepOutcome::Listed(listing) => {
                    selection = select(&self.request, &listing);
                    step = Step::Attempt;
                    continue;
                }
                StepOutcome::Reserved {
                    handle,
                    record,
                    selection,
                } => return self.succeed(handle, record, selection).await,
                StepOutcome::Cancelled => return self.cancelled().await,
                StepOutcome::Failed(failure) => {
                    if step == Step::Search {
                        // The last pick came from an older listing.
                        selection = None;
                    }
                    failure
                }
            };

            let decision = if failure.during_login {
                self.deps
                    .policy
                    .decide_login_failure(&failure.error, &mut self.retry)
            } else {
                self.deps.policy.decide(&failure.error, &mut self.retry)
            };
            debug!(class = %failure.error.class, ?decision, "classified");

            match decision {
                Decision::Fail(error) => return self.fail(error).await,
                Decision::Reauthenticate => {
                    self.note(&failure, "re-authenticating").await;
                    self.drop_session(failure.handle.as_deref()).await;
                    step = if selection.is_some() {
                        Step::Attempt
                    } else {
                        Step::Search
                    };
                }
                Decision::Wait {
                    pacing,
                    resume,
                    invalidate_session,
                } => {
                    if invalidate_session {
                        self.drop_session(failure.handle.as_deref()).await;
                    }
                    let interval = self.deps.policy.interval(&mut self.rng, pacing);
                    self.note(
                        &failure,
                        &format!("retrying in {:.1}s", interval.as_secs_f64()),
                    )
                    .await;
                    step = match resume {
                        Resume::Attempt if selection.is_some() => Step::Attempt,
                        _ => Step::Search,
                    };

                    let cancel = self.cancel.clone();
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.cancelled().await,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
        }
    }

    /// SEARCH, aborted as soon as the task is cancelled.
    async fn search(&self) -> StepOutcome {
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => StepOutcome::Cancelled,
            outcome = self.search_once() => outcome,
        }
    }

    async fn search_once(&self) -> StepOutcome {
        let handle = match self.session().await {
            Ok(handle) => handle,
            Err(failure) => return StepOutcome::Failed(failure),
        };
        let call = self
            .deps
            .upstream
            .search(&handle, &self.request.criteria);
        match with_timeout(self.deps.call_timeout, call).await {
            Ok(listing) => StepOutcome::Listed(listing),
            Err(error) => StepOutcome::Failed(Failure::call(error, handle)),
        }
    }

    /// ATTEMPT. Counted whether or not SELECT found a seat.
    async fn attempt(&mut self, selection: Option<&Selection>) -> StepOutcome {
        let attempt = self.progress.bump_attempt();
        metrics::counter!(
            "railsnipe_reservation_attempts_total",
            "provider" => self.request.provider.to_string()
        )
        .increment(1);

        let Some(selection) = selection else {
            return StepOutcome::Failed(Failure::no_seat(
                format!(
                    "no open seat on {} (attempt {attempt})",
                    self.request.candidates.join(", ")
                ),
                None,
            ));
        };

        self.progress
            .publish(
                ProgressKind::Progress,
                format!(
                    "attempt {attempt}: reserving {} ({})",
                    selection.train.describe(),
                    selection.class
                ),
                None,
            )
            .await;

        let handle = match self.session().await {
            Ok(handle) => handle,
            Err(failure) => return StepOutcome::Failed(failure),
        };
        let call = self.deps.upstream.reserve(
            &handle,
            &selection.train,
            &self.request.passengers,
            SeatPolicy::only(selection.class),
        );
        match with_timeout(self.deps.call_timeout, call).await {
            Ok(record) if record.is_confirmed() => StepOutcome::Reserved {
                handle,
                record,
                selection: selection.clone(),
            },
            Ok(record) if record.is_waiting() => StepOutcome::Failed(Failure::no_seat(
                format!("waitlisted on {}; still looking for a seat", record.describe()),
                Some(handle),
            )),
            Ok(record) => StepOutcome::Failed(Failure::no_seat(
                format!("reservation held without seats: {}", record.describe()),
                Some(handle),
            )),
            Err(error) => StepOutcome::Failed(Failure::call(error, handle)),
        }
    }

    async fn session(&self) -> Result<Arc<SessionHandle>, Failure> {
        self.deps
            .sessions
            .acquire(&self.key)
            .await
            .map_err(|e| Failure::login(e.to_upstream()))
    }

    async fn drop_session(&self, handle: Option<&SessionHandle>) {
        let Some(handle) = handle else {
            return;
        };
        if let Err(e) = self.deps.sessions.invalidate_handle(handle).await {
            warn!(error = %e, "failed to invalidate session");
        }
    }

    /// Records a classified failure as the latest error.
    async fn note(&mut self, failure: &Failure, next: &str) {
        let kind = if failure.error.class == ErrorClass::NoSeat {
            ProgressKind::Progress
        } else {
            ProgressKind::Error
        };
        self.progress
            .publish(
                kind,
                format!("{}; {next}", failure.error.message),
                Some(TaskError::from(&failure.error)),
            )
            .await;
    }

    async fn succeed(
        mut self,
        handle: Arc<SessionHandle>,
        record: RawRecord,
        selection: Selection,
    ) -> TaskState {
        let mut result = BookingResult {
            record_ref: resolver::derive_ref(&record),
            summary: record.describe(),
            seats: record.seats().iter().map(ToString::to_string).collect(),
            paid: record.is_paid(),
            payment_error: None,
            train: selection.train,
            seat_class: selection.class,
        };
        info!(record_ref = %result.record_ref, summary = %result.summary, "reserved");
        metrics::counter!(
            "railsnipe_reservations_total",
            "provider" => self.request.provider.to_string()
        )
        .increment(1);

        if self.request.auto_payment && !result.paid {
            if self.cancel.is_cancelled() {
                result.payment_error = Some("payment skipped: task was cancelled".to_string());
            } else {
                self.progress
                    .publish(ProgressKind::Update, "reserved; paying", None)
                    .await;
                match self.pay(&handle, &record).await {
                    Ok(()) => result.paid = true,
                    Err(message) => {
                        warn!(error = %message, "automatic payment failed; reservation kept");
                        result.payment_error = Some(message);
                    }
                }
            }
        }

        let message = format!("reserved {}", result.summary);
        self.progress.set_result(result);
        self.progress
            .transition(TaskStatus::Success, ProgressKind::Success, message, None)
            .await;
        self.progress.into_state()
    }

    async fn pay(&self, handle: &SessionHandle, record: &RawRecord) -> Result<(), String> {
        let card = match self
            .deps
            .payments
            .card_for(&self.request.user, self.request.provider)
            .await
        {
            Ok(Some(card)) => card,
            Ok(None) => return Err("no payment card stored".to_string()),
            Err(e) => return Err(format!("card lookup failed: {e}")),
        };
        let call = self.deps.upstream.pay(handle, record, &card);
        with_timeout(self.deps.call_timeout, call)
            .await
            .map_err(|e| e.message)
    }

    async fn fail(mut self, error: TaskError) -> TaskState {
        let message = if error.message.trim().is_empty() {
            error.kind.to_string()
        } else {
            error.message.clone()
        };
        let error = TaskError::new(error.kind, message.clone());
        warn!(kind = %error.kind, error = %error.message, "task failed");
        self.progress
            .transition(TaskStatus::Failed, ProgressKind::Failed, message, Some(error))
            .await;
        self.progress.into_state()
    }

    async fn cancelled(mut self) -> TaskState {
        info!(attempts = self.progress.state().attempt_count, "task cancelled");
        self.progress
            .transition(TaskStatus::Cancelled, ProgressKind::Update, "cancelled", None)
            .await;
        self.progress.into_state()
    }
}
