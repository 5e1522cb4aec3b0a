use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::error::{ReorganizeError, StartError};
use crate::core::events::JobEvent;
use crate::core::model::*;
use crate::core::source::ProgressSource;
use crate::plugins::local::reorganizer::Reorganizer;
use crate::plugins::remote::client::BackendClient;
use crate::plugins::remote::poller::RemotePoller;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    /// Pause between files in a local run, so the host stays responsive.
    pub yield_between_files: Duration,
    /// Replaces the per-kind deadline when set.
    pub deadline_override: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(5),
            yield_between_files: Duration::from_millis(5),
            deadline_override: None,
        }
    }
}

/// Drives one job from start to its single outcome.
///
/// Remote kinds are submitted and then polled; the local kind runs on the
/// shared [`Reorganizer`]. Either way every snapshot is forwarded to
/// subscribers until the first terminal one, the deadline, or `cancel()`,
/// whichever comes first. A coordinator runs at most one job.
#[derive(Clone)]
pub struct JobCoordinator {
    id: JobId,
    backend: BackendClient,
    reorganizer: Arc<Reorganizer>,
    config: CoordinatorConfig,
    started: Arc<AtomicBool>,
    state_tx: Arc<watch::Sender<JobState>>,
    event_tx: broadcast::Sender<JobEvent>,
    cancel: CancellationToken,
}

impl JobCoordinator {
    pub fn new(backend: BackendClient, reorganizer: Arc<Reorganizer>, config: CoordinatorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (state_tx, _) = watch::channel(JobState::Idle);
        Self {
            id: Uuid::new_v4(),
            backend,
            reorganizer,
            config,
            started: Arc::new(AtomicBool::new(false)),
            state_tx: Arc::new(state_tx),
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Starts the job. Only the first call on a coordinator can succeed.
    ///
    /// A backend rejection or an unusable source folder finishes the job as
    /// `Failed` without it ever running. A busy reorganizer leaves the
    /// coordinator `Idle`.
    pub async fn start(&self, request: JobRequest) -> Result<(), StartError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(StartError::AlreadyStarted);
        }
        let kind = request.kind();
        let deadline = self.config.deadline_override.unwrap_or_else(|| kind.deadline());

        if let JobRequest::Reorganize(params) = request {
            let run = match self.reorganizer.try_start(
                params,
                self.cancel.child_token(),
                self.config.yield_between_files,
            ) {
                Ok(run) => run,
                Err(ReorganizeError::Busy) => {
                    warn!(job_id = %self.id, "reorganizer busy, job not started");
                    self.started.store(false, Ordering::Release);
                    return Err(ReorganizeError::Busy.into());
                }
                Err(e) => {
                    warn!(job_id = %self.id, error = %e, "reorganization refused");
                    self.finish(JobOutcome::Failed { reason: e.to_string(), report: JobReport::default() });
                    return Err(e.into());
                }
            };
            self.launch(kind, Box::new(run), deadline);
            return Ok(());
        }

        let accepted = match self.backend.submit(&request).await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(job_id = %self.id, %kind, error = %e, "submission failed");
                self.finish(JobOutcome::Failed { reason: e.to_string(), report: JobReport::default() });
                return Err(e.into());
            }
        };

        if kind.is_polled() {
            let poller = RemotePoller::new(self.backend.clone(), self.config.poll_interval, self.config.fetch_timeout);
            self.launch(kind, Box::new(poller), deadline);
        } else {
            // the acknowledgement already is the result
            self.mark_running(kind);
            self.finish(JobOutcome::Succeeded(JobReport::from_stats(JobStats::Backend(accepted.body))));
        }
        Ok(())
    }

    /// Requests cancellation of a running job; returns whether it was running.
    /// Local work stops at the next file boundary. Remote work is only no
    /// longer observed: the backend has no cancel endpoint.
    pub fn cancel(&self) -> bool {
        let running = matches!(*self.state_tx.borrow(), JobState::Running);
        if running {
            info!(job_id = %self.id, "cancel requested");
            self.cancel.cancel();
        }
        running
    }

    /// Resolves to the job's outcome. Never resolves for a job that is not
    /// started.
    pub async fn wait(&self) -> JobOutcome {
        let mut rx = self.state_tx.subscribe();
        let outcome = match rx.wait_for(JobState::is_terminal).await {
            Ok(state) => state.outcome().cloned(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| JobOutcome::Failed {
            reason: "coordinator dropped".to_string(),
            report: JobReport::default(),
        })
    }

    fn launch(&self, kind: JobKind, source: Box<dyn ProgressSource>, deadline: Duration) {
        self.mark_running(kind);
        info!(job_id = %self.id, %kind, source = source.name(), deadline_secs = deadline.as_secs_f64(), "job running");
        let this = self.clone();
        tokio::spawn(async move {
            this.drive(source, deadline).await;
        });
    }

    fn mark_running(&self, kind: JobKind) {
        if self.transition(JobState::Running) {
            let _ = self.event_tx.send(JobEvent::Started { job_id: self.id, kind });
        }
    }

    /// Races the source against the deadline and cancellation. The loop is the
    /// only forwarder, so nothing is forwarded after it breaks.
    async fn drive(&self, mut source: Box<dyn ProgressSource>, deadline: Duration) {
        let timer = tokio::time::sleep(deadline);
        tokio::pin!(timer);
        let mut report = JobReport::default();

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    if let Some(last) = source.stop().await {
                        report.absorb(&last);
                    }
                    break JobOutcome::Cancelled(report);
                }
                _ = &mut timer => {
                    warn!(job_id = %self.id, "deadline passed, no longer observing");
                    if let Some(last) = source.stop().await {
                        report.absorb(&last);
                    }
                    break JobOutcome::TimedOut(report);
                }
                next = source.next_snapshot() => {
                    let Some(snapshot) = next else {
                        break JobOutcome::Failed {
                            reason: format!("{} ended without a final status", source.name()),
                            report,
                        };
                    };
                    report.absorb(&snapshot);
                    let completion = snapshot.completion();
                    let _ = self.event_tx.send(JobEvent::Progress { job_id: self.id, snapshot });
                    match completion {
                        Completion::Pending => {}
                        Completion::Succeeded => break JobOutcome::Succeeded(report),
                        Completion::Failed(reason) => break JobOutcome::Failed { reason, report },
                    }
                }
            }
        };

        if !matches!(outcome, JobOutcome::Cancelled(_) | JobOutcome::TimedOut(_)) {
            // the producer must be released before the outcome is published
            source.stop().await;
        }
        self.finish(outcome);
    }

    fn finish(&self, outcome: JobOutcome) {
        let label = outcome.label();
        if self.transition(JobState::Finished(outcome.clone())) {
            info!(job_id = %self.id, outcome = label, "job finished");
            let _ = self.event_tx.send(JobEvent::Finished { job_id: self.id, outcome });
        }
    }

    fn transition(&self, next: JobState) -> bool {
        self.state_tx.send_if_modified(move |current| {
            if current.admits(&next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    #[cfg(test)]
    fn attach(&self, kind: JobKind, source: Box<dyn ProgressSource>, deadline: Duration) {
        self.started.store(true, Ordering::Release);
        self.launch(kind, source, deadline);
    }
}
