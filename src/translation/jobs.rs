/*!
 * Async batch job tracking.
 *
 * Poll-based providers accept a whole batch as one server-side job and
 * report its progress through a status endpoint. `JobTracker` folds those
 * reports into a forward-only state machine and `wait_for_completion` polls
 * at a fixed interval under a wall-clock ceiling.
 */

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::{BatchFailure, JobFailure, ProviderError};
use crate::providers::AsyncBatchProvider;

/// Server-side job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Validating,
    InProgress,
    Finalizing,
    Ended,
    Expired,
    Cancelled,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Validating => 1,
            Self::InProgress => 2,
            Self::Finalizing => 3,
            Self::Ended | Self::Expired | Self::Cancelled => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 4
    }

    /// Map a provider status string; unknown values yield `None`
    pub fn from_provider_status(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "submitted" | "queued" => Some(Self::Submitted),
            "validating" => Some(Self::Validating),
            "in_progress" | "running" | "canceling" => Some(Self::InProgress),
            "finalizing" => Some(Self::Finalizing),
            "ended" | "completed" => Some(Self::Ended),
            "expired" => Some(Self::Expired),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Validating => "validating",
            Self::InProgress => "in_progress",
            Self::Finalizing => "finalizing",
            Self::Ended => "ended",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Provider reference to a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    /// Where results can be downloaded, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_url: Option<String>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            results_url: None,
        }
    }
}

/// Forward-only view of one job's state
#[derive(Debug, Clone)]
pub struct JobTracker {
    job_id: String,
    state: JobState,
    history: Vec<JobState>,
}

impl JobTracker {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Submitted,
            history: vec![JobState::Submitted],
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Accepted states in order of arrival
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    /// Fold a reported state in; backwards or post-terminal reports are ignored
    pub fn observe(&mut self, reported: JobState) -> bool {
        if reported == self.state {
            return false;
        }
        if self.state.is_terminal() || reported.rank() < self.state.rank() {
            warn!(
                "Ignoring {} report for job {} already in state {}",
                reported, self.job_id, self.state
            );
            return false;
        }
        debug!("Job {}: {} -> {}", self.job_id, self.state, reported);
        self.state = reported;
        self.history.push(reported);
        true
    }

    /// Terminal state as the outcome of the wait
    pub fn outcome(&self) -> Option<Result<(), JobFailure>> {
        match self.state {
            JobState::Ended => Some(Ok(())),
            JobState::Expired => Some(Err(JobFailure::Expired {
                job_id: self.job_id.clone(),
            })),
            JobState::Cancelled => Some(Err(JobFailure::Cancelled {
                job_id: self.job_id.clone(),
            })),
            _ => None,
        }
    }
}

/// Poll cadence and ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            ceiling: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Poll `handle` until it reaches a terminal state.
///
/// Transient status errors are logged and polled again; fatal and other
/// non-retryable ones end the wait. Exceeding the ceiling yields
/// `JobFailure::PollTimeout`, a fired `cancel` yields `ProviderError::Cancelled`.
pub async fn wait_for_completion(
    provider: &dyn AsyncBatchProvider,
    handle: &JobHandle,
    settings: PollSettings,
    cancel: &CancellationToken,
    mut on_change: impl FnMut(JobState) + Send,
) -> Result<JobTracker, BatchFailure> {
    let started = Instant::now();
    let deadline = started + settings.ceiling;
    let mut tracker = JobTracker::new(handle.job_id.clone());

    let timed_out = || {
        BatchFailure::Job(JobFailure::PollTimeout {
            job_id: handle.job_id.clone(),
            waited_secs: started.elapsed().as_secs(),
        })
    };

    loop {
        // A status call that hangs still counts against the ceiling
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BatchFailure::Provider(ProviderError::Cancelled)),
            result = tokio::time::timeout_at(deadline, provider.poll_status(handle)) => match result {
                Ok(polled) => polled,
                Err(_) => {
                    warn!("Status poll for job {} outlived the {:?} ceiling", handle.job_id, settings.ceiling);
                    return Err(timed_out());
                }
            },
        };
        match polled {
            Ok(state) => {
                if tracker.observe(state) {
                    on_change(state);
                }
            }
            Err(e) if e.is_retryable() => {
                warn!("Polling job {} failed, will poll again: {}", handle.job_id, e);
            }
            Err(e) => return Err(BatchFailure::Provider(e)),
        }

        match tracker.outcome() {
            Some(Ok(())) => {
                info!(
                    "Job {} ended after {:?}",
                    handle.job_id,
                    started.elapsed()
                );
                return Ok(tracker);
            }
            Some(Err(failure)) => return Err(BatchFailure::Job(failure)),
            None => {}
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out());
        }

        let sleep_for = settings.interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BatchFailure::Provider(ProviderError::Cancelled)),
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
}
