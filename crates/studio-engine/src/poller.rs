use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use studio_contracts::events::{EventWriter, JobEvent};
use studio_contracts::{GenerationApiKind, MediaError};

use crate::provider::{MediaProvider, OperationHandle, OperationStatus, VideoSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

/// In-memory state of one video request. Never persisted.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    handle: OperationHandle,
    started_at: Instant,
    history: Vec<JobState>,
    checks: u32,
    waited: Duration,
}

impl GenerationJob {
    pub fn submitted(handle: OperationHandle) -> Self {
        Self {
            handle,
            started_at: Instant::now(),
            history: vec![JobState::Submitted],
            checks: 0,
            waited: Duration::ZERO,
        }
    }

    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    pub fn state(&self) -> JobState {
        self.history.last().copied().unwrap_or(JobState::Submitted)
    }

    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    pub fn checks(&self) -> u32 {
        self.checks
    }

    /// Total time spent in inter-tick waits.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn transition(&mut self, next: JobState) {
        if self.state() != next && !self.state().is_terminal() {
            self.history.push(next);
        }
    }
}

/// Cloneable cancellation flag that also wakes a pending wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, wake) = &*self.inner;
        match flag.lock() {
            Ok(mut cancelled) => *cancelled = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        flag.lock().map(|value| *value).unwrap_or(true)
    }

    /// Blocks for up to `timeout`. Returns `true` if cancelled meanwhile.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let Ok(guard) = flag.lock() else {
            return true;
        };
        match wake.wait_timeout_while(guard, timeout, |cancelled| !*cancelled) {
            Ok((cancelled, _)) => *cancelled,
            Err(_) => true,
        }
    }
}

/// Inter-tick wait strategy.
pub trait Pacer: Send + Sync {
    /// Waits for `duration`; returns `false` if the wait was cut short by `cancel`.
    fn wait(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn wait(&self, duration: Duration, cancel: &CancelToken) -> bool {
        !cancel.wait_timeout(duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(600),
        }
    }
}

pub struct OperationPoller<'a> {
    provider: &'a dyn MediaProvider,
    pacer: &'a dyn Pacer,
    settings: PollSettings,
    events: Option<&'a EventWriter>,
}

impl<'a> OperationPoller<'a> {
    pub fn new(provider: &'a dyn MediaProvider, pacer: &'a dyn Pacer, settings: PollSettings) -> Self {
        Self {
            provider,
            pacer,
            settings,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<&'a EventWriter>) -> Self {
        self.events = events;
        self
    }

    /// Drives `job` to a terminal state.
    ///
    /// The first check happens immediately. After each still-running answer the
    /// poller waits one interval, trimmed so the total never passes `max_wait`;
    /// once the full budget has been waited a running answer is a timeout.
    pub fn run(&self, job: &mut GenerationJob, cancel: &CancelToken) -> Result<VideoSample, MediaError> {
        job.transition(JobState::Polling);
        loop {
            if cancel.is_cancelled() {
                job.transition(JobState::Cancelled);
                return Err(MediaError::PollingCancelled);
            }

            let status = match self.provider.check_operation(&job.handle) {
                Ok(status) => status,
                Err(err) => {
                    job.transition(JobState::Failed);
                    return Err(err);
                }
            };
            job.checks += 1;
            self.record_tick(job, &status);

            match status {
                OperationStatus::Completed(sample) => {
                    job.transition(JobState::Succeeded);
                    return Ok(sample);
                }
                OperationStatus::Failed(detail) => {
                    job.transition(JobState::Failed);
                    return Err(MediaError::api(GenerationApiKind::OperationFailed, detail));
                }
                OperationStatus::Running => {}
            }

            if job.waited >= self.settings.max_wait {
                job.transition(JobState::TimedOut);
                return Err(MediaError::PollingTimeout { waited: job.waited });
            }
            let step = self.settings.interval.min(self.settings.max_wait - job.waited);
            if !self.pacer.wait(step, cancel) {
                job.transition(JobState::Cancelled);
                return Err(MediaError::PollingCancelled);
            }
            job.waited += step;
        }
    }

    fn record_tick(&self, job: &GenerationJob, status: &OperationStatus) {
        let outcome = match status {
            OperationStatus::Running => "running",
            OperationStatus::Completed(_) => "completed",
            OperationStatus::Failed(_) => "failed",
        };
        tracing::debug!(
            operation = job.handle.as_str(),
            check = job.checks,
            waited_s = job.waited.as_secs_f64(),
            outcome,
            "video operation checked"
        );
        if let Some(events) = self.events {
            events.record(
                JobEvent::VideoPoll,
                json!({
                    "operation": job.handle.as_str(),
                    "check": job.checks,
                    "waited_s": job.waited.as_secs_f64(),
                    "status": outcome,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    use studio_contracts::{GenerationApiKind, MediaError};

    use super::{CancelToken, GenerationJob, JobState, OperationPoller, Pacer, PollSettings, ThreadPacer};
    use crate::provider::{
        DownloadedMedia, GeneratedImage, ImageGeneration, MediaProvider, OperationHandle, OperationStatus,
        VideoSample, VideoSubmission,
    };

    struct ScriptedOperation {
        statuses: Mutex<VecDeque<OperationStatus>>,
        checks: Mutex<u32>,
    }

    impl ScriptedOperation {
        fn new(statuses: Vec<OperationStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                checks: Mutex::new(0),
            }
        }

        fn checks(&self) -> u32 {
            *self.checks.lock().expect("checks lock")
        }
    }

    impl MediaProvider for ScriptedOperation {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate_images(&self, _request: &ImageGeneration<'_>) -> Result<Vec<GeneratedImage>, MediaError> {
            Ok(Vec::new())
        }

        fn submit_video(&self, _request: &VideoSubmission<'_>) -> Result<Option<OperationHandle>, MediaError> {
            Ok(None)
        }

        fn check_operation(&self, _handle: &OperationHandle) -> Result<OperationStatus, MediaError> {
            *self.checks.lock().expect("checks lock") += 1;
            Ok(self
                .statuses
                .lock()
                .expect("statuses lock")
                .pop_front()
                .unwrap_or(OperationStatus::Running))
        }

        fn download(&self, _uri: &str) -> Result<DownloadedMedia, MediaError> {
            Ok(DownloadedMedia {
                bytes: Vec::new(),
                mime_type: None,
            })
        }
    }

    #[derive(Default)]
    struct RecordingPacer {
        waits: Mutex<Vec<Duration>>,
        cancel_on_wait: Option<usize>,
    }

    impl RecordingPacer {
        fn waits(&self) -> Vec<Duration> {
            self.waits.lock().expect("waits lock").clone()
        }
    }

    impl Pacer for RecordingPacer {
        fn wait(&self, duration: Duration, cancel: &CancelToken) -> bool {
            let mut waits = self.waits.lock().expect("waits lock");
            waits.push(duration);
            if self.cancel_on_wait == Some(waits.len()) {
                cancel.cancel();
                return false;
            }
            true
        }
    }

    fn settings(interval: u64, max_wait: u64) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(interval),
            max_wait: Duration::from_secs(max_wait),
        }
    }

    fn sample() -> VideoSample {
        VideoSample {
            uri: Some("https://example.com/video.mp4".to_string()),
            ..VideoSample::default()
        }
    }

    fn job() -> GenerationJob {
        GenerationJob::submitted(OperationHandle("operations/abc".to_string()))
    }

    #[test]
    fn immediate_completion_skips_waiting() -> anyhow::Result<()> {
        let provider = ScriptedOperation::new(vec![OperationStatus::Completed(sample())]);
        let pacer = RecordingPacer::default();
        let mut job = job();
        let result = OperationPoller::new(&provider, &pacer, settings(10, 60)).run(&mut job, &CancelToken::new())?;

        assert_eq!(result, sample());
        assert_eq!(
            job.history(),
            &[JobState::Submitted, JobState::Polling, JobState::Succeeded]
        );
        assert!(pacer.waits().is_empty());
        assert_eq!(job.checks(), 1);
        Ok(())
    }

    #[test]
    fn two_running_ticks_mean_two_waits() -> anyhow::Result<()> {
        let provider = ScriptedOperation::new(vec![
            OperationStatus::Running,
            OperationStatus::Running,
            OperationStatus::Completed(sample()),
        ]);
        let pacer = RecordingPacer::default();
        let mut job = job();
        OperationPoller::new(&provider, &pacer, settings(10, 600)).run(&mut job, &CancelToken::new())?;

        assert_eq!(pacer.waits(), vec![Duration::from_secs(10); 2]);
        assert_eq!(provider.checks(), 3);
        assert_eq!(job.state(), JobState::Succeeded);
        Ok(())
    }

    #[test]
    fn never_completing_operation_times_out_at_exact_budget() {
        let provider = ScriptedOperation::new(Vec::new());
        let pacer = RecordingPacer::default();
        let mut job = job();
        let err = OperationPoller::new(&provider, &pacer, settings(10, 25))
            .run(&mut job, &CancelToken::new())
            .expect_err("should time out");

        assert!(matches!(err, MediaError::PollingTimeout { waited } if waited == Duration::from_secs(25)));
        assert_eq!(
            pacer.waits(),
            vec![Duration::from_secs(10), Duration::from_secs(10), Duration::from_secs(5)]
        );
        assert_eq!(job.waited(), Duration::from_secs(25));
        assert_eq!(provider.checks(), 4);
        assert_eq!(job.state(), JobState::TimedOut);
    }

    #[test]
    fn provider_error_detail_fails_the_job() {
        let provider = ScriptedOperation::new(vec![
            OperationStatus::Running,
            OperationStatus::Failed("quota exceeded".to_string()),
        ]);
        let pacer = RecordingPacer::default();
        let mut job = job();
        let err = OperationPoller::new(&provider, &pacer, settings(1, 60))
            .run(&mut job, &CancelToken::new())
            .expect_err("should fail");

        match err {
            MediaError::GenerationApi { kind, detail } => {
                assert_eq!(kind, GenerationApiKind::OperationFailed);
                assert_eq!(detail, "quota exceeded");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(pacer.waits().len(), 1);
    }

    #[test]
    fn cancellation_stops_before_next_check() {
        let provider = ScriptedOperation::new(Vec::new());
        let pacer = RecordingPacer {
            cancel_on_wait: Some(2),
            ..RecordingPacer::default()
        };
        let mut job = job();
        let cancel = CancelToken::new();
        let err = OperationPoller::new(&provider, &pacer, settings(10, 600))
            .run(&mut job, &cancel)
            .expect_err("should cancel");

        assert!(matches!(err, MediaError::PollingCancelled));
        assert_eq!(provider.checks(), 2);
        assert_eq!(job.state(), JobState::Cancelled);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn cancel_token_wakes_thread_pacer() {
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let started = Instant::now();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let completed = ThreadPacer.wait(Duration::from_secs(30), &cancel);
        canceller.join().expect("canceller panicked");

        assert!(!completed);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut job = job();
        job.transition(JobState::Polling);
        job.transition(JobState::Succeeded);
        job.transition(JobState::Polling);
        assert_eq!(job.state(), JobState::Succeeded);
        assert!(JobState::TimedOut.is_terminal());
        assert!(!JobState::Polling.is_terminal());
    }
}
