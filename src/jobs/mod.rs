//! Background jobs
//!
//! A job runs one blocking unit of work on tokio's blocking pool and reports
//! through a [`JobHandle`]. The handle is a future: awaiting it runs exactly one
//! of the job's completion callbacks, in the awaiting task, so completion lands
//! on the caller's context rather than the worker thread.
//!
//! Jobs cannot be cancelled. Dropping a handle discards the outcome; the work
//! still runs to completion.

mod lifecycle;

pub use lifecycle::{initialize, reset_audio, reset_video, start_output, OUTPUT_STARTED};

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::EngineError;
use crate::error::ApiError;

/// Which lifecycle operation a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Initialize,
    ResetVideo,
    ResetAudio,
    StartOutput,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Initialize => "initialize",
            JobKind::ResetVideo => "reset_video",
            JobKind::ResetAudio => "reset_audio",
            JobKind::StartOutput => "start_output",
        };
        f.write_str(name)
    }
}

/// Job progress: Queued -> Running -> Completed | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_advance_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// Status cell shared between a handle and its worker
#[derive(Debug, Clone)]
struct StatusCell(Arc<RwLock<JobStatus>>);

impl StatusCell {
    fn new() -> Self {
        Self(Arc::new(RwLock::new(JobStatus::Queued)))
    }

    fn get(&self) -> JobStatus {
        *self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next` if that is a legal transition; returns whether it moved
    fn advance(&self, next: JobStatus) -> bool {
        let mut status = self.0.write().unwrap_or_else(|e| e.into_inner());
        if status.can_advance_to(next) {
            *status = next;
            true
        } else {
            false
        }
    }
}

/// Future of a submitted job
///
/// Resolves to the success callback's value or to the error produced by the
/// failure callback.
pub struct JobHandle<R> {
    id: Uuid,
    kind: JobKind,
    status: StatusCell,
    completion: BoxFuture<'static, Result<R, ApiError>>,
}

impl<R> JobHandle<R> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn status(&self) -> JobStatus {
        self.status.get()
    }
}

impl<R> fmt::Debug for JobHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &self.status())
            .finish()
    }
}

impl<R> Future for JobHandle<R> {
    type Output = Result<R, ApiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.completion.as_mut().poll(cx)
    }
}

/// Submits jobs to the blocking pool of a tokio runtime
#[derive(Debug, Clone)]
pub struct JobRunner {
    runtime: Handle,
}

impl JobRunner {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Runner bound to the runtime of the calling task
    ///
    /// Panics outside a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Queue `work` on the blocking pool and return its handle immediately
    ///
    /// Exactly one of `on_success` / `on_failure` runs, once, when the handle is
    /// awaited. A panic inside `work` reaches `on_failure` as
    /// [`EngineError::Panicked`]; anything `work` owns is dropped during the
    /// unwind, before the handle settles.
    pub fn submit<T, R, W, S, F>(
        &self,
        kind: JobKind,
        work: W,
        on_success: S,
        on_failure: F,
    ) -> JobHandle<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        W: FnOnce() -> Result<T, EngineError> + Send + 'static,
        S: FnOnce(T) -> R + Send + 'static,
        F: FnOnce(EngineError) -> ApiError + Send + 'static,
    {
        let id = Uuid::new_v4();
        let status = StatusCell::new();
        let (tx, rx) = oneshot::channel::<Result<T, EngineError>>();

        debug!("Job {} ({}) queued", id, kind);

        let worker_status = status.clone();
        self.runtime.spawn_blocking(move || {
            worker_status.advance(JobStatus::Running);
            debug!("Job {} ({}) running", id, kind);

            let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!("Job {} ({}) panicked: {}", id, kind, message);
                    Err(EngineError::Panicked(message))
                }
            };

            match &outcome {
                Ok(_) => {
                    worker_status.advance(JobStatus::Completed);
                    debug!("Job {} ({}) completed", id, kind);
                }
                Err(e) => {
                    worker_status.advance(JobStatus::Failed);
                    debug!("Job {} ({}) failed: {}", id, kind, e);
                }
            }

            if tx.send(outcome).is_err() {
                debug!("Job {} ({}) finished after its handle was dropped", id, kind);
            }
        });

        let completion_status = status.clone();
        let completion = async move {
            let outcome = match rx.await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // Worker went away without reporting (runtime shutting down)
                    completion_status.advance(JobStatus::Failed);
                    Err(EngineError::Aborted)
                }
            };

            match outcome {
                Ok(value) => Ok(on_success(value)),
                Err(e) => Err(on_failure(e)),
            }
        }
        .boxed();

        JobHandle {
            id,
            kind,
            status,
            completion,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_success_runs_success_callback_only() {
        let runner = JobRunner::current();
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_seen = failures.clone();

        let handle = runner.submit(
            JobKind::ResetVideo,
            || Ok(21),
            |v| v * 2,
            move |e| {
                failures_seen.fetch_add(1, Ordering::SeqCst);
                ApiError::VideoReset(e)
            },
        );

        assert_eq!(handle.kind(), JobKind::ResetVideo);
        assert_eq!(handle.await.unwrap(), 42);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_runs_failure_callback() {
        let runner = JobRunner::current();
        let handle = runner.submit(
            JobKind::ResetAudio,
            || Err::<(), _>(EngineError::AudioReset),
            |_| -> () { panic!("success callback must not run") },
            ApiError::AudioReset,
        );

        let err = handle.await.unwrap_err();
        assert!(matches!(err, ApiError::AudioReset(EngineError::AudioReset)));
    }

    #[tokio::test]
    async fn test_panicking_work_is_reported_as_failure() {
        let runner = JobRunner::current();
        let handle = runner.submit(
            JobKind::StartOutput,
            || -> Result<(), EngineError> { panic!("encoder exploded") },
            |_| "ok",
            ApiError::OutputStart,
        );

        match handle.await {
            Err(ApiError::OutputStart(EngineError::Panicked(message))) => {
                assert!(message.contains("encoder exploded"));
            }
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_status_moves_through_lifecycle() {
        let runner = JobRunner::current();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        let handle = runner.submit(
            JobKind::Initialize,
            move || {
                started_tx.send(()).ok();
                release_rx.recv().ok();
                Ok("v1")
            },
            |v| v.to_string(),
            ApiError::EngineStartup,
        );

        tokio::task::spawn_blocking(move || started_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.status(), JobStatus::Running);

        release_tx.send(()).unwrap();
        let status = handle.status.clone();
        assert_eq!(handle.await.unwrap(), "v1");
        assert_eq!(status.get(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel_work() {
        let runner = JobRunner::current();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = runner.submit(
            JobKind::ResetVideo,
            move || {
                std::thread::sleep(Duration::from_millis(20));
                done_tx.send(()).ok();
                Ok(())
            },
            |_| (),
            ApiError::VideoReset,
        );
        drop(handle);

        let finished =
            tokio::task::spawn_blocking(move || done_rx.recv_timeout(Duration::from_secs(5)))
                .await
                .unwrap();
        assert!(finished.is_ok());
    }

    #[test]
    fn test_status_transitions_are_one_way() {
        let status = StatusCell::new();
        assert!(!status.advance(JobStatus::Completed));
        assert!(status.advance(JobStatus::Running));
        assert!(!status.advance(JobStatus::Queued));
        assert!(status.advance(JobStatus::Failed));
        assert!(status.get().is_terminal());
        assert!(!status.advance(JobStatus::Completed));
        assert_eq!(status.get(), JobStatus::Failed);
    }
}
