//! Handle on a submitted job

use crate::status::JobState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Returned by [`Spawner::submit`](crate::spawner::Spawner::submit)
///
/// Cheap to clone; every clone observes the same job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: String,
    cancel: CancellationToken,
    finished: watch::Receiver<Option<JobState>>,
    live_workers: Arc<AtomicUsize>,
    peak_workers: Arc<AtomicUsize>,
}

impl JobHandle {
    pub(crate) fn new(
        job_id: String,
        cancel: CancellationToken,
        finished: watch::Receiver<Option<JobState>>,
        live_workers: Arc<AtomicUsize>,
        peak_workers: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            job_id,
            cancel,
            finished,
            live_workers,
            peak_workers,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Request cancellation; calling it again has no further effect
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            log::info!("Cancelling job {}", self.job_id);
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once supervision has ended and the final rollup is written
    pub fn is_finished(&self) -> bool {
        self.finished.borrow().is_some()
    }

    pub fn final_state(&self) -> Option<JobState> {
        *self.finished.borrow()
    }

    /// Wait for supervision to end and return the job's final state
    ///
    /// If the supervision task disappeared without reporting, the job is
    /// considered failed.
    pub async fn wait(&self) -> JobState {
        let mut finished = self.finished.clone();
        loop {
            if let Some(state) = *finished.borrow_and_update() {
                return state;
            }
            if finished.changed().await.is_err() {
                return (*finished.borrow()).unwrap_or(JobState::Failed);
            }
        }
    }

    /// Workers of this job alive right now
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// Highest number of simultaneously alive workers seen so far
    pub fn peak_workers(&self) -> usize {
        self.peak_workers.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn handle() -> (watch::Sender<Option<JobState>>, JobHandle) {
        let (tx, rx) = watch::channel(None);
        let handle = JobHandle::new(
            "job-h".into(),
            CancellationToken::new(),
            rx,
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        );
        (tx, handle)
    }

    #[tokio::test]
    async fn test_wait_returns_published_state() {
        let (tx, handle) = handle();
        assert!(!handle.is_finished());

        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.wait().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(Some(JobState::Completed)).unwrap();

        assert_eq!(task.await.unwrap(), JobState::Completed);
        assert!(handle.is_finished());
        assert_eq!(handle.final_state(), Some(JobState::Completed));
    }

    #[tokio::test]
    async fn test_wait_after_sender_dropped() {
        let (tx, handle) = handle();
        drop(tx);
        assert_eq!(handle.wait().await, JobState::Failed);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (_tx, handle) = handle();
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
    }
}
