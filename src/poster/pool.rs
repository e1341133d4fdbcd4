use super::ComposeError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Raised when the caller gave up on a job; the job polls it between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ComposeError> {
        if self.is_cancelled() {
            Err(ComposeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Bounded set of blocking workers for CPU-heavy image jobs.
#[derive(Clone)]
pub struct RenderPool {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl RenderPool {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Runs `job` on a blocking thread once a worker slot is free. The slot
    /// stays taken until the job really returns, even after a timeout.
    pub async fn run<T, F>(&self, job: F) -> Result<T, ComposeError>
    where
        F: FnOnce(&CancelFlag) -> Result<T, ComposeError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ComposeError::PoolClosed)?;

        let cancel = CancelFlag::default();
        let job_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&job_cancel)
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => Err(ComposeError::Worker(err.to_string())),
            Err(_) => {
                warn!("render job exceeded {:?}, cancelling", self.timeout);
                cancel.cancel();
                Err(ComposeError::TimedOut(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn job_result_is_returned() {
        let pool = RenderPool::new(1, Duration::from_secs(5));
        let value = pool.run(|_| Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn job_errors_pass_through() {
        let pool = RenderPool::new(1, Duration::from_secs(5));
        let err = pool
            .run::<(), _>(|_| Err(ComposeError::Decode("bad".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_job_times_out_and_sees_cancellation() {
        let pool = RenderPool::new(1, Duration::from_millis(50));
        let (tx, rx) = std::sync::mpsc::channel();
        let err = pool
            .run(move |cancel| {
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                tx.send(()).ok();
                cancel.check()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ComposeError::TimedOut(_)));
        rx.recv_timeout(Duration::from_secs(2))
            .expect("job observed cancellation");
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_worker_count() {
        let pool = RenderPool::new(2, Duration::from_secs(5));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|_| {
            let pool = pool.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                pool.run(move |_| {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            })
        });
        for job in jobs.collect::<Vec<_>>() {
            job.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }
}
