use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    time::{Duration, Instant},
};

use crate::error::{AtlasError, AtlasResult};

/// Identity handed to each job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobSlot {
    /// Pool-local worker index in `0..width`. Stable for the worker thread running the job,
    /// so it can select per-worker scratch state.
    pub index: usize,
    /// Submission order of the job within its phase.
    pub job_id: usize,
}

/// Fixed-width worker pool shared by the preload, render and scale phases.
///
/// Each [`run_phase`](Self::run_phase) call is a barrier: it returns once every job has
/// finished, the first job fails, or the phase timeout elapses.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    width: usize,
    phase_timeout: Duration,
}

impl WorkerPool {
    pub fn new(width: usize, phase_timeout: Duration) -> AtlasResult<Self> {
        if width == 0 {
            return Err(AtlasError::validation("worker pool width must be >= 1"));
        }
        if phase_timeout.is_zero() {
            return Err(AtlasError::validation("worker pool phase timeout must be > 0"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("atlas-worker-{i}"))
            .build()
            .map_err(|e| AtlasError::evaluation(format!("failed to build worker pool: {e}")))?;
        Ok(Self {
            pool,
            width,
            phase_timeout,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn phase_timeout(&self) -> Duration {
        self.phase_timeout
    }

    /// Run every job concurrently and collect their results in completion order.
    ///
    /// The first error (or panic) aborts the phase; jobs still queued are skipped.
    pub fn run_phase<T, F>(&self, phase: &'static str, jobs: Vec<F>) -> AtlasResult<Vec<T>>
    where
        T: Send + 'static,
        F: FnOnce(JobSlot) -> AtlasResult<T> + Send + 'static,
    {
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let (tx, rx) = mpsc::channel::<AtlasResult<T>>();
        let aborted = Arc::new(AtomicBool::new(false));
        for (job_id, job) in jobs.into_iter().enumerate() {
            let tx = tx.clone();
            let aborted = Arc::clone(&aborted);
            self.pool.spawn(move || {
                if aborted.load(Ordering::Acquire) {
                    return;
                }
                let slot = JobSlot {
                    index: rayon::current_thread_index().unwrap_or(0),
                    job_id,
                };
                let result = catch_unwind(AssertUnwindSafe(|| job(slot))).unwrap_or_else(|_| {
                    Err(AtlasError::evaluation(format!(
                        "{phase} job {job_id} panicked"
                    )))
                });
                // The receiver is gone once the phase has already failed.
                let _ = tx.send(result);
            });
        }
        drop(tx);

        // A timeout too large to represent as an instant means no deadline.
        let deadline = Instant::now().checked_add(self.phase_timeout);
        let mut out = Vec::with_capacity(total);
        while out.len() < total {
            let received = match deadline {
                Some(deadline) => {
                    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(Ok(value)) => out.push(value),
                Ok(Err(err)) => {
                    aborted.store(true, Ordering::Release);
                    tracing::debug!(phase, error = %err, "phase aborted by failing job");
                    return Err(err);
                }
                Err(RecvTimeoutError::Timeout) => {
                    aborted.store(true, Ordering::Release);
                    return Err(AtlasError::PoolTimeout {
                        phase,
                        timeout: self.phase_timeout,
                        completed: out.len(),
                        total,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    aborted.store(true, Ordering::Release);
                    return Err(AtlasError::evaluation(format!(
                        "{phase} phase lost {} job result(s)",
                        total - out.len()
                    )));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn pool(width: usize, timeout_ms: u64) -> WorkerPool {
        pool_with(width, Duration::from_millis(timeout_ms))
    }

    fn pool_with(width: usize, timeout: Duration) -> WorkerPool {
        WorkerPool::new(width, timeout).unwrap()
    }

    type Job<T> = Box<dyn FnOnce(JobSlot) -> AtlasResult<T> + Send>;

    #[test]
    fn rejects_zero_width() {
        assert!(WorkerPool::new(0, Duration::from_secs(1)).is_err());
        assert!(WorkerPool::new(1, Duration::ZERO).is_err());
    }

    #[test]
    fn collects_every_result_and_slot_indices_stay_in_width() {
        let pool = pool(3, 5_000);
        let jobs: Vec<Job<(usize, usize)>> = (0..20)
            .map(|_| {
                Box::new(|slot: JobSlot| -> AtlasResult<(usize, usize)> {
                    Ok((slot.job_id, slot.index))
                }) as Job<_>
            })
            .collect();
        let mut out = pool.run_phase("test", jobs).unwrap();
        out.sort();
        assert_eq!(out.len(), 20);
        for (i, (job_id, index)) in out.into_iter().enumerate() {
            assert_eq!(job_id, i);
            assert!(index < 3);
        }
    }

    #[test]
    fn empty_phase_is_ok() {
        let jobs: Vec<Job<()>> = Vec::new();
        assert!(pool(2, 100).run_phase("empty", jobs).unwrap().is_empty());
    }

    #[test]
    fn first_error_aborts_phase() {
        let pool = pool(2, 5_000);
        let jobs: Vec<Job<()>> = (0..4)
            .map(|i| {
                Box::new(move |_slot: JobSlot| -> AtlasResult<()> {
                    if i == 2 {
                        Err(AtlasError::external_tool("convert", "exit status: 1"))
                    } else {
                        Ok(())
                    }
                }) as Job<_>
            })
            .collect();
        let err = pool.run_phase("scale", jobs).unwrap_err();
        assert!(matches!(err, AtlasError::ExternalTool { .. }));
    }

    #[test]
    fn panic_becomes_error() {
        let pool = pool(1, 5_000);
        let jobs: Vec<Job<()>> = vec![Box::new(|_slot: JobSlot| -> AtlasResult<()> {
            panic!("boom")
        })];
        let err = pool.run_phase("render", jobs).unwrap_err();
        assert!(err.to_string().contains("render job 0 panicked"));
    }

    #[test]
    fn unrepresentable_timeout_waits_without_deadline() {
        let pool = pool_with(2, Duration::MAX);
        let jobs: Vec<Job<u32>> = (0..4)
            .map(|i| Box::new(move |_slot: JobSlot| -> AtlasResult<u32> { Ok(i) }) as Job<_>)
            .collect();
        let mut out = pool.run_phase("render", jobs).unwrap();
        out.sort();
        assert_eq!(out, vec![0, 1, 2, 3]);

        let failing: Vec<Job<()>> = vec![Box::new(|_slot: JobSlot| -> AtlasResult<()> {
            Err(AtlasError::validation("bad frame"))
        })];
        assert!(pool.run_phase("render", failing).is_err());
    }

    #[test]
    fn bounded_wait_times_out_and_skips_queued_jobs() {
        let pool = pool(1, 50);
        let ran = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<Job<()>> = (0..3)
            .map(|_| {
                let ran = Arc::clone(&ran);
                Box::new(move |_slot: JobSlot| -> AtlasResult<()> {
                    ran.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(())
                }) as Job<_>
            })
            .collect();
        let err = pool.run_phase("preload", jobs).unwrap_err();
        assert!(err.is_timeout());
        std::thread::sleep(Duration::from_millis(700));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
