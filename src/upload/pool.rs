use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Completion handle for one submitted job.
pub struct JobHandle {
    done: Receiver<()>,
}

impl JobHandle {
    /// Blocks until the job has run (or its worker died).
    pub fn wait(self) {
        let _ = self.done.recv();
    }
}

/// Fixed set of named worker threads draining a shared job channel. The
/// staging pipeline uses it to parallelize CPU-side memcopies.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> anyhow::Result<Self> {
        assert!(threads > 0);
        let (tx, rx) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("upload-worker-{index}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                })
                .context("failed to spawn upload worker")?;
            workers.push(handle);
        }
        Ok(Self {
            tx: Some(tx),
            workers,
        })
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> JobHandle {
        let (done_tx, done_rx) = bounded(1);
        let task: Job = Box::new(move || {
            job();
            let _ = done_tx.send(());
        });
        self.tx
            .as_ref()
            .expect("worker pool already shut down")
            .send(task)
            .expect("worker pool channel closed");
        JobHandle { done: done_rx }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        log::trace!("Shutting down worker pool");
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn submitted_jobs_complete_before_wait_returns() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<JobHandle> = (0..32)
            .map(|_| {
                let counter = counter.clone();
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.wait();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn drop_joins_idle_workers() {
        let pool = WorkerPool::new(2).unwrap();
        pool.submit(|| {}).wait();
        drop(pool);
    }
}
