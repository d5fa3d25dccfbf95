//! Bounded concurrent fetch pipeline.
//!
//! Fans jobs out to a fixed set of worker threads and yields results to one
//! consumer as soon as any worker finishes.
//!
//! # Architecture
//!
//! ```text
//! job source → job channel → N workers → result channel → consumer (Iterator)
//! (lazy)       (≤ N queued)               (completion order)
//! ```
//!
//! # Backpressure
//!
//! A job counts as outstanding from the moment it is pulled from the source
//! until its result has been handed to the consumer. At most N jobs are ever
//! outstanding, so a slot is refilled only when the consumer asks for the next
//! result. This caps buffered result memory at N results.
//!
//! # Failure
//!
//! The first `Err` is yielded to the consumer and the iterator ends after it;
//! no further jobs are scheduled. Jobs already running are not interrupted.
//! A panic inside a job is resumed on the consumer thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

type JobOutcome<T, E> = thread::Result<Result<T, E>>;

/// Pipeline configuration: capacity and worker thread naming
#[derive(Debug, Clone)]
pub struct BoundedPipeline {
    workers: usize,
    thread_name: String,
}

impl BoundedPipeline {
    /// Create a pipeline with `workers` slots (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            thread_name: "bale-fetch".to_string(),
        }
    }

    /// Prefix for worker thread names
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start the workers and return the lazy result stream.
    ///
    /// Nothing is pulled from `jobs` until the first call to `next()`.
    pub fn run<I, F, T, E>(
        &self,
        jobs: I,
        job_fn: F,
    ) -> std::io::Result<PipelineResults<I::IntoIter, T, E>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(I::Item) -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (job_tx, job_rx) = bounded::<I::Item>(self.workers);
        let (result_tx, result_rx) = bounded::<JobOutcome<T, E>>(self.workers);
        let job_fn = Arc::new(job_fn);

        let mut handles = Vec::with_capacity(self.workers);
        for i in 0..self.workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let job_fn = Arc::clone(&job_fn);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", self.thread_name, i))
                .spawn(move || worker_loop(job_rx, result_tx, job_fn))?;
            handles.push(handle);
        }

        tracing::debug!(workers = self.workers, "Pipeline started");

        Ok(PipelineResults {
            jobs: jobs.into_iter(),
            job_tx: Some(job_tx),
            result_rx,
            in_flight: 0,
            capacity: self.workers,
            stopped: false,
            handles,
        })
    }
}

fn worker_loop<J, T, E, F>(
    job_rx: Receiver<J>,
    result_tx: Sender<JobOutcome<T, E>>,
    job_fn: Arc<F>,
) where
    F: Fn(J) -> Result<T, E>,
{
    for job in job_rx.iter() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job_fn(job)));
        if result_tx.send(outcome).is_err() {
            break; // Consumer gone
        }
    }
}

/// Lazy stream of job results in completion order
pub struct PipelineResults<J: Iterator, T, E> {
    jobs: J,
    job_tx: Option<Sender<J::Item>>,
    result_rx: Receiver<JobOutcome<T, E>>,
    in_flight: usize,
    capacity: usize,
    stopped: bool,
    handles: Vec<JoinHandle<()>>,
}

impl<J: Iterator, T, E> PipelineResults<J, T, E> {
    /// Jobs pulled from the source whose results have not been consumed yet
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn fill_slots(&mut self) {
        while self.in_flight < self.capacity {
            let Some(tx) = self.job_tx.as_ref() else {
                return;
            };
            match self.jobs.next() {
                Some(job) => {
                    if tx.send(job).is_err() {
                        // Every worker has exited
                        self.job_tx = None;
                        return;
                    }
                    self.in_flight += 1;
                }
                None => {
                    // Source exhausted: closing the channel lets idle workers exit
                    self.job_tx = None;
                    return;
                }
            }
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.job_tx = None;
    }
}

impl<J: Iterator, T, E> Iterator for PipelineResults<J, T, E> {
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }
        self.fill_slots();
        if self.in_flight == 0 {
            self.stop();
            return None;
        }
        match self.result_rx.recv() {
            Ok(Ok(result)) => {
                self.in_flight -= 1;
                if result.is_err() {
                    self.stop();
                }
                Some(result)
            }
            Ok(Err(payload)) => {
                self.stop();
                panic::resume_unwind(payload)
            }
            Err(_) => {
                self.stop();
                None
            }
        }
    }
}

impl<J: Iterator, T, E> Drop for PipelineResults<J, T, E> {
    fn drop(&mut self) {
        self.job_tx = None;
        // The result channel has room for every outstanding job, so workers
        // never block on send and exit once their current job is done.
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
