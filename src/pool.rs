use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};
use thiserror::Error;

/// Per-worker processing state. One instance lives on each worker thread
/// for the whole run and handles every item that worker dequeues.
pub trait Processor: Sized {
    type Item: Send + 'static;
    type Output: Send + 'static;
    type Error: fmt::Display + Send + 'static;

    fn process(&mut self, item: Self::Item) -> Result<Self::Output, Self::Error>;

    /// Called once when the pool is disbanded.
    fn shutdown(self) {}
}

#[derive(Debug, Error)]
pub enum PoolError<E: fmt::Display> {
    #[error("task failed: {0}")]
    Task(E),
    #[error("all workers have stopped")]
    WorkersGone,
}

enum Message<T> {
    Work(T),
    Stop,
}

/// Bounded fan-out of work items over a fixed set of long-lived workers.
///
/// The driver pushes at most `batch_size` items into the job queue, then
/// drains exactly that many results before pulling more from the source, so
/// in-flight work stays bounded however long the input is. Results within a
/// batch arrive in completion order.
#[derive(Debug, Clone, Copy)]
pub struct BatchedExecutionPool {
    threads: usize,
    batch_size: usize,
}

impl BatchedExecutionPool {
    pub fn new(threads: usize, batch_size: usize) -> Self {
        Self { threads: threads.max(1), batch_size: batch_size.max(1) }
    }

    pub fn threads(&self) -> usize { self.threads }
    pub fn batch_size(&self) -> usize { self.batch_size }

    /// Starts the workers and returns a lazy stream of results, one per
    /// consumed input item. `factory` runs on each worker thread to build
    /// that worker's processor.
    ///
    /// Dropping the stream early discards queued items that no worker has
    /// picked up yet and waits only for the items already being processed.
    pub fn execute<I, P, F>(&self, input: I, factory: F) -> io::Result<Execution<I::IntoIter, P>>
    where
        I: IntoIterator<Item = P::Item>,
        P: Processor + 'static,
        F: Fn(usize) -> P + Send + Sync + 'static,
    {
        let (job_tx, job_rx) = unbounded::<Message<P::Item>>();
        let (out_tx, out_rx) = unbounded::<Result<P::Output, P::Error>>();
        let factory = Arc::new(factory);
        let mut workers = Vec::with_capacity(self.threads);
        for id in 0..self.threads {
            let jobs = job_rx.clone();
            let results = out_tx.clone();
            let factory = Arc::clone(&factory);
            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(id, factory(id), jobs, results))?;
            workers.push(handle);
        }
        let backlog = job_rx;
        info!("started {} workers, batch size {}", self.threads, self.batch_size);
        Ok(Execution {
            input: input.into_iter(),
            jobs: job_tx,
            backlog,
            results: out_rx,
            workers,
            batch_size: self.batch_size,
            pending: 0,
            exhausted: false,
            gone: false,
            batches: 0,
        })
    }
}

fn worker_loop<P: Processor>(
    id: usize,
    mut processor: P,
    jobs: Receiver<Message<P::Item>>,
    results: Sender<Result<P::Output, P::Error>>,
) {
    debug!("worker {} ready", id);
    while let Ok(Message::Work(item)) = jobs.recv() {
        match processor.process(item) {
            Ok(out) => {
                if results.send(Ok(out)).is_err() { break; }
            }
            Err(e) => {
                // No restart: the pool keeps going with one worker fewer
                error!("worker {} terminated: {}", id, e);
                let _ = results.send(Err(e));
                return;
            }
        }
    }
    processor.shutdown();
    debug!("worker {} stopped", id);
}

/// Iterator over the results of a running pool.
pub struct Execution<I, P: Processor> {
    input: I,
    jobs: Sender<Message<P::Item>>,
    // Driver's handle on the job queue, used to discard unstarted work
    backlog: Receiver<Message<P::Item>>,
    results: Receiver<Result<P::Output, P::Error>>,
    workers: Vec<JoinHandle<()>>,
    batch_size: usize,
    pending: usize,
    exhausted: bool,
    gone: bool,
    batches: usize,
}

impl<I, P: Processor> Execution<I, P> {
    /// One stop message per worker, then wait for all of them.
    fn disband(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.jobs.send(Message::Stop);
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() { error!("worker panicked"); }
        }
    }
}

impl<I, P> Execution<I, P>
where
    I: Iterator<Item = P::Item>,
    P: Processor,
{
    /// Queues up to one batch. Returns how many items were queued.
    fn enqueue_batch(&mut self) -> usize {
        let mut n = 0;
        while n < self.batch_size {
            let Some(item) = self.input.next() else {
                self.exhausted = true;
                break;
            };
            if self.jobs.send(Message::Work(item)).is_err() {
                self.gone = true;
                break;
            }
            n += 1;
        }
        self.batches += 1;
        debug!("batch {} queued {} items", self.batches, n);
        n
    }

}

impl<I, P> Iterator for Execution<I, P>
where
    I: Iterator<Item = P::Item>,
    P: Processor,
{
    type Item = Result<P::Output, PoolError<P::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pending > 0 {
                return match self.results.recv() {
                    Ok(r) => {
                        self.pending -= 1;
                        Some(r.map_err(PoolError::Task))
                    }
                    Err(_) => {
                        self.pending = 0;
                        self.gone = true;
                        continue;
                    }
                };
            }
            if self.gone {
                self.gone = false;
                self.exhausted = true;
                self.disband();
                return Some(Err(PoolError::WorkersGone));
            }
            if self.exhausted {
                if !self.workers.is_empty() {
                    info!("input exhausted after {} batches, stopping workers", self.batches);
                    self.disband();
                }
                return None;
            }
            self.pending = self.enqueue_batch();
        }
    }
}

impl<I, P: Processor> Drop for Execution<I, P> {
    fn drop(&mut self) {
        let dropped = self.backlog.try_iter().filter(|m| matches!(m, Message::Work(_))).count();
        if dropped > 0 { debug!("discarded {} queued items", dropped); }
        self.disband();
    }
}
