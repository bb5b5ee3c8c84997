use crossbeam_channel::{unbounded, Receiver, Sender, TrySendError};
use std::thread::JoinHandle;

/// A fixed pool of message-passing worker threads.
///
/// Each worker owns a private job channel and runs jobs strictly in order;
/// results funnel back through one shared channel tagged with the worker
/// index so the main task can track per-worker business. All mutable world
/// state stays on the main task — jobs and results carry owned buffers,
/// never shared memory.
pub struct WorkerPool<J: Send + 'static, R: Send + 'static> {
    name: &'static str,
    senders: Vec<Sender<J>>,
    results: Receiver<(usize, R)>,
    outstanding: Vec<usize>,
    next_round_robin: usize,
    handles: Vec<JoinHandle<()>>,
}

impl<J: Send + 'static, R: Send + 'static> WorkerPool<J, R> {
    /// Spawn `count` workers running `run` for every job.
    ///
    /// `run` must be panic-free: domain entry points catch unwinds and
    /// encode failures as typed results before they reach the channel.
    pub fn new<F>(name: &'static str, count: usize, run: F) -> Self
    where
        F: Fn(J) -> R + Send + Sync + Clone + 'static,
    {
        let count = count.max(1);
        let (result_tx, result_rx) = unbounded::<(usize, R)>();
        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for index in 0..count {
            let (job_tx, job_rx) = unbounded::<J>();
            let run = run.clone();
            let result_tx = result_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    for job in job_rx.iter() {
                        let result = run(job);
                        if result_tx.send((index, result)).is_err() {
                            break; // main task is gone
                        }
                    }
                })
                .expect("spawning worker threads is infallible on supported targets");
            senders.push(job_tx);
            handles.push(handle);
        }

        Self {
            name,
            senders,
            results: result_rx,
            outstanding: vec![0; count],
            next_round_robin: 0,
            handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Jobs currently queued or running across the pool.
    pub fn outstanding_jobs(&self) -> usize {
        self.outstanding.iter().sum()
    }

    /// Dispatch to the next worker in rotation regardless of load.
    pub fn dispatch_round_robin(&mut self, job: J) {
        let index = self.next_round_robin % self.senders.len();
        self.next_round_robin = self.next_round_robin.wrapping_add(1);
        self.send_to(index, job);
    }

    /// Dispatch to an idle worker, or return the job when every worker is
    /// busy so the caller can retry next tick.
    pub fn dispatch_idle(&mut self, job: J) -> Result<(), J> {
        match self.outstanding.iter().position(|&n| n == 0) {
            Some(index) => {
                self.send_to(index, job);
                Ok(())
            }
            None => Err(job),
        }
    }

    pub fn has_idle_worker(&self) -> bool {
        self.outstanding.iter().any(|&n| n == 0)
    }

    /// Non-blocking result poll; updates business tracking.
    pub fn try_recv(&mut self) -> Option<R> {
        match self.results.try_recv() {
            Ok((index, result)) => {
                if let Some(count) = self.outstanding.get_mut(index) {
                    *count = count.saturating_sub(1);
                }
                Some(result)
            }
            Err(_) => None,
        }
    }

    /// Drain every result currently available.
    pub fn drain_results(&mut self) -> Vec<R> {
        let mut out = Vec::new();
        while let Some(r) = self.try_recv() {
            out.push(r);
        }
        out
    }

    fn send_to(&mut self, index: usize, job: J) {
        match self.senders[index].try_send(job) {
            Ok(()) => {
                self.outstanding[index] += 1;
            }
            Err(TrySendError::Disconnected(_)) => {
                // A dead worker thread means its panic escaped the domain
                // handler; drop the job and let distance refresh requeue.
                log::error!("[WorkerPool::{}] worker {} is gone, job dropped", self.name, index);
            }
            Err(TrySendError::Full(_)) => unreachable!("unbounded channel"),
        }
    }

    /// Close job channels and join workers.
    pub fn shutdown(mut self) {
        self.senders.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn recv_blocking<J: Send + 'static, R: Send + 'static>(pool: &mut WorkerPool<J, R>) -> R {
        for _ in 0..500 {
            if let Some(r) = pool.try_recv() {
                return r;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("worker result did not arrive");
    }

    #[test]
    fn round_robin_processes_all_jobs() {
        let mut pool: WorkerPool<u32, u32> = WorkerPool::new("test", 3, |n| n * 2);
        for n in 0..6u32 {
            pool.dispatch_round_robin(n);
        }
        let mut results = Vec::new();
        for _ in 0..6 {
            results.push(recv_blocking(&mut pool));
        }
        results.sort_unstable();
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10]);
        assert_eq!(pool.outstanding_jobs(), 0);
        pool.shutdown();
    }

    #[test]
    fn dispatch_idle_returns_job_when_saturated() {
        let mut pool: WorkerPool<u32, u32> = WorkerPool::new("slow", 1, |n| {
            std::thread::sleep(Duration::from_millis(50));
            n
        });
        assert!(pool.dispatch_idle(1).is_ok());
        // Single worker is now busy.
        assert_eq!(pool.dispatch_idle(2), Err(2));
        assert!(!pool.has_idle_worker());
        let _ = recv_blocking(&mut pool);
        assert!(pool.has_idle_worker());
        pool.shutdown();
    }
}
