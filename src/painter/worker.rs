//! Worker threads and the multithreaded command handoff.
//!
//! Threads come from a process-wide pool and stay parked between painters.
//! While a painter is multithreaded, each acquired thread runs one
//! long-lived worker task with a fixed `(offset, delta)` lattice
//! assignment. Workers drain the shared command ring in publication order;
//! commands are not broadcast on post. Workers that have caught up sleep
//! on `commands_ready` until a flush (explicit, or forced by a full ring)
//! wakes them. The worker state machine is Idle → Running → Idle → … →
//! Quitting → Dead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use crossbeam_channel::{unbounded, Sender};

use super::command::{Command, RASTER_MAX_COMMANDS};
use super::engine::RenderContext;
use crate::surface::RasterTarget;

/// Hard cap on painter workers, independent of core count.
pub(crate) const RASTER_MAX_THREADS: usize = 4;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to one parked pool thread.
pub(crate) struct PoolThread {
    jobs: Sender<Job>,
}

impl PoolThread {
    pub(crate) fn post(&self, job: impl FnOnce() + Send + 'static) {
        // The receiver lives for the whole process; a send only fails
        // during shutdown, when the work no longer matters.
        let _ = self.jobs.send(Box::new(job));
    }
}

/// Process-wide thread pool. Threads are created on demand and returned
/// here when a painter leaves multithreaded mode.
pub(crate) struct ThreadPool {
    idle: Mutex<Vec<PoolThread>>,
}

static POOL: OnceLock<ThreadPool> = OnceLock::new();

impl ThreadPool {
    pub(crate) fn global() -> &'static ThreadPool {
        POOL.get_or_init(|| ThreadPool {
            idle: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn acquire(&self) -> PoolThread {
        if let Some(thread) = self.idle.lock().unwrap().pop() {
            return thread;
        }
        let (tx, rx) = unbounded::<Job>();
        let spawned = std::thread::Builder::new()
            .name("lienzo-worker".into())
            .spawn(move || {
                for job in rx.iter() {
                    job();
                }
            });
        if let Err(err) = spawned {
            // Leave the channel without a consumer; posts become no-ops.
            log::warn!("failed to spawn pool thread: {err}");
        }
        PoolThread { jobs: tx }
    }

    pub(crate) fn release(&self, thread: PoolThread) {
        self.idle.lock().unwrap().push(thread);
    }
}

/// State behind the ring lock.
pub(crate) struct RingState {
    pub(crate) slots: Vec<Option<Arc<Command>>>,
    /// Next command index per worker.
    pub(crate) current: Vec<usize>,
    /// Which workers are idle; `completed_threads` is its count.
    idle: Vec<bool>,
    pub(crate) completed_threads: usize,
    finished_threads: usize,
    should_quit: bool,
}

/// Everything shared between the producer and the workers.
pub(crate) struct MtShared {
    pub(crate) worker_count: usize,
    pub(crate) target: RasterTarget,
    pub(crate) ring: Mutex<RingState>,
    pub(crate) commands_ready: Condvar,
    pub(crate) commands_complete: Condvar,
    pub(crate) release_event: Condvar,
    /// Publication index; stored with release after the slot is written.
    pub(crate) commands_position: AtomicUsize,
}

impl MtShared {
    pub(crate) fn new(worker_count: usize, target: RasterTarget) -> Arc<Self> {
        Arc::new(Self {
            worker_count,
            target,
            ring: Mutex::new(RingState {
                slots: (0..RASTER_MAX_COMMANDS).map(|_| None).collect(),
                current: vec![0; worker_count],
                idle: vec![false; worker_count],
                completed_threads: 0,
                finished_threads: 0,
                should_quit: false,
            }),
            commands_ready: Condvar::new(),
            commands_complete: Condvar::new(),
            release_event: Condvar::new(),
            commands_position: AtomicUsize::new(0),
        })
    }

    /// Publishes a command: slot write first, then the release-increment
    /// of the position counter. Callers must flush when the ring is full.
    pub(crate) fn publish(&self, cmd: Command) {
        let pos = self.commands_position.load(Ordering::Relaxed);
        debug_assert!(pos < RASTER_MAX_COMMANDS);
        {
            let mut ring = self.ring.lock().unwrap();
            ring.slots[pos] = Some(Arc::new(cmd));
        }
        self.commands_position.store(pos + 1, Ordering::Release);
    }

    pub(crate) fn is_full(&self) -> bool {
        self.commands_position.load(Ordering::Relaxed) == RASTER_MAX_COMMANDS
    }

    /// Drains every published command and resets the ring to position 0.
    pub(crate) fn flush(&self) {
        let pos = self.commands_position.load(Ordering::Relaxed);
        if pos == 0 {
            return;
        }
        let mut ring = self.ring.lock().unwrap();
        self.commands_ready.notify_all();
        while !(ring.completed_threads == self.worker_count
            && ring.current.iter().all(|&c| c == pos))
        {
            ring = self.commands_complete.wait(ring).unwrap();
        }
        for slot in ring.slots[..pos].iter_mut() {
            *slot = None;
        }
        for current in ring.current.iter_mut() {
            *current = 0;
        }
        self.commands_position.store(0, Ordering::Release);
    }

    /// Asks every worker to exit and waits for the last one.
    pub(crate) fn quit(&self) {
        let mut ring = self.ring.lock().unwrap();
        ring.should_quit = true;
        self.commands_ready.notify_all();
        while ring.finished_threads < self.worker_count {
            ring = self.release_event.wait(ring).unwrap();
        }
    }
}

/// The long-running task each pool thread executes while the painter is
/// multithreaded.
pub(crate) fn worker_main(shared: Arc<MtShared>, index: usize) {
    let mut ctx = RenderContext::new(shared.target, index as i32, shared.worker_count as i32);
    let mut ring = shared.ring.lock().unwrap();
    loop {
        let position = shared.commands_position.load(Ordering::Acquire);
        if ring.current[index] < position {
            if ring.idle[index] {
                ring.idle[index] = false;
                ring.completed_threads -= 1;
            }
            let slot = ring.current[index];
            let cmd = ring.slots[slot].clone().expect("published command missing");
            drop(ring);
            ctx.render_command(&cmd);
            drop(cmd);
            ring = shared.ring.lock().unwrap();
            ring.current[index] += 1;
            continue;
        }

        if !ring.idle[index] {
            ring.idle[index] = true;
            ring.completed_threads += 1;
            if ring.completed_threads == shared.worker_count {
                shared.commands_complete.notify_all();
            }
        }
        if ring.should_quit {
            ring.finished_threads += 1;
            if ring.finished_threads == shared.worker_count {
                shared.release_event.notify_all();
            }
            return;
        }
        ring = shared.commands_ready.wait(ring).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_released_threads() {
        let pool = ThreadPool::global();
        let a = pool.acquire();
        let (tx, rx) = unbounded::<u32>();
        a.post(move || {
            let _ = tx.send(7);
        });
        assert_eq!(rx.recv().unwrap(), 7);
        pool.release(a);
        let b = pool.acquire();
        let (tx, rx) = unbounded::<u32>();
        b.post(move || {
            let _ = tx.send(9);
        });
        assert_eq!(rx.recv().unwrap(), 9);
        pool.release(b);
    }
}
