//! Multi-priority cooperative scheduler (spec §4.2): `Job`, `JobPool`,
//! `ThreadWorker`, `ThreadPool`. Workers are genuine OS threads blocking
//! on a `Condvar`, not async tasks — spec §5 is explicit that a worker
//! "never busy-waits" and wakes only via the pool's notification path,
//! which maps onto a monitor (mutex + condvar), not a runtime scheduler.

mod pool;
mod spill;
mod thread_pool;
mod worker;

pub use pool::JobPool;
pub use spill::{SpillPolicy, TempDirSpill};
pub use thread_pool::ThreadPool;
pub use worker::ThreadWorker;

use crate::error::Result;
use std::fmt;

/// Totally ordered job priorities (spec §4.2: `top > high > normal >
/// low`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Top,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Top, Priority::High, Priority::Normal, Priority::Low];
}

/// The callable shape a job carries, per spec §4.2's three forms.
pub enum Work {
    /// A bare callable taking no arguments.
    Void(Box<dyn FnOnce() -> bool + Send>),
    /// A callable taking the job's own (possibly spilled/reloaded) byte
    /// payload.
    Bytes(Box<dyn FnOnce(Vec<u8>) -> bool + Send>),
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Work::Void(_) => write!(f, "Work::Void"),
            Work::Bytes(_) => write!(f, "Work::Bytes"),
        }
    }
}

/// A unit of work submitted to a [`JobPool`].
///
/// A job may carry its payload already spilled to disk (see
/// [`spill`]); `work` transparently reloads it before invoking the
/// callable. Spilling is an execution hint: it never changes what the
/// job does, only where its bytes live between push and run.
pub struct Job {
    pub priority: Priority,
    work: Work,
    spilled: Option<Box<dyn SpillPolicy>>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("priority", &self.priority)
            .field("work", &self.work)
            .field("spilled", &self.spilled.is_some())
            .finish()
    }
}

impl Job {
    pub fn void(priority: Priority, f: impl FnOnce() -> bool + Send + 'static) -> Job {
        Job {
            priority,
            work: Work::Void(Box::new(f)),
            spilled: None,
        }
    }

    pub fn with_bytes(
        priority: Priority,
        data: Vec<u8>,
        f: impl FnOnce(Vec<u8>) -> bool + Send + 'static,
    ) -> Job {
        Job {
            priority,
            work: Work::Bytes(Box::new(move |bytes| f(bytes))),
            spilled: Some(Box::new(spill::InMemory::new(data))),
        }
    }

    /// Writes this job's payload out to a temp file rather than holding
    /// it resident until run (spec §4.2, §9 "spillable job"). Only
    /// meaningful for [`Work::Bytes`] jobs; a no-op for [`Work::Void`].
    pub fn spill_to_disk(mut self) -> Result<Job> {
        if let Some(current) = self.spilled.take() {
            let data = current.load();
            let label = match self.priority {
                Priority::Top => "top",
                Priority::High => "high",
                Priority::Normal => "normal",
                Priority::Low => "low",
            };
            self.spilled = Some(Box::new(TempDirSpill::save(label, data)?));
        }
        Ok(self)
    }

    /// Runs the job: reloads spilled bytes (if any), invokes the user
    /// callable, and destroys the spill file. User panics are caught so
    /// a single bad job cannot take down its worker (spec §4.2: "the job
    /// returns failure and the worker continues").
    pub fn run(self) -> bool {
        let Job { work, spilled, .. } = self;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match work {
            Work::Void(f) => f(),
            Work::Bytes(f) => {
                let bytes = spilled.map(|s| s.load()).unwrap_or_default();
                f(bytes)
            }
        }));
        result.unwrap_or_else(|_| {
            tracing::error!("job callable panicked; marking failed");
            false
        })
    }
}
