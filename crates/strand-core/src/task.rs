//! Periodic task contract
//!
//! Periodic jobs carry no descriptor. The multiplexer runs them no sooner
//! than `interval` after their previous start, on any worker.

use crate::id::JobId;

/// What a periodic task wants after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Back to Waiting until the next interval elapses
    Again,
    /// One-shot: purge the job after this run
    Done,
}

/// Information handed to each run
#[derive(Debug, Clone, Copy)]
pub struct TaskContext {
    /// Job running this task
    pub job: JobId,
    /// Zero-based run counter
    pub run: u64,
    /// Worker executing the run
    pub worker: usize,
}

/// A schedulable background task
pub trait PeriodicTask: Send {
    fn run(&mut self, ctx: &TaskContext) -> Cycle;

    fn name(&self) -> &str {
        "periodic"
    }
}

impl<F> PeriodicTask for F
where
    F: FnMut(&TaskContext) -> Cycle + Send,
{
    fn run(&mut self, ctx: &TaskContext) -> Cycle {
        self(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_task() {
        let mut runs = 0;
        let mut task = |ctx: &TaskContext| {
            runs += 1;
            if ctx.run >= 1 { Cycle::Done } else { Cycle::Again }
        };
        let ctx = TaskContext { job: JobId::from_raw(1), run: 0, worker: 0 };
        assert_eq!(PeriodicTask::run(&mut task, &ctx), Cycle::Again);
        let ctx = TaskContext { run: 1, ..ctx };
        assert_eq!(PeriodicTask::run(&mut task, &ctx), Cycle::Done);
        assert_eq!(runs, 2);
    }
}
