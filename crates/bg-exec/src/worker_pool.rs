//! Bounded worker pool (`spec.md` §4.7 "Scheduling model", §5). The
//! coordinator is the only thread that ever touches the graph; workers only
//! run commands and report a [`JobResult`] back (`spec.md` §5 "Shared
//! resources").
//!
//! Grounded on the teacher's own crossbeam usage
//! (`codegraph-concurrent::mpmc::LockFreeMpmcQueue`, built on
//! `crossbeam_queue::ArrayQueue`): the dispatch side here uses
//! `crossbeam-channel` instead of a raw queue because jobs need a blocking,
//! multi-consumer receive rather than a spin-loop `try_pop`, but the spirit
//! — a small lock-free handoff primitive owned by this crate, not a
//! generic thread-pool dependency — is the same.

use crate::error::Result;
use crate::runner::CommandRunner;
use bg_core::{Command, TransformerId};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct Job {
    pub transformer: TransformerId,
    pub commands: Vec<Command>,
    pub environment: BTreeMap<String, String>,
}

pub struct JobResult {
    pub transformer: TransformerId,
    pub outcome: Result<()>,
}

pub struct WorkerPool {
    job_tx: Sender<Job>,
    result_rx: Receiver<JobResult>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` OS threads sharing one dispatch channel (so
    /// "pop leaves while workers are available" maps onto ordinary MPMC
    /// receive) and one results channel back to the coordinator.
    pub fn spawn<R: CommandRunner + 'static>(worker_count: usize, runner: Arc<R>) -> Self {
        let worker_count = worker_count.max(1);
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(worker_count * 4);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<JobResult>();

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let runner = runner.clone();
            handles.push(std::thread::spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    let outcome = run_job(&*runner, &job);
                    if result_tx.send(JobResult { transformer: job.transformer, outcome }).is_err() {
                        break;
                    }
                }
            }));
        }

        Self { job_tx, result_rx, handles }
    }

    pub fn dispatch(&self, job: Job) {
        // The coordinator never dispatches more jobs than it has observed
        // free worker slots for, so a blocking send here never stalls the
        // scheduling loop beyond a worker becoming free.
        let _ = self.job_tx.send(job);
    }

    pub fn results(&self) -> &Receiver<JobResult> {
        &self.result_rx
    }

    /// Stops accepting new jobs and waits for every worker thread to drain
    /// its current job (`spec.md` §4.7 "Cancellation", §5).
    pub fn shutdown(self) {
        drop(self.job_tx);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn run_job<R: CommandRunner + ?Sized>(runner: &R, job: &Job) -> Result<()> {
    for command in &job.commands {
        let outcome = runner.run(command, &job.environment)?;
        let max_exit_code = match command {
            Command::Process(p) => p.max_exit_code,
            Command::Script(_) => 0,
        };
        if !outcome.is_success(max_exit_code) {
            return Err(crate::error::ExecutorError::CommandFailed {
                transformer: job.transformer,
                code: outcome.exit_code,
                max_allowed: max_exit_code,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutcome;
    use bg_core::{ProcessCommand, ScriptCommand};

    struct AlwaysOk;
    impl CommandRunner for AlwaysOk {
        fn run_process(&self, _: &ProcessCommand, _: &BTreeMap<String, String>) -> Result<CommandOutcome> {
            Ok(CommandOutcome { exit_code: 0 })
        }
        fn run_script(&self, _: &ScriptCommand) -> Result<CommandOutcome> {
            Ok(CommandOutcome { exit_code: 0 })
        }
    }

    #[test]
    fn dispatched_job_reports_success() {
        let pool = WorkerPool::spawn(2, Arc::new(AlwaysOk));
        pool.dispatch(Job {
            transformer: TransformerId(0),
            commands: vec![Command::Process(ProcessCommand::new("noop", "."))],
            environment: BTreeMap::new(),
        });
        let result = pool.results().recv().unwrap();
        assert_eq!(result.transformer, TransformerId(0));
        assert!(result.outcome.is_ok());
        pool.shutdown();
    }
}
