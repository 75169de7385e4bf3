//! Blocking scan work that Ctrl-C can stop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::types::HatError;

/// How the blocking work ended.
#[derive(Debug, PartialEq)]
pub enum WorkerExit<T> {
    Finished(T),
    /// The work ignored the stop flag past the grace period and was left running
    Abandoned,
}

/// Run `work` on a blocking thread until it returns or `interrupt` resolves.
///
/// On interrupt the stop flag handed to `work` is raised and the work gets
/// `grace` to return. After that it is abandoned: the runtime shuts down
/// without waiting for the thread, so the caller can exit even while a driver
/// call is stuck.
pub fn run_interruptible<T, W, I, F>(
    work: W,
    interrupt: I,
    grace: Duration,
) -> Result<WorkerExit<T>, HatError>
where
    T: Send + 'static,
    W: FnOnce(Arc<AtomicBool>) -> T + Send + 'static,
    I: FnOnce() -> F,
    F: Future<Output = ()>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let worker_flag = stop_flag.clone();

    let exit = runtime.block_on(async move {
        let mut task = tokio::task::spawn_blocking(move || work(worker_flag));

        tokio::select! {
            joined = &mut task => joined.map(WorkerExit::Finished),
            _ = interrupt() => {
                stop_flag.store(true, Ordering::Relaxed);
                info!("Interrupt received, stopping the scan");

                match tokio::time::timeout(grace, &mut task).await {
                    Ok(joined) => joined.map(WorkerExit::Finished),
                    Err(_) => {
                        warn!("Scan did not stop within {:?}, abandoning it", grace);
                        Ok(WorkerExit::Abandoned)
                    }
                }
            }
        }
    });

    // a stuck blocking thread must not hold the process open
    runtime.shutdown_timeout(Duration::ZERO);

    exit.map_err(|e| HatError::Other(format!("scan worker failed: {}", e)))
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_finished_work_returns_its_value() {
        let exit = run_interruptible(
            |_stop| 42,
            || std::future::pending::<()>(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(exit, WorkerExit::Finished(42));
    }

    #[test]
    fn test_interrupted_work_sees_stop_flag() {
        let exit = run_interruptible(
            |stop: Arc<AtomicBool>| {
                while !stop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(1));
                }
                "stopped"
            },
            || tokio::time::sleep(Duration::from_millis(20)),
            Duration::from_secs(2),
        )
        .unwrap();
        assert_eq!(exit, WorkerExit::Finished("stopped"));
    }

    #[test]
    fn test_stuck_work_is_abandoned_without_waiting() {
        let started = Instant::now();
        let exit = run_interruptible(
            |_stop| thread::sleep(Duration::from_secs(3)),
            || tokio::time::sleep(Duration::from_millis(20)),
            Duration::from_millis(200),
        )
        .unwrap();

        assert_eq!(exit, WorkerExit::Abandoned);
        // the runtime is gone well before the 3 s worker finishes
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
