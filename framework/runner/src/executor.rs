use std::future::Future;

use stampede_core::prelude::{ShutdownHandle, ShutdownSignalError, StopReason};

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, shutdown_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            shutdown_handle,
        }
    }

    pub(crate) fn runtime(&self) -> &tokio::runtime::Runtime {
        &self.runtime
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// The future is cancelled if the run is stopped, and a [ShutdownSignalError] carrying the stop
    /// reason is returned instead. Use this for work that has no value once the run is over, such
    /// as waiting for workers to connect.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                reason = shutdown_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::new(reason)))
                },
            }
        })
    }

    /// Run async code to completion, even if the run is stopped while it is in progress.
    ///
    /// The loops of a run watch for the stop themselves, and the final report still has to be
    /// written after the stop.
    pub fn run_to_completion<T>(&self, fut: impl Future<Output = T>) -> T {
        self.runtime.block_on(fut)
    }
}

/// The stop reason, if `err` was caused by the run being stopped.
pub(crate) fn stop_reason_of(err: &anyhow::Error) -> Option<StopReason> {
    err.downcast_ref::<ShutdownSignalError>()
        .map(ShutdownSignalError::reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn executor() -> (Executor, ShutdownHandle) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = ShutdownHandle::new();
        (Executor::new(runtime, handle.clone()), handle)
    }

    #[test]
    fn execute_in_place_returns_result() {
        let (executor, _handle) = executor();
        let value = executor.execute_in_place(async { Ok(7) }).unwrap();
        assert_eq!(7, value);
    }

    #[test]
    fn execute_in_place_is_cancelled_by_stop() {
        let (executor, handle) = executor();
        handle.shutdown(StopReason::Interrupted);

        let err = executor
            .execute_in_place(std::future::pending::<anyhow::Result<()>>())
            .unwrap_err();

        assert_eq!(Some(StopReason::Interrupted), stop_reason_of(&err));
    }

    #[test]
    fn other_errors_are_not_stops() {
        let (executor, _handle) = executor();
        let err = executor
            .execute_in_place(async { Err::<(), _>(anyhow::anyhow!("boom")).context("outer") })
            .unwrap_err();
        assert_eq!(None, stop_reason_of(&err));
    }
}
