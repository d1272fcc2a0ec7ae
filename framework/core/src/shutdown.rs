use std::sync::{Arc, OnceLock};

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

use crate::stop::StopReason;

#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<StopReason>,
    reason: Arc<OnceLock<StopReason>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(8).0,
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Signal every listener to stop.
    ///
    /// Returns `true` if this call recorded the stop reason, and `false` if the run was already
    /// stopping. Callers use this to make sure a stop command is only issued once.
    pub fn shutdown(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        if !first {
            log::debug!(
                "Ignoring stop reason [{reason}], already stopping because of [{}]",
                self.reason().unwrap_or(reason)
            );
            return false;
        }

        if let Err(e) = self.sender.send(reason) {
            // Will fail if nobody is listening for a shutdown signal, in which case the log message
            // can be ignored.
            log::warn!("Failed to send shutdown signal: {e:?}");
        }

        true
    }

    /// The reason recorded by the first call to [ShutdownHandle::shutdown], if any.
    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe(), self.reason.clone())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<StopReason>>>,
    reason: Arc<OnceLock<StopReason>>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<StopReason>, reason: Arc<OnceLock<StopReason>>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            reason,
        }
    }

    /// Point in time check if the shutdown signal has been received. If this returns true then the
    /// loop holding this listener should exit.
    ///
    /// A listener created after the signal was sent still sees it.
    pub fn should_shutdown(&mut self) -> bool {
        if self.reason.get().is_some() {
            return true;
        }

        match self.receiver.try_lock() {
            Ok(mut guard) => match guard.try_recv() {
                Ok(_) => true,
                Err(TryRecvError::Closed) => true,
                // If the receiver is empty or lagged then we should not shutdown.
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// Wait for the shutdown signal and return the reason the run is stopping. It is safe to race
    /// this with another future so that the signal can be used to cancel other work in progress.
    pub async fn wait_for_shutdown(&mut self) -> StopReason {
        if let Some(reason) = self.reason.get() {
            return *reason;
        }

        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Ok(reason) => return self.reason.get().copied().unwrap_or(reason),
                Err(RecvError::Lagged(_)) => {
                    if let Some(reason) = self.reason.get() {
                        return *reason;
                    }
                }
                Err(RecvError::Closed) => {
                    return self.reason.get().copied().unwrap_or(StopReason::Interrupted);
                }
            }
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
#[display("Execution cancelled by shutdown signal ({reason})")]
pub struct ShutdownSignalError {
    reason: StopReason,
}

impl ShutdownSignalError {
    pub fn new(reason: StopReason) -> Self {
        Self { reason }
    }

    pub fn reason(&self) -> StopReason {
        self.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reason_wins() {
        let handle = ShutdownHandle::new();
        assert!(handle.shutdown(StopReason::MasterGone));
        assert!(!handle.shutdown(StopReason::Interrupted));
        assert_eq!(Some(StopReason::MasterGone), handle.reason());
    }

    #[test]
    fn late_listener_sees_earlier_shutdown() {
        let handle = ShutdownHandle::new();
        let mut early = handle.new_listener();
        assert!(!early.should_shutdown());

        handle.shutdown(StopReason::StagesExhausted);

        let mut late = handle.new_listener();
        assert!(early.should_shutdown());
        assert!(late.should_shutdown());
    }

    #[tokio::test]
    async fn wait_for_shutdown_returns_reason() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        let sender = handle.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            sender.shutdown(StopReason::RampDownComplete);
        });

        assert_eq!(StopReason::RampDownComplete, listener.wait_for_shutdown().await);
    }

    #[test]
    fn signal_error_names_reason() {
        let err = ShutdownSignalError::new(StopReason::Interrupted);
        assert_eq!(
            "Execution cancelled by shutdown signal (interrupted)",
            err.to_string()
        );
    }
}
