use std::sync::Arc;

use stampede_core::prelude::{ShutdownHandle, StopReason};
use tokio::signal;

use crate::context::stop_run;
use crate::engine::LoadEngine;

/// Stop the run on Ctrl-C.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
    engine: Arc<dyn LoadEngine>,
) {
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C, the run can only end by itself: {e:?}");
            return;
        }

        println!("Received shutdown signal, shutting down...");
        stop_run(&shutdown_handle, engine.as_ref(), StopReason::Interrupted);
    });
}
