/// Why a run, or one of its loops, came to an end.
///
/// The first reason recorded on a [crate::prelude::ShutdownHandle] wins, so this is also the reason
/// that ends up in the logs for the whole run.
#[derive(derive_more::Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Active users rose above zero and then dropped back to zero.
    #[display("ramp-down complete")]
    RampDownComplete,
    /// The shape controller ran out of stages.
    #[display("stage schedule exhausted")]
    StagesExhausted,
    /// The configured maximum runtime elapsed.
    #[display("maximum runtime exceeded")]
    MaxRuntimeExceeded,
    /// The orchestrator reports that the master task is gone.
    #[display("master task gone")]
    MasterGone,
    /// The load engine stopped by itself, usually because the master told it to quit.
    #[display("engine stopped")]
    EngineStopped,
    /// The process received an interrupt.
    #[display("interrupted")]
    Interrupted,
}
