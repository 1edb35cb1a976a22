//! Control command bus.
//!
//! Commands are enqueued from async surfaces (or tests) and drained by the
//! simulation driver strictly between steps; an in-flight step always runs
//! to completion.

use crate::{Engine, EngineParams};
use crossfire::{MAsyncTx, MRx, TryRecvError, detect_backoff_cfg, mpmc};
use tracing::{debug, warn};

/// Commands accepted between steps.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Resume stepping.
    Start,
    /// Suspend stepping; the engine state stays queryable.
    Pause,
    /// Re-seed and re-randomise from the stored seed.
    Reset,
    /// Swap the parameter block at the next step boundary.
    UpdateParams(Box<EngineParams>),
}

pub type CommandSender = MAsyncTx<EngineCommand>;
pub type CommandReceiver = MRx<EngineCommand>;

/// Create the bounded command bus shared by control surfaces.
pub fn create_command_bus(capacity: usize) -> (CommandSender, CommandReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_tx_async_rx_blocking(capacity)
}

/// Apply every queued command to the engine. Called between steps.
pub fn drain_pending_commands(receiver: &CommandReceiver, engine: &mut Engine) {
    loop {
        match receiver.try_recv() {
            Ok(EngineCommand::Start) => {
                debug!("resuming simulation via control command");
                engine.set_running(true);
            }
            Ok(EngineCommand::Pause) => {
                debug!("pausing simulation via control command");
                engine.set_running(false);
            }
            Ok(EngineCommand::Reset) => {
                debug!("resetting simulation via control command");
                engine.reset();
            }
            Ok(EngineCommand::UpdateParams(params)) => {
                debug!("applying parameter update via control command");
                if let Err(err) = engine.update_params(*params) {
                    warn!(%err, "rejected parameter update");
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}
