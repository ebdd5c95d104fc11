//! Async channel bridge between the Tokio runtime and the controller thread
//!
//! The device controller lives on one dedicated thread. Everything that wants
//! to change its state (socket connections, the signal handler) posts a
//! [`ControllerCommand`] through this bridge and waits for the
//! acknowledgement, so commands from every source are applied one at a time
//! in arrival order.

use async_channel::{Receiver, Sender, TryRecvError, bounded};
use protocol::Action;
use tokio::sync::oneshot;

/// Commands from the Tokio runtime to the controller thread
#[derive(Debug)]
pub enum ControllerCommand {
    /// Apply a decoded IPC request
    Apply {
        /// Enable or Disable(vendor, product)
        action: Action,
        /// Fired once the action has been applied to controller state
        response: oneshot::Sender<()>,
    },

    /// Release everything and stop the event loop
    Shutdown {
        /// Fired once teardown has completed
        response: oneshot::Sender<()>,
    },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct ControllerBridge {
    cmd_tx: Sender<ControllerCommand>,
}

impl ControllerBridge {
    /// Send a command to the controller thread
    pub async fn send_command(&self, cmd: ControllerCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Apply an action and wait until the controller has processed it
    pub async fn apply(&self, action: Action) -> crate::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ControllerCommand::Apply {
            action,
            response: tx,
        })
        .await?;
        rx.await
            .map_err(|e| crate::Error::Channel(format!("controller dropped request: {}", e)))
    }

    /// Ask the controller to tear down and wait for completion
    pub async fn shutdown(&self) -> crate::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_command(ControllerCommand::Shutdown { response: tx })
            .await?;
        rx.await
            .map_err(|e| crate::Error::Channel(format!("controller dropped shutdown: {}", e)))
    }
}

/// Handle for the controller thread (blocking)
pub struct ControllerWorker {
    cmd_rx: Receiver<ControllerCommand>,
}

impl ControllerWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<ControllerCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    ///
    /// Returns an error once every [`ControllerBridge`] has been dropped and
    /// the queue is empty.
    pub fn try_recv_command(&self) -> crate::Result<Option<ControllerCommand>> {
        match self.cmd_rx.try_recv() {
            Ok(cmd) => Ok(Some(cmd)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => Err(crate::Error::Channel(
                "all controller bridges dropped".to_string(),
            )),
        }
    }
}

/// Create the channel bridge between Tokio and the controller thread
///
/// Returns (ControllerBridge for Tokio, ControllerWorker for the controller thread)
pub fn create_controller_bridge() -> (ControllerBridge, ControllerWorker) {
    let (cmd_tx, cmd_rx) = bounded(64);

    (ControllerBridge { cmd_tx }, ControllerWorker { cmd_rx })
}
