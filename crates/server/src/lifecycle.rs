//! Process lifecycle
//!
//! Waits for a termination signal and runs the controller teardown on the
//! controller's own event loop.

use anyhow::{Context, Result};
use common::ControllerBridge;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::info;

/// Termination signal that ended the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Interrupt => write!(f, "SIGINT"),
            Termination::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// SIGINT and SIGTERM handlers
///
/// Signals arriving between [`TerminationSignals::install`] and
/// [`TerminationSignals::wait`] are kept, not lost to the default action.
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl TerminationSignals {
    /// Replace the default actions; must run inside a Tokio runtime
    pub fn install() -> Result<Self> {
        let interrupt =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        Ok(Self {
            interrupt,
            terminate,
        })
    }

    /// Wait for SIGINT or SIGTERM
    pub async fn wait(&mut self) -> Termination {
        let received = tokio::select! {
            _ = self.interrupt.recv() => Termination::Interrupt,
            _ = self.terminate.recv() => Termination::Terminate,
        };

        info!("Received {}, shutting down gracefully...", received);
        received
    }
}

/// Release the device and the watcher, then stop the controller loop
///
/// Returns once the controller has finished its cleanup.
pub async fn teardown(bridge: &ControllerBridge) -> Result<()> {
    bridge
        .shutdown()
        .await
        .context("Failed to shut down device controller")?;
    info!("Device controller released everything");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::mock::{MockCapability, MockDevice};
    use crate::worker::spawn_controller_worker;
    use common::create_controller_bridge;
    use protocol::Action;
    use std::time::Duration;

    #[tokio::test]
    async fn test_teardown_returns_device_and_stops_worker() {
        let (bridge, worker) = create_controller_bridge();
        let mock = MockCapability::new();
        mock.plug(MockDevice::keyboard(2, 9, 1050, 407));
        let handle =
            spawn_controller_worker(worker, mock.clone(), Duration::from_millis(5)).unwrap();

        bridge
            .apply(Action::Disable {
                vendor_id: 1050,
                product_id: 407,
            })
            .await
            .unwrap();
        assert_eq!(mock.open_handles(), 1);

        teardown(&bridge).await.unwrap();
        handle.join().unwrap();

        assert_eq!(mock.open_handles(), 0);
        assert_eq!(mock.active_watches(), 0);

        // A second teardown finds no controller to talk to
        assert!(teardown(&bridge).await.is_err());
    }

    #[tokio::test]
    async fn test_signal_before_wait_is_not_lost() {
        let mut signals = TerminationSignals::install().unwrap();

        nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), signals.wait())
            .await
            .unwrap();
        assert_eq!(received, Termination::Terminate);
    }

    #[test]
    fn test_termination_display() {
        assert_eq!(Termination::Interrupt.to_string(), "SIGINT");
        assert_eq!(Termination::Terminate.to_string(), "SIGTERM");
    }
}
