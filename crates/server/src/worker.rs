//! Controller worker thread
//!
//! The helper's single event loop. One dedicated thread owns the
//! [`DeviceController`] and its capability, and alternates between:
//! 1. Draining commands posted by the IPC listener and the signal handler
//! 2. Pumping device notifications from the capability (bounded wait)
//!
//! Every state transition happens here, so the controller needs no locks,
//! and a command is fully applied before it is acknowledged.

use crate::controller::{DeviceCapability, DeviceController, DeviceEvent};
use common::{ControllerCommand, ControllerWorker};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default wait inside one event-pump iteration
pub const DEFAULT_EVENT_TICK: Duration = Duration::from_millis(100);

/// Controller worker thread
pub struct ControllerWorkerThread<C: DeviceCapability> {
    controller: DeviceController<C>,
    worker: ControllerWorker,
    tick: Duration,
}

impl<C: DeviceCapability> ControllerWorkerThread<C> {
    pub fn new(worker: ControllerWorker, capability: C, tick: Duration) -> Self {
        Self {
            controller: DeviceController::new(capability),
            worker,
            tick,
        }
    }

    /// Run until a Shutdown command arrives or every bridge is dropped
    ///
    /// Both exits release the device and the watcher before returning.
    pub fn run(mut self) {
        info!("Controller worker started");

        loop {
            loop {
                match self.worker.try_recv_command() {
                    Ok(Some(ControllerCommand::Shutdown { response })) => {
                        info!("Controller worker shutting down");
                        self.controller.shutdown();
                        let _ = response.send(());
                        info!("Controller worker stopped");
                        return;
                    }
                    Ok(Some(cmd)) => self.handle_command(cmd),
                    Ok(None) => break,
                    Err(e) => {
                        info!("Command channel closed ({}), shutting down", e);
                        self.controller.shutdown();
                        return;
                    }
                }
            }

            match self.controller.capability_mut().poll_events(self.tick) {
                Ok(events) => {
                    for event in events {
                        self.handle_event(event);
                    }
                }
                Err(e) => {
                    warn!("Error handling device events: {}", e);
                    std::thread::sleep(self.tick);
                }
            }
        }
    }

    /// Handle a command, surviving a panic inside the controller
    fn handle_command(&mut self, cmd: ControllerCommand) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in controller command handler: {:?}", e);
        }
    }

    fn handle_command_inner(&mut self, cmd: ControllerCommand) {
        match cmd {
            ControllerCommand::Apply { action, response } => {
                debug!("Applying {:?}", action);
                self.controller.apply(action);
                debug!("Controller state now {:?}", self.controller.state());
                let _ = response.send(());
            }
            ControllerCommand::Shutdown { .. } => {
                // Handled in run()
                unreachable!()
            }
        }
    }

    fn handle_event(&mut self, event: DeviceEvent<C::Device>) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.controller.handle_event(event)
        }));

        if let Err(e) = result {
            error!("Panic in device event handler: {:?}", e);
        }
    }
}

/// Spawn the controller worker thread
pub fn spawn_controller_worker<C>(
    worker: ControllerWorker,
    capability: C,
    tick: Duration,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    C: DeviceCapability + Send + 'static,
{
    std::thread::Builder::new()
        .name("controller-worker".to_string())
        .spawn(move || ControllerWorkerThread::new(worker, capability, tick).run())
}
