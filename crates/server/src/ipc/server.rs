//! Unix socket listener
//!
//! Binds the helper's named endpoint and spawns a [`Connection`] task for
//! every accepted peer. Connection tasks are owned by the server: when the
//! server is dropped, they are aborted and the socket file is removed.

use super::connection::Connection;
use common::ControllerBridge;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Local IPC server for the helper
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    bridge: ControllerBridge,
}

impl IpcServer {
    /// Bind the endpoint at `socket_path` with permission bits `mode`
    ///
    /// A stale socket file is removed first and the parent directory is
    /// created if needed. Fails with `AddrInUse` when another process is
    /// still accepting on `socket_path`. Must be called from within a Tokio
    /// runtime.
    pub fn bind(socket_path: &Path, mode: u32, bridge: ControllerBridge) -> io::Result<Self> {
        if socket_path.exists() {
            if StdUnixStream::connect(socket_path).is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!(
                        "another helper is listening on {}",
                        socket_path.display()
                    ),
                ));
            }
            debug!("Removing stale socket {}", socket_path.display());
            fs::remove_file(socket_path)?;
        }

        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        fs::set_permissions(socket_path, fs::Permissions::from_mode(mode))?;

        info!(
            "IPC server listening on {} (mode {:o})",
            socket_path.display(),
            mode
        );

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            bridge,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until the task running this future is dropped
    pub async fn run(self) {
        info!("Waiting for connections...");

        let mut connections = JoinSet::new();
        let mut next_id: u64 = 1;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let connection = Connection::new(next_id, stream, self.bridge.clone());
                        next_id += 1;
                        connections.spawn(connection.run());
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!("Connection task failed: {}", e);
                    }
                }
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.socket_path) {
            debug!(
                "Could not remove socket {}: {}",
                self.socket_path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::mock::{MockCapability, MockDevice};
    use crate::worker::spawn_controller_worker;
    use common::create_controller_bridge;
    use protocol::{IpcClient, IpcRequest, ProtocolError};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    const TICK: Duration = Duration::from_millis(5);

    struct Harness {
        _dir: TempDir,
        socket_path: PathBuf,
        mock: MockCapability,
        bridge: ControllerBridge,
        server: tokio::task::JoinHandle<()>,
        worker: std::thread::JoinHandle<()>,
    }

    impl Harness {
        fn start(mock: MockCapability) -> Self {
            let dir = TempDir::new().unwrap();
            let socket_path = dir.path().join("run").join("helper.sock");
            let (bridge, worker) = create_controller_bridge();
            let worker = spawn_controller_worker(worker, mock.clone(), TICK).unwrap();
            let server = IpcServer::bind(&socket_path, 0o660, bridge.clone()).unwrap();
            let server = tokio::spawn(server.run());

            Self {
                _dir: dir,
                socket_path,
                mock,
                bridge,
                server,
                worker,
            }
        }

        async fn stop(self) {
            self.server.abort();
            let _ = self.server.await;
            self.bridge.shutdown().await.unwrap();
            self.worker.join().unwrap();
        }
    }

    #[tokio::test]
    async fn test_disable_then_enable_over_socket() {
        let mock = MockCapability::new();
        mock.plug(MockDevice::keyboard(1, 5, 1050, 407));
        let harness = Harness::start(mock);

        let mut client = IpcClient::connect(&harness.socket_path).await.unwrap();

        let reply = client.send(&IpcRequest::disable(1050, 407)).await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(harness.mock.open_handles(), 1);
        assert_eq!(harness.mock.active_watches(), 1);

        let reply = client.send(&IpcRequest::enable()).await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(harness.mock.open_handles(), 0);
        assert_eq!(harness.mock.active_watches(), 0);

        harness.stop().await;
    }

    #[tokio::test]
    async fn test_every_request_gets_one_reply() {
        let harness = Harness::start(MockCapability::new());
        let mut client = IpcClient::connect(&harness.socket_path).await.unwrap();

        let requests = [
            IpcRequest::enable(),
            IpcRequest::disable(1050, 407),
            IpcRequest::disable(1050, 407),
            IpcRequest::disable(0x1_0000, 407),
            IpcRequest::enable(),
        ];
        for request in &requests {
            let reply = client.send(request).await.unwrap();
            assert_eq!(reply.reply, "OK");
        }

        // Repeats, in range or not, update the existing watch
        assert_eq!(harness.mock.registrations(), 1);
        assert_eq!(harness.mock.active_watches(), 0);

        harness.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_clients_are_all_served() {
        let harness = Harness::start(MockCapability::new());

        let mut tasks = Vec::new();
        for i in 0..8u64 {
            let path = harness.socket_path.clone();
            tasks.push(tokio::spawn(async move {
                let request = if i % 2 == 0 {
                    IpcRequest::disable(1050, 400 + i)
                } else {
                    IpcRequest::enable()
                };
                protocol::send_request(&path, &request).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_ok());
        }

        harness.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_frame_drops_connection_without_reply() {
        let harness = Harness::start(MockCapability::new());
        let mut stream = tokio::net::UnixStream::connect(&harness.socket_path)
            .await
            .unwrap();

        // Length 1, then a varint that never terminates
        stream.write_all(&[0, 0, 0, 1, 0xFF]).await.unwrap();

        let result: Result<protocol::IpcReply, ProtocolError> =
            protocol::read_framed_async(&mut stream).await;
        assert!(result.unwrap_err().is_disconnect());
        assert_eq!(harness.mock.registrations(), 0);

        // The listener keeps serving other peers
        let reply = protocol::send_request(&harness.socket_path, &IpcRequest::enable())
            .await
            .unwrap();
        assert!(reply.is_ok());

        harness.stop().await;
    }

    #[tokio::test]
    async fn test_socket_mode_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("helper.sock");
        let (bridge, _worker) = create_controller_bridge();

        let server = IpcServer::bind(&socket_path, 0o600, bridge).unwrap();
        let mode = fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(server.socket_path(), socket_path.as_path());

        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_bind_refuses_live_endpoint() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("helper.sock");
        let (bridge, _worker) = create_controller_bridge();

        let first = IpcServer::bind(&socket_path, 0o660, bridge.clone()).unwrap();
        let second = IpcServer::bind(&socket_path, 0o660, bridge);

        assert_eq!(second.err().map(|e| e.kind()), Some(io::ErrorKind::AddrInUse));
        assert!(socket_path.exists());
        assert!(StdUnixStream::connect(&socket_path).is_ok());

        drop(first);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_socket_left_by_dead_listener_is_replaced() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("helper.sock");
        drop(std::os::unix::net::UnixListener::bind(&socket_path).unwrap());
        assert!(socket_path.exists());

        let (bridge, _worker) = create_controller_bridge();
        let server = IpcServer::bind(&socket_path, 0o660, bridge);
        assert!(server.is_ok());
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("helper.sock");
        fs::write(&socket_path, b"stale").unwrap();

        let (bridge, _worker) = create_controller_bridge();
        let server = IpcServer::bind(&socket_path, 0o660, bridge);
        assert!(server.is_ok());
    }
}
