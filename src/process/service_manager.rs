//! [MODULE H] Supervises the worker subprocess: launches it, tracks its
//! PID, reaps orphaned prior instances on startup, and lazily dials and
//! caches its RPC client (§4.H).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::ServiceError;
use crate::rpc::RpcClient;

/// Everything the ServiceManager needs to launch and reach the worker.
pub struct ServiceContext {
    pub worker_binary: PathBuf,
    pub control_port: u16,
    pub pid_file: PathBuf,
    pub extra_args: Vec<String>,
}

pub struct ServiceManager {
    ctx: ServiceContext,
    child: Mutex<Option<Child>>,
    client: Mutex<Option<Arc<RpcClient>>>,
}

impl ServiceManager {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            ctx,
            child: Mutex::new(None),
            client: Mutex::new(None),
        }
    }

    /// Port probe: a TCP connect that succeeds means a worker is already
    /// listening, regardless of whether we hold its `Child` handle.
    async fn port_is_open(&self) -> bool {
        TcpStream::connect(("127.0.0.1", self.ctx.control_port))
            .await
            .is_ok()
    }

    async fn read_pid_file(&self) -> Option<u32> {
        let contents = tokio::fs::read_to_string(&self.ctx.pid_file).await.ok()?;
        contents.trim().parse().ok()
    }

    async fn write_pid_file(&self, pid: u32) {
        if let Err(e) = tokio::fs::write(&self.ctx.pid_file, pid.to_string()).await {
            warn!(error = %e, "failed to write worker pid file");
        }
    }

    /// Kills whatever process the PID file names, if the port is not
    /// actually serving (i.e. the recorded worker died without cleaning up
    /// its PID file) — orphan reaping on startup (§4.H).
    async fn reap_orphan(&self) {
        if self.port_is_open().await {
            return;
        }
        let Some(pid) = self.read_pid_file().await else {
            return;
        };
        info!(pid, "reaping orphaned worker process");
        #[cfg(unix)]
        {
            let _ = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await;
        }
        let _ = tokio::fs::remove_file(&self.ctx.pid_file).await;
    }

    pub async fn is_running(&self) -> bool {
        self.port_is_open().await
    }

    /// Start is idempotent once the process is up (§4.H): a second call
    /// while the port is already serving is a no-op success.
    pub async fn start_service(&self) -> Result<(), ServiceError> {
        self.reap_orphan().await;

        if self.is_running().await {
            return Ok(());
        }

        let mut command = Command::new(&self.ctx.worker_binary);
        command
            .arg("download-service")
            .arg("--port")
            .arg(self.ctx.control_port.to_string())
            .args(&self.ctx.extra_args)
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| ServiceError::SpawnFailed {
            message: e.to_string(),
        })?;

        if let Some(pid) = child.id() {
            self.write_pid_file(pid).await;
        }

        for _ in 0..50 {
            if self.port_is_open().await {
                *self.child.lock().await = Some(child);
                return Ok(());
            }
            if let Ok(Some(status)) = child.try_wait() {
                return Err(ServiceError::SpawnFailed {
                    message: format!("worker exited immediately with {status}"),
                });
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        Err(ServiceError::SpawnFailed {
            message: "worker did not open its control port in time".to_string(),
        })
    }

    /// Stop: issue StopDownload over RPC, wait, then terminate the child
    /// process (§5 "Subprocess discipline").
    pub async fn stop_service(&self) -> Result<(), ServiceError> {
        if let Ok(client) = self.get_client().await {
            let _ = client.stop_download().await;
        }

        *self.client.lock().await = None;

        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to signal worker process");
            }
            let _ = child.wait().await;
        }
        let _ = tokio::fs::remove_file(&self.ctx.pid_file).await;
        Ok(())
    }

    /// Lazily dials the RPC endpoint and caches the connection, redialing
    /// on the next call if it was dropped (§4.H). The control plane may
    /// start before the worker (§9 "Lazy subprocess dial"): this is the
    /// seam where the first RPC can trigger a spawn.
    pub async fn get_client(&self) -> Result<Arc<RpcClient>, ServiceError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        if !self.is_running().await {
            self.start_service().await?;
        }
        let client = Arc::new(RpcClient::new("127.0.0.1", self.ctx.control_port));
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Drops the cached client so the next `get_client` call redials —
    /// called by request handlers after a keepalive/health-check failure.
    pub async fn invalidate_client(&self) {
        *self.client.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_running_when_port_closed() {
        let ctx = ServiceContext {
            worker_binary: PathBuf::from("/nonexistent/cratedigger"),
            control_port: 18_451,
            pid_file: PathBuf::from("/tmp/cratedigger-test-nonexistent.pid"),
            extra_args: Vec::new(),
        };
        let manager = ServiceManager::new(ctx);
        assert!(!manager.is_running().await);
    }
}
