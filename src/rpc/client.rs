//! The control-plane-side RPC client (§4.H "get_client"): dials lazily,
//! serializes calls over one connection, and redials on failure.

use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use crate::config::{Configuration, RetryParameters};
use crate::errors::RpcError;
use crate::plan::PlanItem;
use crate::rpc::envelope::{
    LogEntry, LogStreamRequest, PlanItemFilters, RpcRequest, RpcRequestPayload, RpcResponsePayload,
};
use crate::rpc::transport::RpcTransport;
use crate::service::state::StatusSnapshot;
use crate::utils::retry::retry;

/// Dial retries are a Transient failure class (§7): bounded, internal,
/// and never surfaced to the caller until exhausted.
const DIAL_RETRY: RetryParameters = RetryParameters {
    max_retries: 3,
    base_delay_ms: 100,
    max_delay_ms: 1_000,
};

pub struct RpcClient {
    addr: (String, u16),
    transport: Mutex<Option<RpcTransport>>,
}

impl RpcClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            addr: (host.into(), port),
            transport: Mutex::new(None),
        }
    }

    async fn ensure_connected<'a>(
        &self,
        guard: &mut tokio::sync::MutexGuard<'a, Option<RpcTransport>>,
    ) -> Result<(), RpcError> {
        if guard.is_some() {
            return Ok(());
        }
        let stream = retry(&DIAL_RETRY, |_attempt| async {
            TcpStream::connect((self.addr.0.as_str(), self.addr.1))
                .await
                .map_err(|e| RpcError::ConnectionFailed {
                    message: e.to_string(),
                })
        })
        .await?;
        **guard = Some(RpcTransport::new(stream));
        Ok(())
    }

    /// Sends one request and awaits its single response. On any transport
    /// failure the cached connection is dropped so the next call redials
    /// (§4.H "caches the connection until it fails a keepalive").
    async fn call(&self, payload: RpcRequestPayload) -> Result<RpcResponsePayload, RpcError> {
        let mut guard = self.transport.lock().await;
        self.ensure_connected(&mut guard).await?;

        let request = RpcRequest::new(payload);
        let result = async {
            let transport = guard.as_mut().expect("just connected");
            transport.send(&request).await?;
            transport.recv().await
        }
        .await;

        match result {
            Ok(response) => {
                let response: crate::rpc::envelope::RpcResponse = response;
                Ok(response.payload)
            }
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    pub async fn start_download(
        &self,
        config: Configuration,
        plan_path: String,
        log_path: String,
    ) -> Result<(bool, Option<String>), RpcError> {
        match self
            .call(RpcRequestPayload::StartDownload {
                config,
                plan_path,
                log_path,
            })
            .await?
        {
            RpcResponsePayload::StartDownload {
                success,
                error_message,
            } => Ok((success, error_message)),
            RpcResponsePayload::VersionMismatch { server_version } => Ok((
                false,
                Some(format!("version mismatch: server={server_version}")),
            )),
            _ => Err(RpcError::Malformed {
                message: "unexpected response to StartDownload".to_string(),
            }),
        }
    }

    pub async fn stop_download(&self) -> Result<bool, RpcError> {
        match self.call(RpcRequestPayload::StopDownload).await? {
            RpcResponsePayload::StopDownload { success } => Ok(success),
            RpcResponsePayload::VersionMismatch { .. } => Ok(false),
            _ => Err(RpcError::Malformed {
                message: "unexpected response to StopDownload".to_string(),
            }),
        }
    }

    pub async fn reset_download(&self) -> Result<bool, RpcError> {
        match self.call(RpcRequestPayload::ResetDownload).await? {
            RpcResponsePayload::ResetDownload { success } => Ok(success),
            RpcResponsePayload::VersionMismatch { .. } => Ok(false),
            _ => Err(RpcError::Malformed {
                message: "unexpected response to ResetDownload".to_string(),
            }),
        }
    }

    pub async fn get_status(&self) -> Result<StatusSnapshot, RpcError> {
        match self.call(RpcRequestPayload::GetStatus).await? {
            RpcResponsePayload::GetStatus(status) => Ok(status),
            _ => Err(RpcError::Malformed {
                message: "unexpected response to GetStatus".to_string(),
            }),
        }
    }

    pub async fn get_plan_items(
        &self,
        filters: PlanItemFilters,
    ) -> Result<(Vec<PlanItem>, usize, usize), RpcError> {
        match self.call(RpcRequestPayload::GetPlanItems { filters }).await? {
            RpcResponsePayload::GetPlanItems {
                items,
                total,
                filtered,
            } => Ok((items, total, filtered)),
            _ => Err(RpcError::Malformed {
                message: "unexpected response to GetPlanItems".to_string(),
            }),
        }
    }

    pub async fn validate_config(
        &self,
        config: Configuration,
    ) -> Result<(bool, Vec<String>), RpcError> {
        match self.call(RpcRequestPayload::ValidateConfig { config }).await? {
            RpcResponsePayload::ValidateConfig { valid, errors } => Ok((valid, errors)),
            _ => Err(RpcError::Malformed {
                message: "unexpected response to ValidateConfig".to_string(),
            }),
        }
    }

    pub async fn health_check(&self) -> Result<(bool, bool, String), RpcError> {
        match self.call(RpcRequestPayload::HealthCheck).await? {
            RpcResponsePayload::HealthCheck {
                liveness,
                readiness,
                service_health,
            } => Ok((liveness, readiness, service_health)),
            RpcResponsePayload::VersionMismatch { .. } => {
                Ok((true, false, "unhealthy".to_string()))
            }
            _ => Err(RpcError::Malformed {
                message: "unexpected response to HealthCheck".to_string(),
            }),
        }
    }

    /// Server-streaming StreamLogs: dials a dedicated connection (kept
    /// separate from the unary-call connection so a long follow-mode
    /// stream never blocks status polling) and forwards entries until
    /// `StreamEnd` (§4.I).
    pub async fn stream_logs(
        &self,
        request: LogStreamRequest,
    ) -> Result<mpsc::Receiver<LogEntry>, RpcError> {
        let stream = TcpStream::connect((self.addr.0.as_str(), self.addr.1))
            .await
            .map_err(|e| RpcError::ConnectionFailed {
                message: e.to_string(),
            })?;
        let mut transport = RpcTransport::new(stream);
        transport
            .send(&RpcRequest::new(RpcRequestPayload::StreamLogs { request }))
            .await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                let response: Result<crate::rpc::envelope::RpcResponse, RpcError> =
                    transport.recv().await;
                match response {
                    Ok(response) => match response.payload {
                        RpcResponsePayload::LogEntry(entry) => {
                            if tx.send(entry).await.is_err() {
                                return;
                            }
                        }
                        RpcResponsePayload::StreamEnd | RpcResponsePayload::VersionMismatch { .. } => {
                            return;
                        }
                        _ => return,
                    },
                    Err(_) => return,
                }
            }
        });
        Ok(rx)
    }
}
