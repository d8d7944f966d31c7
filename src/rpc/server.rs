//! The worker-side RPC listener (§4.H, §4.I): accepts connections,
//! enforces the version gate, and dispatches each request to the
//! `WorkerHandler`.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::RpcError;
use crate::rpc::envelope::{
    PROTOCOL_VERSION, RpcRequest, RpcRequestPayload, RpcResponse, RpcResponsePayload,
};
use crate::rpc::handler::WorkerHandler;
use crate::rpc::log_stream::stream_log_entries;
use crate::rpc::transport::RpcTransport;

pub struct RpcServer {
    handler: Arc<WorkerHandler>,
    log_path: String,
}

impl RpcServer {
    pub fn new(handler: Arc<WorkerHandler>, log_path: String) -> Self {
        Self { handler, log_path }
    }

    pub async fn serve(self, port: u16, shutdown: CancellationToken) -> Result<(), RpcError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| RpcError::ConnectionFailed {
                message: e.to_string(),
            })?;
        info!(port, "rpc server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("rpc server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, _addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "failed to accept rpc connection");
                            continue;
                        }
                    };
                    let handler = self.handler.clone();
                    let conn_shutdown = shutdown.clone();
                    let log_path = self.log_path.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, handler, log_path, conn_shutdown).await
                        {
                            warn!(error = %e, "rpc connection ended with error");
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    handler: Arc<WorkerHandler>,
    log_path: String,
    shutdown: CancellationToken,
) -> Result<(), RpcError> {
    let mut transport = RpcTransport::new(stream);

    loop {
        let request: RpcRequest = match transport.recv().await {
            Ok(r) => r,
            Err(RpcError::Closed) => return Ok(()),
            Err(e) => return Err(e),
        };

        if request.version != PROTOCOL_VERSION {
            transport
                .send(&RpcResponse::version_mismatch(request.correlation_id))
                .await?;
            continue;
        }

        match request.payload {
            RpcRequestPayload::StreamLogs { request: log_request } => {
                let (tx, mut rx) = mpsc::channel(64);
                let log_shutdown = shutdown.clone();
                let path_for_task = log_path.clone();
                tokio::spawn(async move {
                    stream_log_entries(&path_for_task, log_request, tx, log_shutdown).await;
                });
                while let Some(entry) = rx.recv().await {
                    transport
                        .send(&RpcResponse::new(
                            request.correlation_id,
                            RpcResponsePayload::LogEntry(entry),
                        ))
                        .await?;
                }
                transport
                    .send(&RpcResponse::new(
                        request.correlation_id,
                        RpcResponsePayload::StreamEnd,
                    ))
                    .await?;
            }
            RpcRequestPayload::StartDownload { config, .. } => {
                let (success, error_message) = handler.start_download(config).await;
                transport
                    .send(&RpcResponse::new(
                        request.correlation_id,
                        RpcResponsePayload::StartDownload {
                            success,
                            error_message,
                        },
                    ))
                    .await?;
            }
            RpcRequestPayload::StopDownload => {
                let success = handler.stop_download().await;
                transport
                    .send(&RpcResponse::new(
                        request.correlation_id,
                        RpcResponsePayload::StopDownload { success },
                    ))
                    .await?;
            }
            RpcRequestPayload::ResetDownload => {
                let success = handler.reset_download().await;
                transport
                    .send(&RpcResponse::new(
                        request.correlation_id,
                        RpcResponsePayload::ResetDownload { success },
                    ))
                    .await?;
            }
            RpcRequestPayload::GetStatus => {
                let status = handler.get_status().await;
                transport
                    .send(&RpcResponse::new(
                        request.correlation_id,
                        RpcResponsePayload::GetStatus(status),
                    ))
                    .await?;
            }
            RpcRequestPayload::GetPlanItems { filters } => {
                let (items, total, filtered) = handler.get_plan_items(filters).await;
                transport
                    .send(&RpcResponse::new(
                        request.correlation_id,
                        RpcResponsePayload::GetPlanItems {
                            items,
                            total,
                            filtered,
                        },
                    ))
                    .await?;
            }
            RpcRequestPayload::ValidateConfig { config } => {
                let (valid, errors) = handler.validate_config(&config);
                transport
                    .send(&RpcResponse::new(
                        request.correlation_id,
                        RpcResponsePayload::ValidateConfig { valid, errors },
                    ))
                    .await?;
            }
            RpcRequestPayload::HealthCheck => {
                let (liveness, readiness, service_health) = handler.health_check().await;
                transport
                    .send(&RpcResponse::new(
                        request.correlation_id,
                        RpcResponsePayload::HealthCheck {
                            liveness,
                            readiness,
                            service_health,
                        },
                    ))
                    .await?;
            }
        }
    }
}
