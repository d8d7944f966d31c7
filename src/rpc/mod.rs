//! Module I: the versioned RPC channel between the control plane and the
//! download worker. `envelope` defines the wire types, `transport` frames
//! them over TCP, `server`/`client` implement the two ends, `handler`
//! bridges the worker side to `DownloadService`/`ConfigManager`, and
//! `log_stream` backs the `StreamLogs` call.

pub mod client;
pub mod envelope;
pub mod handler;
pub mod log_stream;
pub mod server;
pub mod transport;

pub use client::RpcClient;
pub use envelope::{
    LogEntry, LogStreamRequest, PlanItemFilters, RpcRequest, RpcRequestPayload, RpcResponse,
    RpcResponsePayload, PROTOCOL_VERSION,
};
pub use handler::WorkerHandler;
pub use server::RpcServer;
