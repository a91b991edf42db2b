//! Connection lifecycle: one connected client from accept through
//! disconnect.

use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use hld_rpc::errors::PARSE_ERROR;
use hld_rpc::{MethodRegistry, RpcContext, RpcResponse};
use metrics::{counter, gauge, histogram};
use serde_json::Value;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::handler::{encode_response, handle_line};

/// Longest accepted request line, in bytes.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Responses buffered for the writer before request tasks wait.
const OUTBOUND_CAPACITY: usize = 256;

/// Serve one client until it disconnects or `cancel` fires.
///
/// Every request line is dispatched in its own task under a child of
/// `cancel`, so a slow request never blocks the ones behind it. Responses are
/// written in completion order. Read EOF only stops reading: requests already
/// read still run and answer. `cancel` fires on shutdown or when a response
/// can no longer be written, and in-flight requests then finish with
/// `CANCELLED`.
#[instrument(skip(stream, registry, ctx, cancel))]
pub async fn run_connection(
    stream: UnixStream,
    connection_id: u64,
    registry: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    cancel: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());

    let started = Instant::now();
    info!(connection_id, "client connected");
    counter!("ipc_connections_total").increment(1);
    gauge!("ipc_connections_active").increment(1.0);

    let (send_tx, mut send_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let peer_gone = cancel.clone();
    let outbound = tokio::spawn(async move {
        while let Some(line) = send_rx.recv().await {
            if let Err(e) = sink.send(line).await {
                debug!(error = %e, "client write failed");
                peer_gone.cancel();
                break;
            }
        }
    });

    let mut requests = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(connection_id, "connection cancelled");
                break;
            }
            Some(_) = requests.join_next(), if !requests.is_empty() => {}
            frame = lines.next() => match frame {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let registry = Arc::clone(&registry);
                    let ctx = Arc::clone(&ctx);
                    let token = cancel.child_token();
                    let tx = send_tx.clone();
                    let _ = requests.spawn(async move {
                        let response = handle_line(&line, &registry, &ctx, &token).await;
                        let _ = tx.send(encode_response(&response)).await;
                    });
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(connection_id, limit = MAX_LINE_BYTES, "request line too long");
                    let response = RpcResponse::error(
                        Value::Null,
                        PARSE_ERROR,
                        format!("request line exceeds {MAX_LINE_BYTES} bytes"),
                    );
                    let _ = send_tx.send(encode_response(&response)).await;
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    warn!(connection_id, error = %e, "client read failed");
                    break;
                }
                None => {
                    debug!(connection_id, in_flight = requests.len(), "client finished sending");
                    break;
                }
            },
        }
    }

    while requests.join_next().await.is_some() {}
    drop(send_tx);
    let _ = outbound.await;

    let duration = started.elapsed();
    gauge!("ipc_connections_active").decrement(1.0);
    histogram!("ipc_connection_duration_seconds").record(duration.as_secs_f64());
    info!(connection_id, duration_secs = duration.as_secs_f64(), "client disconnected");
}
