//! Telemetry ingestion listener
//!
//! Accepts long-lived TCP connections from vehicle agents, one task per
//! connection. Messages are newline-delimited JSON records; each is
//! decoded, validated, stored, and acknowledged in order on its own
//! connection. Per-message failures never close the connection; only a
//! peer that exceeds the frame cap is disconnected. There is no
//! cross-connection ordering: the latest view is decided by sample
//! timestamps, not arrival order.

use std::net::SocketAddr;

use chrono::Utc;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::TelemetryStore;
use crate::error::IngestError;
use crate::model::RawSample;

mod validate;
pub use validate::validate;

/// Upper bound on one framed message. A peer that streams more than
/// this without a delimiter is acked with an error and dropped, so a
/// delimiter-less client cannot grow the buffer without bound.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

const READ_BUFFER_BYTES: usize = 4096;

/// Accept loop. Runs until the shutdown token fires; each accepted
/// connection gets its own task holding a clone of the store handle.
pub async fn run(
    listener: TcpListener,
    store: TelemetryStore,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("Telemetry listener accepting connections on {}", local_addr);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Telemetry listener shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        let store = store.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, peer, store, shutdown).await {
                                debug!(%peer, "connection error: {e}");
                            }
                        });
                    }
                    Err(e) => warn!("accept failed: {e}"),
                }
            }
        }
    }

    Ok(())
}

/// Per-connection loop: reassemble newline-delimited frames from the
/// byte stream and answer each with exactly one acknowledgment line.
///
/// At peer close, a final unterminated record is still processed, so
/// agents that only terminate between records (not after the last one)
/// lose nothing.
async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    store: TelemetryStore,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(%peer, "agent connected");

    let (mut reader, mut writer) = socket.split();
    let mut chunk = [0u8; READ_BUFFER_BYTES];
    let mut pending: Vec<u8> = Vec::new();

    'conn: loop {
        tokio::select! {
            _ = shutdown.cancelled() => break 'conn,
            read = reader.read(&mut chunk) => {
                let n = read?;
                if n == 0 {
                    let tail = std::mem::take(&mut pending);
                    if !tail.iter().all(u8::is_ascii_whitespace) {
                        let ack = process_message(&store, &tail).await;
                        writer.write_all(ack.as_bytes()).await?;
                    }
                    break 'conn;
                }

                pending.extend_from_slice(&chunk[..n]);

                for frame in drain_frames(&mut pending) {
                    if frame.len() > MAX_FRAME_BYTES {
                        warn!(%peer, len = frame.len(), "oversized message, closing connection");
                        writer.write_all(error_ack("Message too large").as_bytes()).await?;
                        break 'conn;
                    }
                    let ack = process_message(&store, &frame).await;
                    writer.write_all(ack.as_bytes()).await?;
                }

                if pending.len() > MAX_FRAME_BYTES {
                    warn!(%peer, len = pending.len(), "unterminated message over frame cap, closing connection");
                    writer.write_all(error_ack("Message too large").as_bytes()).await?;
                    break 'conn;
                }
            }
        }
    }

    info!(%peer, "agent disconnected");
    Ok(())
}

/// Split complete newline-terminated frames out of the pending buffer,
/// leaving any trailing partial message in place. A trailing `\r` is
/// tolerated; blank lines produce no frame.
fn drain_frames(pending: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let mut line: Vec<u8> = pending.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if !line.is_empty() {
            frames.push(line);
        }
    }
    frames
}

/// Handle one framed message end to end and render its acknowledgment.
/// Every path produces exactly one newline-terminated JSON object:
/// `{"success":true,"id":N}` on persistence, `{"error":"<reason>"}`
/// otherwise.
pub async fn process_message(store: &TelemetryStore, raw: &[u8]) -> String {
    match ingest_message(store, raw).await {
        Ok(id) => {
            let mut ack = json!({ "success": true, "id": id }).to_string();
            ack.push('\n');
            ack
        }
        Err(IngestError::Decode(e)) => {
            warn!("discarding undecodable message: {e}");
            error_ack("Invalid message format")
        }
        Err(IngestError::Validation(e)) => {
            warn!("rejected sample: {e}");
            error_ack(&e.to_string())
        }
        Err(IngestError::Store(e)) => {
            error!("failed to store sample: {e}");
            error_ack("Processing failed")
        }
    }
}

async fn ingest_message(store: &TelemetryStore, raw: &[u8]) -> Result<i64, IngestError> {
    let raw: RawSample = serde_json::from_slice(raw)?;
    let sample = validate(raw, Utc::now())?;
    let id = store.insert(&sample).await?;
    debug!(vehicle_id = %sample.vehicle_id, id, "stored sample");
    Ok(id)
}

fn error_ack(message: &str) -> String {
    let mut ack = json!({ "error": message }).to_string();
    ack.push('\n');
    ack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use serde_json::Value;
    use sqlx::sqlite::SqlitePoolOptions;

    fn frames_of(input: &[u8]) -> (Vec<Vec<u8>>, Vec<u8>) {
        let mut pending = input.to_vec();
        let frames = drain_frames(&mut pending);
        (frames, pending)
    }

    #[test]
    fn test_drain_frames_single_line() {
        let (frames, rest) = frames_of(b"{\"a\":1}\n");
        assert_eq!(frames, vec![b"{\"a\":1}".to_vec()]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_drain_frames_coalesced_lines() {
        let (frames, rest) = frames_of(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], b"{\"b\":2}".to_vec());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_drain_frames_keeps_partial_tail() {
        let (frames, rest) = frames_of(b"{\"a\":1}\n{\"b\"");
        assert_eq!(frames.len(), 1);
        assert_eq!(rest, b"{\"b\"".to_vec());
    }

    #[test]
    fn test_drain_frames_strips_carriage_return() {
        let (frames, _) = frames_of(b"{\"a\":1}\r\n");
        assert_eq!(frames, vec![b"{\"a\":1}".to_vec()]);
    }

    #[test]
    fn test_drain_frames_skips_blank_lines() {
        let (frames, rest) = frames_of(b"\n\r\n{\"a\":1}\n");
        assert_eq!(frames.len(), 1);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_error_ack_is_terminated_json() {
        let ack = error_ack("Missing vehicle_id");
        assert!(ack.ends_with('\n'));
        let parsed: Value = serde_json::from_str(ack.trim_end()).unwrap();
        assert_eq!(parsed["error"], "Missing vehicle_id");
    }

    async fn test_store() -> TelemetryStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        TelemetryStore::new(pool)
    }

    #[tokio::test]
    async fn test_process_message_success_ack_has_id() {
        let store = test_store().await;
        let ack = process_message(&store, br#"{"vehicle_id":"CAR-001","speed":62.5}"#).await;
        let parsed: Value = serde_json::from_str(ack.trim_end()).unwrap();
        assert_eq!(parsed["success"], true);
        assert!(parsed["id"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_process_message_validation_reason_verbatim() {
        let store = test_store().await;

        let ack = process_message(&store, br#"{"speed":10}"#).await;
        let parsed: Value = serde_json::from_str(ack.trim_end()).unwrap();
        assert_eq!(parsed["error"], "Missing vehicle_id");

        let ack = process_message(&store, br#"{"vehicle_id":"CAR-001"}"#).await;
        let parsed: Value = serde_json::from_str(ack.trim_end()).unwrap();
        assert_eq!(parsed["error"], "No telemetry data provided");
    }

    #[tokio::test]
    async fn test_process_message_decode_failure() {
        let store = test_store().await;
        let ack = process_message(&store, b"not json at all").await;
        let parsed: Value = serde_json::from_str(ack.trim_end()).unwrap();
        assert_eq!(parsed["error"], "Invalid message format");
    }

    #[tokio::test]
    async fn test_rejected_message_not_stored() {
        let store = test_store().await;
        process_message(&store, br#"{"vehicle_id":"CAR-001"}"#).await;
        assert!(store.vehicle_ids().await.unwrap().is_empty());
    }
}
