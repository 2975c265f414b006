//! Per-connection handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::controller::ApiController;
use crate::error::{GatewayError, ProtocolErrorKind};
use crate::protocol::{decode_json, read_frame_with_timeout, write_json_with_timeout, InboundRequest};

use super::ConnectionMetrics;

/// Handle a single client connection until it closes or times out.
pub async fn handle_connection(
    stream: UnixStream,
    settings: Arc<Settings>,
    controller: Arc<ApiController>,
    metrics: Arc<ConnectionMetrics>,
) -> Result<(), GatewayError> {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let result =
            process_request(&mut reader, &mut writer, &settings, &controller, &metrics).await;

        match result {
            Ok(()) => continue,
            Err(GatewayError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
            }) => {
                debug!("Client disconnected");
                return Ok(());
            }
            Err(GatewayError::Protocol {
                kind: ProtocolErrorKind::ConnectionTimeout,
            }) => {
                warn!("Connection timed out");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read one request frame, run it through the controller and write the
/// response frame.
async fn process_request<R, W>(
    reader: &mut R,
    writer: &mut W,
    settings: &Settings,
    controller: &Arc<ApiController>,
    metrics: &ConnectionMetrics,
) -> Result<(), GatewayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let socket_timeout = Duration::from_secs(settings.limits.socket_timeout_seconds);
    let msg =
        read_frame_with_timeout(reader, settings.limits.max_message_size, socket_timeout).await?;

    let request_id = Uuid::new_v4();
    let start_time = Instant::now();

    let response = match decode_json::<InboundRequest>(&msg) {
        Ok(request) => {
            info!(
                request_id = %request_id,
                controller = %request.controller,
                action = %request.action,
                "Received request"
            );

            let handler = Arc::clone(controller);
            match tokio::task::spawn_blocking(move || handler.handle(request)).await {
                Ok(response) => response,
                Err(e) => {
                    error!(request_id = %request_id, error = %e, "Action task panicked");
                    controller.error_response("Internal server error", 500)
                }
            }
        }
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "Malformed request");
            controller.error_response("Malformed request", 400)
        }
    };

    info!(
        request_id = %request_id,
        status = response.status,
        duration_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );
    metrics.record_request(response.status < 400);

    write_json_with_timeout(writer, &response, socket_timeout).await
}
