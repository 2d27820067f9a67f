//! HTTP plumbing shared by the backend adapters
//!
//! - [`send_request`] races a request against the call's cancellation and
//!   turns non-success statuses into [`LlmError::RequestFailed`]
//! - [`spawn_line_relay`] reads a line-oriented response body (NDJSON or
//!   server-sent events) on a background task and forwards decoded packets

use crate::core_types::{CallContext, PacketStream, StreamPacket};
use crate::error::{LlmError, LlmResult};
use crate::logging::log_warn;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const STREAM_BUFFER: usize = 32;

/// What the relay does after a decoded line
pub(crate) enum LineOutcome {
    Continue,
    /// The backend signalled the end of the stream
    Finished,
}

pub(crate) fn build_client() -> LlmResult<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| LlmError::configuration_error(format!("Failed to build HTTP client: {e}")))
}

/// Send `request`, failing fast on cancellation and on non-2xx statuses
pub(crate) async fn send_request(
    ctx: &CallContext,
    provider: &str,
    request: reqwest::RequestBuilder,
) -> LlmResult<reqwest::Response> {
    if let Some(cancelled) = ctx.err() {
        return Err(cancelled);
    }

    let response = tokio::select! {
        cancelled = ctx.done() => return Err(cancelled),
        result = request.send() => result.map_err(|e| transport_error(provider, e))?,
    };

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(LlmError::request_failed(
            format!("{provider} returned status {status}: {detail}"),
            Some(status.as_u16()),
        ));
    }
    Ok(response)
}

/// Classify a reqwest failure; every variant means the backend is unreachable
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> LlmError {
    let message = if e.is_timeout() {
        format!("{provider} request timed out: {e}")
    } else if e.is_connect() {
        format!("{provider} connection failed: {e}")
    } else {
        format!("{provider} transport error: {e}")
    };
    LlmError::provider_down(message, Some(Box::new(e)))
}

/// Relay `response` line by line through `decode` until it reports
/// [`LineOutcome::Finished`]
///
/// A body that closes before that, a transport failure, or cancellation of
/// `ctx` ends the stream with an error packet.
pub(crate) fn spawn_line_relay<F>(
    response: reqwest::Response,
    ctx: CallContext,
    provider: &'static str,
    decode: F,
) -> PacketStream
where
    F: FnMut(&str, &mut Vec<StreamPacket>) -> LineOutcome + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(relay_lines(response, ctx, provider, decode, tx));
    ReceiverStream::new(rx).boxed()
}

async fn relay_lines<F>(
    response: reqwest::Response,
    ctx: CallContext,
    provider: &'static str,
    mut decode: F,
    tx: mpsc::Sender<StreamPacket>,
) where
    F: FnMut(&str, &mut Vec<StreamPacket>) -> LineOutcome + Send,
{
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let next = tokio::select! {
            cancelled = ctx.done() => {
                let _ = tx.send(StreamPacket::Error(cancelled)).await;
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                buffer.extend_from_slice(&bytes);
                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    if let LineOutcome::Finished = forward_line(&line, &mut decode, &tx).await {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(StreamPacket::Error(transport_error(provider, e))).await;
                return;
            }
            None => break,
        }
    }

    // Body closed; a final line may lack its trailing newline
    if let LineOutcome::Finished = forward_line(&buffer, &mut decode, &tx).await {
        return;
    }

    log_warn!(provider = provider, "Stream closed before completion");
    let _ = tx
        .send(StreamPacket::Error(LlmError::response_parsing_error(format!(
            "{provider} stream closed before completion"
        ))))
        .await;
}

async fn forward_line<F>(
    line: &[u8],
    decode: &mut F,
    tx: &mpsc::Sender<StreamPacket>,
) -> LineOutcome
where
    F: FnMut(&str, &mut Vec<StreamPacket>) -> LineOutcome + Send,
{
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return LineOutcome::Continue;
    }

    let mut packets = Vec::new();
    let outcome = decode(text, &mut packets);
    for packet in packets {
        // Receiver dropped: the caller stopped listening
        if tx.send(packet).await.is_err() {
            return LineOutcome::Finished;
        }
    }
    outcome
}
