//! Server-push stream bodies.
//!
//! Turns a session's broadcast receiver into a `text/event-stream` response
//! body, optionally interleaved with keep-alive comment frames.

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;
use tracing::warn;

use super::ResponseBody;

type SseFrame = Result<Frame<Bytes>, Infallible>;

/// Build the response body for a standalone push stream. Lagged receivers
/// skip the messages they missed rather than erroring the stream.
pub(crate) fn push_body(
    rx: broadcast::Receiver<Value>,
    keep_alive: Option<Duration>,
) -> ResponseBody {
    let messages = BroadcastStream::new(rx).filter_map(|item| -> Option<SseFrame> {
        match item {
            Ok(message) => Some(Ok(Frame::data(message_frame(&message)))),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "push stream lagged; dropping messages");
                None
            }
        }
    });
    match keep_alive {
        Some(period) => {
            let ticks = IntervalStream::new(tokio::time::interval(period))
                .map(|_| -> SseFrame { Ok(Frame::data(Bytes::from_static(b": keep-alive\n\n"))) });
            StreamBody::new(messages.merge(ticks)).boxed_unsync()
        }
        None => StreamBody::new(messages).boxed_unsync(),
    }
}

fn message_frame(message: &Value) -> Bytes {
    Bytes::from(format!("event: message\ndata: {message}\n\n"))
}
