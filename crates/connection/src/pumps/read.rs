//! WebSocket read pump: forwards inbound frames to the manager.

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::link::{LinkEvent, ReportSender, report};

/// Reads frames until the socket ends, fails, or the link is cancelled.
///
/// Always finishes by reporting [`LinkEvent::Closed`]. A read failure is
/// reported as [`LinkEvent::Error`] first. Liveness is judged by the
/// manager's watchdog, not here.
pub(crate) async fn read_pump<S>(
    mut read: S,
    generation: u64,
    reports: &ReportSender,
    cancel: &CancellationToken,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        trace!(generation, frame = %text.as_str(), "received text frame");
                        report(reports, generation, LinkEvent::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        trace!(generation, len = data.len(), "received binary frame");
                        report(reports, generation, LinkEvent::Activity);
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // tungstenite answers pings itself.
                        report(reports, generation, LinkEvent::Activity);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(generation, ?frame, "received close frame");
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!(generation, "WebSocket read error: {e}");
                        report(reports, generation, LinkEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        debug!(generation, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    report(reports, generation, LinkEvent::Closed);
}
