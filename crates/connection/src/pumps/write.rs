//! WebSocket write pump: serialises outbound frames.

use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::link::{LinkEvent, ReportSender, report};

/// How long a closing link waits for its close frame to go out.
const CLOSE_WAIT: Duration = Duration::from_secs(1);

/// Writes queued frames to the socket.
///
/// A write failure is reported and cancels the link, which makes the read
/// pump finish and report the close.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<Message>,
    generation: u64,
    reports: ReportSender,
    cancel: CancellationToken,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            warn!(generation, "WebSocket write error: {e}");
                            report(&reports, generation, LinkEvent::Error(e.to_string()));
                            cancel.cancel();
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = tokio::time::timeout(CLOSE_WAIT, write.send(Message::Close(None))).await;
}
