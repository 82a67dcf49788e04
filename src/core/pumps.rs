//! Per-connection I/O pumps
//!
//! Every connection runs exactly two tasks: the reader pump owns the stream
//! half of the socket and the writer pump owns the sink half, so no frame is
//! ever interleaved by concurrent reads or writes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, warn};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::Receiver;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::constants::{MIN_PING_PERIOD, PING_SAFETY_MARGIN};
use crate::core::connection::{CloseCode, Connection};
use crate::core::hub::HubInner;
use crate::core::message::Message;
use crate::core::{WsMessage, WsSink, WsSource};

/// Continuously read frames off the socket and hand them to the message
/// handler. The read deadline is re-armed before every read; an elapsed
/// deadline, a transport error, the end of the stream or a peer close frame
/// all end the loop. On exit the reader unregisters the connection — it is
/// the one pump responsible for teardown.
pub(crate) async fn reader_pump(hub: Arc<HubInner>, conn: Arc<Connection>, mut source: WsSource) {
    let mut close_code = CloseCode::Away;

    loop {
        let frame = match timeout(conn.read_timeout, source.next()).await {
            Err(_) => {
                warn!("Connection {}: read deadline expired", conn.id());
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                if is_expected_close(&err) {
                    debug!("Connection {} closed by peer: {}", conn.id(), err);
                } else {
                    error!("Connection {}: {}", conn.id(), err);
                }
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            WsMessage::Text(text) => {
                dispatch(&hub, &conn, Message::normalized(text.into_bytes()));
            }
            WsMessage::Binary(bytes) => {
                dispatch(&hub, &conn, Message::normalized(bytes));
            }
            WsMessage::Close(frame) => {
                close_code = frame.map(|f| f.code).unwrap_or(CloseCode::Normal);
                debug!("Connection {}: peer close, code {}", conn.id(), u16::from(close_code));
                break;
            }
            // Pings are answered by the protocol layer; any successful read
            // already refreshed the deadline above
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }

    hub.unregister(&conn.id(), close_code);
}

/// Drain the outbound queue into the socket and keep the peer alive.
///
/// The sole writer of the sink half. Selects between three events: a queued
/// message (written together with the backlog snapshot taken at dequeue
/// time), the unregistration signal (write a close frame and stop), and the
/// keepalive ticker (send a ping probe). Every write runs under the write
/// deadline and any failure ends the loop. The writer never unregisters the
/// connection itself; teardown belongs to whichever side triggered it.
pub(crate) async fn writer_pump(
    conn: Arc<Connection>,
    mut sink: WsSink,
    mut outbox: Receiver<WsMessage>,
) {
    let period = ping_period(conn.ping_interval);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            queued = outbox.recv() => match queued {
                Some(frame) => {
                    if let Err(err) = write_batch(&conn, &mut sink, &mut outbox, frame).await {
                        debug!("Connection {}: write failed: {}", conn.id(), err);
                        break;
                    }
                }
                None => {
                    // Every sender is gone; treat it like an unregistration
                    send_close(&conn, &mut sink, CloseCode::Normal).await;
                    break;
                }
            },
            _ = conn.closed_signal().notified() => {
                let code = conn.close_code().unwrap_or(CloseCode::Normal);
                send_close(&conn, &mut sink, code).await;
                break;
            }
            _ = ticker.tick() => {
                let probe = sink.send(WsMessage::Ping(Vec::new()));
                match timeout(conn.write_timeout, probe).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!("Connection {}: ping failed: {}", conn.id(), err);
                        break;
                    }
                    Err(_) => {
                        warn!("Connection {}: write deadline expired on ping", conn.id());
                        break;
                    }
                }
            }
        }
    }

    let _ = sink.close().await;
    conn.mark_closed();
}

/// Write `first` plus every message already queued at this instant, as one
/// buffered flush. Only the backlog snapshot is drained — frames arriving
/// during the write wait for the next iteration, so producers cannot starve
/// the ticker.
async fn write_batch(
    conn: &Connection,
    sink: &mut WsSink,
    outbox: &mut Receiver<WsMessage>,
    first: WsMessage,
) -> Result<(), WsError> {
    let write = async {
        sink.feed(first).await?;

        let backlog = outbox.len();
        for _ in 0..backlog {
            match outbox.try_recv() {
                Ok(frame) => sink.feed(frame).await?,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        sink.flush().await
    };

    match timeout(conn.write_timeout, write).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Connection {}: write deadline expired", conn.id());
            Err(WsError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)))
        }
    }
}

async fn send_close(conn: &Connection, sink: &mut WsSink, code: CloseCode) {
    let frame = WsMessage::Close(Some(CloseFrame {
        code,
        reason: "".into(),
    }));
    // The peer may already be gone; the close frame is best-effort
    let _ = timeout(conn.write_timeout, sink.send(frame)).await;
}

fn dispatch(hub: &HubInner, conn: &Arc<Connection>, message: Message) {
    if let Some(handler) = hub.message_handler() {
        handler(conn.clone(), message);
    }
}

/// Probe period: the configured interval minus a safety margin so the probe
/// lands before the peer's read deadline, floored at one second.
fn ping_period(interval: Duration) -> Duration {
    interval.saturating_sub(PING_SAFETY_MARGIN).max(MIN_PING_PERIOD)
}

fn is_expected_close(err: &WsError) -> bool {
    matches!(
        err,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}
