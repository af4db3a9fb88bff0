//! Lifetime of one `SubscribeToChanges` stream.
//!
//! The transport (WebSocket today) supplies an [`EventWriter`] and a future
//! that resolves when the client goes away. Everything else, registration,
//! forwarding and cleanup, lives here so it can be tested without a socket.

use super::notifier::{ChangeNotifier, ChannelSink, SinkError};
use super::protocol::ChangeNotice;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Events buffered per subscriber before new ones are dropped.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Ordered writer for one subscriber's outbound notices.
#[async_trait]
pub trait EventWriter: Send {
    async fn write(&mut self, notice: &ChangeNotice) -> Result<(), SinkError>;
}

/// Why a subscription stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEnd {
    ClientClosed,
    /// Another stream registered for the same session.
    Replaced,
    Shutdown,
    WriteFailed,
}

/// Register a sink for `(user_id, session_id)` and forward notices to
/// `writer` until the client closes, the sink is replaced, or `shutdown`
/// fires. The registration is released on every exit path.
pub async fn serve_subscription<W, C>(
    notifier: &ChangeNotifier,
    user_id: &str,
    session_id: &str,
    mut writer: W,
    closed: C,
    shutdown: CancellationToken,
) -> SubscriptionEnd
where
    W: EventWriter,
    C: Future<Output = ()> + Send,
{
    let (sink, mut events) = ChannelSink::channel(SUBSCRIPTION_BUFFER);
    let registration = notifier.register(user_id, session_id, Arc::new(sink));
    tracing::info!(user_id, session_id, "Change subscription opened");

    tokio::pin!(closed);
    let end = loop {
        tokio::select! {
            () = shutdown.cancelled() => break SubscriptionEnd::Shutdown,
            () = &mut closed => break SubscriptionEnd::ClientClosed,
            next = events.recv() => match next {
                // A client that stops reading must not pin the write forever.
                Some(event) => {
                    let notice = event.notice();
                    tokio::select! {
                        written = writer.write(&notice) => {
                            if let Err(e) = written {
                                tracing::debug!(user_id, session_id, "Subscriber write failed: {e}");
                                break SubscriptionEnd::WriteFailed;
                            }
                        }
                        () = shutdown.cancelled() => break SubscriptionEnd::Shutdown,
                        () = &mut closed => break SubscriptionEnd::ClientClosed,
                    }
                }
                // Our registration was dropped, which only happens on replacement.
                None => break SubscriptionEnd::Replaced,
            },
        }
    };

    notifier.release(user_id, session_id, registration);
    tracing::info!(user_id, session_id, reason = ?end, "Change subscription closed");
    end
}
