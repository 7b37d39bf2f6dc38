use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::llm_service::TokenStream;

use super::orchestrator::TurnPhase;
use super::persistence::PersistenceWriter;

/// Fans one generated increment out to the client channel while keeping the
/// full answer text for persistence.
pub struct ResponseMultiplexer {
    client: flume::Sender<Bytes>,
    accumulated: String,
    disconnected: bool,
}

impl ResponseMultiplexer {
    pub fn new(client: flume::Sender<Bytes>) -> Self {
        Self {
            client,
            accumulated: String::new(),
            disconnected: false,
        }
    }

    /// Forward one increment in arrival order, then accumulate it. Returns
    /// false once the client has gone away; an increment that could not be
    /// delivered is discarded, not accumulated, so the accumulator always
    /// equals the concatenation of delivered increments.
    pub async fn deliver(&mut self, increment: &str) -> bool {
        if self.disconnected {
            return false;
        }

        if self
            .client
            .send_async(Bytes::from(increment.to_owned()))
            .await
            .is_err()
        {
            self.disconnected = true;
            return false;
        }

        self.accumulated.push_str(increment);
        true
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

/// Drives one turn's generation to completion: streams increments to the
/// client, then persists whatever accumulated before letting the stream
/// close. Runs detached from the request handler.
pub async fn pump_answer(
    mut tokens: TokenStream,
    client: flume::Sender<Bytes>,
    writer: PersistenceWriter,
    conversation_id: Uuid,
) {
    let cancel = tokens.cancel_handle();
    let mut mux = ResponseMultiplexer::new(client);

    while let Some(item) = tokens.next().await {
        match item {
            Ok(increment) => {
                if increment.is_empty() {
                    continue;
                }
                if !mux.deliver(&increment).await {
                    info!(%conversation_id, "client disconnected mid-stream, cancelling generation");
                    cancel.cancel();
                    // Discard whatever the source still yields.
                    while tokens.next().await.is_some() {}
                    break;
                }
            }
            Err(e) => {
                // The client sees a truncated answer, not an error frame.
                warn!(%conversation_id, error = %e, "generation failed mid-stream");
                break;
            }
        }
    }

    debug!(phase = ?TurnPhase::Persisting, %conversation_id, "turn phase");
    let full_text = mux.accumulated().to_string();
    if let Err(e) = writer.save_ai_message(conversation_id, &full_text).await {
        error!(%conversation_id, error = %e, "failed to persist assistant message");
    } else {
        debug!(
            phase = ?TurnPhase::Completed,
            %conversation_id,
            chars = full_text.len(),
            "turn phase"
        );
    }

    // The client stream closes when the sender drops, after persistence.
    drop(mux);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increments_delivered_in_order_and_accumulated() {
        let (tx, rx) = flume::unbounded();
        let mut mux = ResponseMultiplexer::new(tx);

        assert!(mux.deliver("Hel").await);
        assert!(mux.deliver("lo").await);

        assert_eq!(&rx.recv_async().await.unwrap()[..], b"Hel");
        assert_eq!(&rx.recv_async().await.unwrap()[..], b"lo");
        assert_eq!(mux.accumulated(), "Hello");
    }

    #[tokio::test]
    async fn test_zero_increments_leave_empty_accumulator() {
        let (tx, _rx) = flume::unbounded();
        let mux = ResponseMultiplexer::new(tx);
        assert_eq!(mux.accumulated(), "");
    }

    #[tokio::test]
    async fn test_disconnected_client_stops_accumulation() {
        let (tx, rx) = flume::unbounded();
        let mut mux = ResponseMultiplexer::new(tx);

        assert!(mux.deliver("kept").await);
        drop(rx);

        assert!(!mux.deliver("lost").await);
        assert!(mux.is_disconnected());
        assert_eq!(mux.accumulated(), "kept");

        // Stays closed afterwards.
        assert!(!mux.deliver("still lost").await);
        assert_eq!(mux.accumulated(), "kept");
    }
}
