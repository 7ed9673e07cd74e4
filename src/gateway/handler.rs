//! Message handler seam between the gateway and the units of work

use super::context::CorrelationContext;
use crate::domain::messages::decode;
use crate::domain::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::Instrument;

/// Result of the staleness guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Proceed,
    /// Nothing to do; the message is acked without running the work
    Skip(String),
}

/// How a message that did not fail was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The work ran; the continuation, if any, is published
    Completed,
    /// The guard skipped the work
    Skipped(String),
}

/// One message type and the work it triggers
#[async_trait]
pub trait MessageHandler: Send + Sync {
    type Message: DeserializeOwned + Send + Sync;

    fn name(&self) -> &'static str;

    fn context(&self, message: &Self::Message) -> CorrelationContext;

    /// Decides whether the message is stale before any work happens
    async fn guard(&self, message: &Self::Message) -> Result<Guard>;

    async fn handle(&self, message: &Self::Message) -> Result<()>;
}

/// Type-erased handler as stored by the gateway
#[async_trait]
pub trait Dispatch: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decodes and handles one raw message body
    ///
    /// # Errors
    ///
    /// A body that does not decode is an `ExporterError::Parse`; guard and
    /// work errors are returned unchanged.
    async fn dispatch(&self, body: &[u8]) -> Result<HandlerOutcome>;
}

#[async_trait]
impl<H: MessageHandler> Dispatch for H {
    fn name(&self) -> &'static str {
        MessageHandler::name(self)
    }

    async fn dispatch(&self, body: &[u8]) -> Result<HandlerOutcome> {
        let message: H::Message = decode(body)?;
        let span = self.context(&message).span(MessageHandler::name(self));

        async {
            if let Guard::Skip(reason) = self.guard(&message).await? {
                tracing::info!(reason = %reason, "Skipping message");
                return Ok(HandlerOutcome::Skipped(reason));
            }
            self.handle(&message)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Message handling failed"))?;
            tracing::info!("Message handled");
            Ok(HandlerOutcome::Completed)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExporterError;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize)]
    struct Ping {
        id: String,
    }

    #[derive(Default)]
    struct PingHandler {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for PingHandler {
        type Message = Ping;

        fn name(&self) -> &'static str {
            "ping"
        }

        fn context(&self, message: &Ping) -> CorrelationContext {
            CorrelationContext::new().document(message.id.clone())
        }

        async fn guard(&self, message: &Ping) -> Result<Guard> {
            Ok(match message.id.as_str() {
                "stale" => Guard::Skip("stale".to_string()),
                _ => Guard::Proceed,
            })
        }

        async fn handle(&self, message: &Ping) -> Result<()> {
            if message.id == "boom" {
                return Err(ExporterError::Other("boom".to_string()));
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_outcomes() {
        let handler = PingHandler::default();

        assert_eq!(
            handler.dispatch(br#"{"id": "a"}"#).await.unwrap(),
            HandlerOutcome::Completed
        );
        assert_eq!(
            handler.dispatch(br#"{"id": "stale"}"#).await.unwrap(),
            HandlerOutcome::Skipped("stale".to_string())
        );
        assert!(matches!(
            handler.dispatch(br#"{"id": "boom"}"#).await,
            Err(ExporterError::Other(_))
        ));
        assert!(matches!(
            handler.dispatch(br#"{"name": "a"}"#).await,
            Err(ExporterError::Parse(_))
        ));
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    }
}
