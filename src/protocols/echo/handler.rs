//! Echo session handler.

use tracing::trace;

use crate::channel::{Inbound, Outbound};
use crate::error::BoxError;

/// Handle an echo session until the connection closes.
pub async fn handle_session(mut inbound: Inbound, outbound: Outbound) -> Result<(), BoxError> {
    while let Some(payload) = inbound.recv().await {
        trace!(len = payload.len(), "Echoing payload");
        outbound.send(payload).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{pair, ConnectionEnds};
    use bytes::Bytes;

    #[tokio::test]
    async fn test_echo_preserves_order() {
        let (ends, inbound, outbound) = pair(8);
        let ConnectionEnds {
            inbound: in_tx,
            outbound: mut out_rx,
        } = ends;
        let session = tokio::spawn(handle_session(inbound, outbound));

        for msg in ["a", "bb", "ccc"] {
            in_tx.send(Bytes::from(msg)).await.unwrap();
        }
        for msg in ["a", "bb", "ccc"] {
            assert_eq!(out_rx.recv().await.unwrap(), Bytes::from(msg));
        }

        drop(in_tx);
        session.await.unwrap().unwrap();
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_echo_fails_when_outbound_closed() {
        let (ends, inbound, outbound) = pair(1);
        let ConnectionEnds {
            inbound: in_tx,
            outbound: out_rx,
        } = ends;
        drop(out_rx);

        in_tx.send(Bytes::from_static(b"lost")).await.unwrap();
        assert!(handle_session(inbound, outbound).await.is_err());
    }
}
