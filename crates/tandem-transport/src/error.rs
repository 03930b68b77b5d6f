use tandem_protocol::SeatIndex;

/// Errors that can occur at the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Nobody is reachable at the target seat.
    #[error("no connection at seat {0}")]
    NotConnected(SeatIndex),

    /// The transport refused or failed to queue the message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The payload is empty or exceeds the transport's limit.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The hand-off queue's receiving side is gone.
    #[error("transport closed")]
    Closed,
}
