//! Error types for the seat layer.

use tandem_protocol::{ResultCode, SeatIndex};

/// Errors raised while applying transport notifications or seat commands.
#[derive(Debug, thiserror::Error)]
pub enum SeatError {
    /// The transport named a seat that does not exist. The transport is
    /// violating its contract; nothing here can recover from it.
    #[error("seat {seat} is out of range (capacity {capacity})")]
    IndexOutOfRange { seat: SeatIndex, capacity: usize },

    /// The transport sent a join or exit without a user id.
    #[error("notification for seat {0} carries an empty user id")]
    EmptyUserId(SeatIndex),

    /// A command needed an occupant and the seat is empty.
    #[error("seat {0} is not occupied")]
    NotOccupied(SeatIndex),
}

impl SeatError {
    /// `true` for collaborator contract violations, which are surfaced to
    /// the application as a blocking notification.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotOccupied(_))
    }

    pub fn code(&self) -> ResultCode {
        match self {
            Self::IndexOutOfRange { .. } | Self::EmptyUserId(_) | Self::NotOccupied(_) => {
                ResultCode::InvalidArgument
            }
        }
    }
}
