//! Shared vocabulary for Tandem.
//!
//! This crate defines the values every other layer talks in:
//!
//! - **Identity types** ([`SeatIndex`], [`UserId`], [`MatchId`], [`Identity`])
//! - **Result taxonomy** ([`ResultCode`], [`OpResult`]): the uniform
//!   outcome every operation reports
//! - **Matchmaking values** ([`MatchRequest`], [`MatchSession`], [`EndInfo`])
//! - **Switch tokens** ([`SwitchToken`]): what a guest presents to switch
//!   onto a host
//! - **Merge messages** ([`MergeMessage`]) and the [`Codec`] that encodes them
//!
//! It knows nothing about transports, seats, or state machines.

mod codec;
mod error;
mod matching;
mod message;
mod token;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use matching::{EndInfo, MatchParticipant, MatchRequest, MatchSession, MatchTeam, PoolConfig};
pub use message::MergeMessage;
pub use token::{SwitchToken, SwitchTokenSeed};
pub use types::{Identity, MatchId, OpResult, ResultCode, SeatIndex, UserId};
