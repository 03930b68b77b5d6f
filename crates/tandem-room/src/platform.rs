//! The `PlatformSession` trait: the seam to the platform's session API.
//!
//! The platform performs the low-level primitives the coordinator builds
//! on: turning this instance into a host, minting switch tokens, switching
//! this instance's streams onto a host, and switching guests back.
//! Implementations are chosen at construction time: the real platform in
//! production, [`MockPlatform`](crate::MockPlatform) in tests and demos.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tandem_protocol::{Identity, MatchId, SeatIndex, SwitchToken};

use crate::PlatformError;

/// Opaque handle to a host session created by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostHandle {
    pub session_handle: String,
}

impl HostHandle {
    pub fn new(session_handle: impl Into<String>) -> Self {
        Self {
            session_handle: session_handle.into(),
        }
    }
}

/// A platform answer. Code `0` means the request was carried out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformResponse {
    pub code: i32,
    pub message: String,
}

impl PlatformResponse {
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: String::new(),
        }
    }

    pub fn failed(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Who an end-of-match switch-back instruction is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndTarget {
    Seat(SeatIndex),
    All,
}

/// The platform session API.
///
/// Errors are returned, never panicked; the coordinator turns them into
/// `Error` results.
pub trait PlatformSession: Send + Sync + 'static {
    /// Makes this instance a host session. `None` if the platform refuses.
    fn become_host(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Option<HostHandle>> + Send;

    /// The token a guest at `seat` uses to switch onto `host`.
    fn fetch_switch_token(
        &self,
        host: &HostHandle,
        seat: SeatIndex,
    ) -> impl Future<Output = Result<SwitchToken, PlatformError>> + Send;

    /// Switches this instance's streams onto the host named by `token`.
    fn switch_to(
        &self,
        token: &SwitchToken,
        seat: SeatIndex,
        match_id: &MatchId,
    ) -> impl Future<Output = Result<PlatformResponse, PlatformError>> + Send;

    /// Switches guests back to their own instances.
    fn send_end_of_match(
        &self,
        target: EndTarget,
    ) -> impl Future<Output = Result<Vec<PlatformResponse>, PlatformError>> + Send;
}
