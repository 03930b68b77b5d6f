//! # Tandem
//!
//! Merges independent live-streaming sessions into one multiplayer
//! session, and takes the merge apart again.
//!
//! One instance is designated host by the matchmaking backend; up to three
//! guests switch their streams onto it. When the host ends the match, each
//! guest is told first and switched back second, so nobody is ever sent
//! home without notice.
//!
//! ## Layers
//!
//! ```text
//! Tandem (this crate)   ← match state machine, backend seam, events, driver
//!     ↕
//! tandem-room           ← switch coordinator, host room, platform seam
//!     ↕
//! tandem-seat           ← seat registry reconciling join/exit notifications
//! tandem-call           ← cancellable operations, reliable call engine
//!     ↕
//! tandem-transport      ← hand-off queue from the transport thread
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tandem::prelude::*;
//!
//! # async fn run() -> Result<(), TandemError> {
//! let (sink, inbox) = handoff_channel();
//! let transport = Arc::new(LoopbackTransport::new(sink));
//! let platform = Arc::new(MockPlatform::default());
//! let backend = Arc::new(MockBackend::default());
//!
//! let tandem = TandemBuilder::new().build(backend, platform, transport, inbox)?;
//! let result = tandem
//!     .request_match(MatchRequest::new(PoolConfig::new("duo")), CancellationToken::new())
//!     .await;
//! println!("match finished: {}", result.code);
//! tandem.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod driver;
mod error;
mod events;
mod orchestrator;
mod state;

pub use backend::{BackendError, MatchmakingBackend, MockBackend};
pub use config::TandemConfig;
pub use error::TandemError;
pub use events::{EndReason, EventBus, MergeEvent, Subscription};
pub use orchestrator::{MatchResult, Tandem, TandemBuilder};
pub use state::MatchState;

/// Everything needed to wire up and drive an orchestrator.
pub mod prelude {
    pub use crate::{
        BackendError, EndReason, MatchResult, MatchState, MatchmakingBackend, MergeEvent,
        MockBackend, Tandem, TandemBuilder, TandemConfig, TandemError,
    };
    pub use tandem_protocol::{
        EndInfo, Identity, MatchId, MatchParticipant, MatchRequest, MatchSession, MatchTeam,
        OpResult, PoolConfig, ResultCode, SeatIndex, SwitchToken, SwitchTokenSeed, UserId,
    };
    pub use tandem_room::{EndResult, MockPlatform, PlatformSession, SwitchState};
    pub use tandem_transport::{ExitReason, LoopbackTransport, TransportSink, handoff_channel};
    pub use tokio_util::sync::CancellationToken;
}
