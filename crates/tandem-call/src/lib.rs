//! Async operation wrappers and the reliable call engine.
//!
//! - [`CancelScope`], [`run_op`], [`run_with_timeout`]: every blocking
//!   external call runs as a cancellable, timeout-bounded operation and
//!   finishes with an [`Outcome`]
//! - [`CallEngine`]: queued, retried, deadline-bounded custom messages over
//!   a [`Transport`](tandem_transport::Transport), advanced once per tick

mod engine;
mod error;
mod op;

pub use engine::{CallConfig, CallEngine, CallHandle, CallId, CallResponse, TickReport};
pub use error::CallError;
pub use op::{CancelReason, CancelScope, OpError, Outcome, run_op, run_with_timeout};
