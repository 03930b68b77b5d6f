//! A scripted [`PlatformSession`] for tests and demos.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tandem_protocol::{Identity, MatchId, SeatIndex, SwitchToken, SwitchTokenSeed};

use crate::{EndTarget, HostHandle, PlatformError, PlatformResponse, PlatformSession};

/// A call the mock received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    BecomeHost { open_id: String },
    FetchSwitchToken { seat: SeatIndex },
    SwitchTo { seat: SeatIndex, match_id: MatchId },
    SendEndOfMatch { target: EndTarget },
}

type EndHook = Box<dyn Fn(EndTarget) + Send + Sync>;

struct Script {
    session_handle: String,
    rtc_user_id: String,
    host_open_id: Option<String>,
    refuse_host: bool,
    switch_response: PlatformResponse,
    switch_error: Option<String>,
    token_error: Option<String>,
    end_refused: HashSet<SeatIndex>,
    end_error: Option<String>,
    calls: Vec<PlatformCall>,
}

/// Succeeds at everything unless told otherwise.
///
/// Tokens it hands out are built from its session handle and RTC user id,
/// so a guest that builds a token from [`seed`](Self::seed) gets one equal
/// to what this host fetches for any seat.
pub struct MockPlatform {
    script: Mutex<Script>,
    end_hook: Mutex<Option<EndHook>>,
}

impl MockPlatform {
    pub fn new(session_handle: impl Into<String>, rtc_user_id: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(Script {
                session_handle: session_handle.into(),
                rtc_user_id: rtc_user_id.into(),
                host_open_id: None,
                refuse_host: false,
                switch_response: PlatformResponse::ok(),
                switch_error: None,
                token_error: None,
                end_refused: HashSet::new(),
                end_error: None,
                calls: Vec::new(),
            }),
            end_hook: Mutex::new(None),
        }
    }

    /// The seed to advertise in this instance's matchmaking extra payload.
    pub fn seed(&self) -> SwitchTokenSeed {
        let script = self.script();
        SwitchTokenSeed::new(script.session_handle.clone(), script.rtc_user_id.clone())
    }

    pub fn refuse_host(&self, refuse: bool) {
        self.script().refuse_host = refuse;
    }

    /// Makes `switch_to` answer with `code`.
    pub fn set_switch_response(&self, code: i32, message: impl Into<String>) {
        self.script().switch_response = PlatformResponse::failed(code, message);
    }

    /// Makes `switch_to` raise a platform error.
    pub fn fail_switch(&self, message: impl Into<String>) {
        self.script().switch_error = Some(message.into());
    }

    pub fn fail_switch_token(&self, message: impl Into<String>) {
        self.script().token_error = Some(message.into());
    }

    /// Makes the switch-back instruction for `seat` answer with a failure
    /// code.
    pub fn refuse_end_for(&self, seat: SeatIndex) {
        self.script().end_refused.insert(seat);
    }

    /// Makes every switch-back instruction raise a platform error.
    pub fn fail_end(&self, message: impl Into<String>) {
        self.script().end_error = Some(message.into());
    }

    /// Runs `hook` after every successful switch-back instruction, e.g. to
    /// report the guest's exit through a transport sink.
    pub fn on_end_of_match(&self, hook: impl Fn(EndTarget) + Send + Sync + 'static) {
        *self
            .end_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.script().calls.clone()
    }

    /// Targets of every switch-back instruction received.
    pub fn end_targets(&self) -> Vec<EndTarget> {
        self.script()
            .calls
            .iter()
            .filter_map(|c| match c {
                PlatformCall::SendEndOfMatch { target } => Some(*target),
                _ => None,
            })
            .collect()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_end_hook(&self, target: EndTarget) {
        let hook = self.end_hook.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hook) = hook.as_ref() {
            hook(target);
        }
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new("mock-session", "mock-rtc")
    }
}

impl PlatformSession for MockPlatform {
    async fn become_host(&self, identity: &Identity) -> Option<HostHandle> {
        let mut script = self.script();
        script.calls.push(PlatformCall::BecomeHost {
            open_id: identity.open_id.clone(),
        });
        if script.refuse_host {
            return None;
        }
        script.host_open_id = Some(identity.open_id.clone());
        Some(HostHandle::new(script.session_handle.clone()))
    }

    async fn fetch_switch_token(
        &self,
        host: &HostHandle,
        seat: SeatIndex,
    ) -> Result<SwitchToken, PlatformError> {
        let mut script = self.script();
        script.calls.push(PlatformCall::FetchSwitchToken { seat });
        if let Some(message) = &script.token_error {
            return Err(PlatformError::Internal(message.clone()));
        }
        let host_open_id = script
            .host_open_id
            .clone()
            .ok_or_else(|| PlatformError::Unavailable("not hosting".into()))?;
        Ok(SwitchToken::new(
            host.session_handle.clone(),
            host_open_id,
            script.rtc_user_id.clone(),
        ))
    }

    async fn switch_to(
        &self,
        _token: &SwitchToken,
        seat: SeatIndex,
        match_id: &MatchId,
    ) -> Result<PlatformResponse, PlatformError> {
        let mut script = self.script();
        script.calls.push(PlatformCall::SwitchTo {
            seat,
            match_id: match_id.clone(),
        });
        if let Some(message) = &script.switch_error {
            return Err(PlatformError::Internal(message.clone()));
        }
        Ok(script.switch_response.clone())
    }

    async fn send_end_of_match(
        &self,
        target: EndTarget,
    ) -> Result<Vec<PlatformResponse>, PlatformError> {
        let response = {
            let mut script = self.script();
            script.calls.push(PlatformCall::SendEndOfMatch { target });
            if let Some(message) = &script.end_error {
                return Err(PlatformError::Internal(message.clone()));
            }
            match target {
                EndTarget::Seat(seat) if script.end_refused.contains(&seat) => {
                    PlatformResponse::failed(1, format!("switch-back refused for {seat}"))
                }
                _ => PlatformResponse::ok(),
            }
        };
        if response.is_ok() {
            self.run_end_hook(target);
        }
        Ok(vec![response])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_protocol::{JsonCodec, MatchParticipant};

    #[tokio::test]
    async fn test_fetched_token_matches_seed_built_token() {
        let platform = MockPlatform::new("sess-9", "rtc-9");
        let host = Identity::new("host-open", "Host");
        let handle = platform.become_host(&host).await.unwrap();

        let fetched = platform
            .fetch_switch_token(&handle, SeatIndex(2))
            .await
            .unwrap();

        let participant = MatchParticipant {
            seat: SeatIndex(0),
            identity: host,
            extra: platform.seed().encode(&JsonCodec).unwrap(),
        };
        let built = SwitchToken::from_participant(&participant, &JsonCodec).unwrap();
        assert_eq!(fetched, built);
    }

    #[tokio::test]
    async fn test_refuse_host_returns_none() {
        let platform = MockPlatform::default();
        platform.refuse_host(true);
        assert!(platform.become_host(&Identity::new("h", "")).await.is_none());
    }

    #[tokio::test]
    async fn test_end_hook_runs_only_on_success() {
        let platform = MockPlatform::default();
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        platform.on_end_of_match(move |t| sink.lock().unwrap().push(t));
        platform.refuse_end_for(SeatIndex(2));

        platform
            .send_end_of_match(EndTarget::Seat(SeatIndex(1)))
            .await
            .unwrap();
        let refused = platform
            .send_end_of_match(EndTarget::Seat(SeatIndex(2)))
            .await
            .unwrap();

        assert!(!refused[0].is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![EndTarget::Seat(SeatIndex(1))]);
        assert_eq!(platform.end_targets().len(), 2);
    }
}
