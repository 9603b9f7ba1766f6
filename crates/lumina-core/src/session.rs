use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::{TokenProvider, to_websocket_url};
use crate::errors::LuminaError;

/// Everything the live view needs to connect. Created once per successful
/// join and dropped when the user leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub server_url: String,
    pub auth_token: String,
    pub display_name: String,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

/// What the pre-join screen submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub room_name: String,
    pub participant_name: String,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinState {
    pub loading: bool,
    pub error: Option<String>,
    pub session: Option<SessionConfig>,
}

impl JoinState {
    /// The join button is usable whenever no request is in flight.
    pub fn can_join(&self) -> bool {
        !self.loading
    }
}

/// Clears `loading` if a join future is dropped before the token arrives.
struct InFlight<'a> {
    state_tx: &'a watch::Sender<JoinState>,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!("join cancelled");
            self.state_tx.send_modify(|state| state.loading = false);
        }
    }
}

/// Drives the pre-join → live transition.
///
/// Every failure ends with `loading == false` and a non-empty `error`, so
/// the join affordance is always usable again.
pub struct JoinController {
    server_url: String,
    tokens: Arc<dyn TokenProvider>,
    state_tx: watch::Sender<JoinState>,
}

impl JoinController {
    /// An `http(s)://` server URL is accepted and dialled as `ws(s)://`.
    pub fn new(server_url: &str, tokens: Arc<dyn TokenProvider>) -> Self {
        let (state_tx, _) = watch::channel(JoinState::default());
        Self {
            server_url: to_websocket_url(server_url),
            tokens,
            state_tx,
        }
    }

    pub fn state(&self) -> JoinState {
        self.state_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<JoinState> {
        self.state_tx.subscribe()
    }

    pub fn session(&self) -> Option<SessionConfig> {
        self.state_tx.borrow().session.clone()
    }

    pub async fn join(&self, request: JoinRequest) -> Result<SessionConfig, LuminaError> {
        let started = self.state_tx.send_if_modified(|state| {
            if state.loading {
                return false;
            }
            state.loading = true;
            state.error = None;
            true
        });
        if !started {
            return Err(LuminaError::JoinFailed("a join is already in progress".into()));
        }
        let mut in_flight = InFlight {
            state_tx: &self.state_tx,
            finished: false,
        };

        tracing::info!(
            "joining room '{}' as '{}'",
            request.room_name,
            request.participant_name
        );

        let result = self
            .tokens
            .request_token(&request.room_name, &request.participant_name)
            .await;
        in_flight.finished = true;

        match result {
            Ok(token) => {
                let config = SessionConfig {
                    server_url: self.server_url.clone(),
                    auth_token: token,
                    display_name: request.participant_name,
                    audio_enabled: request.audio_enabled,
                    video_enabled: request.video_enabled,
                };
                self.state_tx.send_modify(|state| {
                    state.loading = false;
                    state.error = None;
                    state.session = Some(config.clone());
                });
                Ok(config)
            }
            Err(e) => {
                tracing::error!("join failed: {e}");
                let err = LuminaError::from(e);
                self.fail_with(&err);
                Err(err)
            }
        }
    }

    /// The live session could not be established after all; return to the
    /// pre-join screen with the reason shown.
    pub fn report_connection_failure(&self, err: &LuminaError) {
        tracing::error!("connection failed: {err}");
        self.fail_with(err);
    }

    pub fn leave(&self) {
        self.state_tx.send_modify(|state| {
            state.session = None;
            state.loading = false;
        });
        tracing::info!("left session");
    }

    fn fail_with(&self, err: &LuminaError) {
        let message = match err {
            LuminaError::JoinFailed(m) if !m.is_empty() => m.clone(),
            other => other.to_string(),
        };
        self.state_tx.send_modify(|state| {
            state.loading = false;
            state.session = None;
            state.error = Some(message);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    struct StaticTokens(Result<String, TokenError>);

    #[async_trait]
    impl TokenProvider for StaticTokens {
        async fn request_token(&self, _room: &str, _name: &str) -> Result<String, TokenError> {
            self.0.clone()
        }
    }

    /// Answers each request with the next queued receiver.
    struct GatedTokens(Mutex<VecDeque<oneshot::Receiver<String>>>);

    impl GatedTokens {
        fn new(gates: impl IntoIterator<Item = oneshot::Receiver<String>>) -> Self {
            Self(Mutex::new(gates.into_iter().collect()))
        }
    }

    #[async_trait]
    impl TokenProvider for GatedTokens {
        async fn request_token(&self, _room: &str, _name: &str) -> Result<String, TokenError> {
            let rx = self.0.lock().unwrap().pop_front().expect("queued answer");
            rx.await.map_err(|e| TokenError::Request(e.to_string()))
        }
    }

    fn request() -> JoinRequest {
        JoinRequest {
            room_name: "standup".into(),
            participant_name: "alice".into(),
            audio_enabled: true,
            video_enabled: false,
        }
    }

    #[tokio::test]
    async fn successful_join_produces_session_config() {
        let ctl = JoinController::new("ws://lk.local:7880", Arc::new(StaticTokens(Ok("abc".into()))));

        let config = ctl.join(request()).await.unwrap();

        assert_eq!(
            config,
            SessionConfig {
                server_url: "ws://lk.local:7880".into(),
                auth_token: "abc".into(),
                display_name: "alice".into(),
                audio_enabled: true,
                video_enabled: false,
            }
        );
        let state = ctl.state();
        assert!(!state.loading);
        assert_eq!(state.error, None);
        assert_eq!(state.session, Some(config));
    }

    #[tokio::test]
    async fn server_error_surfaces_message_and_clears_loading() {
        let tokens = StaticTokens(Err(TokenError::Status {
            status: 500,
            reason: "Internal Server Error".into(),
        }));
        let ctl = JoinController::new("ws://lk.local:7880", Arc::new(tokens));

        assert!(ctl.join(request()).await.is_err());

        let state = ctl.state();
        assert!(!state.loading);
        assert!(state.can_join());
        assert!(state.session.is_none());
        let error = state.error.expect("error set");
        assert!(!error.is_empty());
        assert!(error.contains("500"));
    }

    #[tokio::test]
    async fn missing_token_is_an_error_not_a_session() {
        let ctl = JoinController::new(
            "ws://lk.local:7880",
            Arc::new(StaticTokens(Err(TokenError::MissingToken))),
        );

        assert!(ctl.join(request()).await.is_err());

        let state = ctl.state();
        assert_eq!(state.error.as_deref(), Some("missing token"));
        assert!(!state.loading);
        assert!(state.session.is_none());
    }

    #[tokio::test]
    async fn loading_is_set_while_request_in_flight() {
        let (tx, rx) = oneshot::channel();
        let ctl = Arc::new(JoinController::new(
            "ws://lk.local:7880",
            Arc::new(GatedTokens::new([rx])),
        ));
        let mut watch = ctl.watch();

        let task = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.join(request()).await }
        });
        watch.wait_for(|s| s.loading).await.unwrap();
        assert!(!ctl.state().can_join());
        assert!(ctl.join(request()).await.is_err());

        tx.send("abc".into()).unwrap();
        task.await.unwrap().unwrap();
        assert!(!ctl.state().loading);
    }

    #[tokio::test]
    async fn cancelled_join_does_not_stay_loading() {
        let (_never, stalled) = oneshot::channel();
        let (answer, answered) = oneshot::channel();
        let ctl = Arc::new(JoinController::new(
            "ws://lk.local:7880",
            Arc::new(GatedTokens::new([stalled, answered])),
        ));
        let mut watch = ctl.watch();

        let task = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.join(request()).await }
        });
        watch.wait_for(|s| s.loading).await.unwrap();
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let state = ctl.state();
        assert!(!state.loading);
        assert!(state.can_join());

        answer.send("abc".into()).unwrap();
        let config = ctl.join(request()).await.unwrap();
        assert_eq!(config.auth_token, "abc");
    }

    #[tokio::test]
    async fn new_attempt_clears_previous_error_and_leave_drops_session() {
        let failing = JoinController::new("ws://x", Arc::new(StaticTokens(Err(TokenError::MissingToken))));
        assert!(failing.join(request()).await.is_err());
        assert!(failing.state().error.is_some());

        let ctl = JoinController::new("ws://x", Arc::new(StaticTokens(Ok("abc".into()))));
        ctl.report_connection_failure(&LuminaError::Connection("refused".into()));
        assert_eq!(ctl.state().error.as_deref(), Some("connection failed: refused"));

        ctl.join(request()).await.unwrap();
        assert_eq!(ctl.state().error, None);

        ctl.leave();
        assert!(ctl.session().is_none());
    }

    #[tokio::test]
    async fn http_server_url_is_dialled_as_websocket() {
        let ctl = JoinController::new("https://lk.example.com", Arc::new(StaticTokens(Ok("abc".into()))));
        let config = ctl.join(request()).await.unwrap();
        assert_eq!(config.server_url, "wss://lk.example.com");
    }
}
