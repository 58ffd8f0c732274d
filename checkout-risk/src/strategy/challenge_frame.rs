//! Built-in strategy: a hosted challenge page in a frame.
//!
//! The frame loads `{api}/three_d_secure/start` for the action token. When
//! the container reports the challenge results, they are submitted with
//! `POST /tokens` and the resulting token is emitted on the concern.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use url::Url;

use super::{ChallengeFrame, Container, Strategy, StrategyBuilder, StrategyContext};
use crate::config::SessionConfig;
use crate::error::RiskError;
use crate::proto::{ActionProfile, ActionResultRequest, TokenDetails};
use crate::session::TransportRequest;

/// Name of the challenge-frame strategy.
pub const CHALLENGE_FRAME_STRATEGY: &str = "challenge_frame";

/// Default frame width.
pub const DEFAULT_FRAME_WIDTH: u32 = 500;

/// Default frame height.
pub const DEFAULT_FRAME_HEIGHT: u32 = 600;

/// Builds [`ChallengeFrameStrategy`] for any profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeFrameBuilder {
    width: u32,
    height: u32,
}

impl Default for ChallengeFrameBuilder {
    fn default() -> Self {
        Self {
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
        }
    }
}

impl ChallengeFrameBuilder {
    /// Sets the frame dimensions.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

impl StrategyBuilder for ChallengeFrameBuilder {
    fn name(&self) -> &str {
        CHALLENGE_FRAME_STRATEGY
    }

    fn matches(&self, _profile: &ActionProfile) -> bool {
        true
    }

    fn build(
        &self,
        ctx: StrategyContext,
        _profile: &ActionProfile,
    ) -> Result<Box<dyn Strategy>, RiskError> {
        let url = start_url(ctx.session().config(), ctx.action_token())?;
        Ok(Box::new(ChallengeFrameStrategy {
            ctx,
            url,
            width: self.width,
            height: self.height,
            mounted: Mutex::new(Vec::new()),
        }))
    }
}

/// Builds the challenge start URL for `action_token`.
fn start_url(config: &SessionConfig, action_token: &str) -> Result<Url, RiskError> {
    let mut url = config.api.clone();
    url.path_segments_mut()
        .map_err(|()| RiskError::InvalidOption {
            name: "api",
            expect: "a hierarchical base URL",
        })?
        .pop_if_empty()
        .extend(["three_d_secure", "start"]);
    url.query_pairs_mut()
        .append_pair("key", &config.public_key)
        .append_pair("three_d_secure_action_token_id", action_token);
    Ok(url)
}

/// Presents the hosted challenge page and submits its results.
#[derive(Debug)]
pub struct ChallengeFrameStrategy {
    ctx: StrategyContext,
    url: Url,
    width: u32,
    height: u32,
    mounted: Mutex<Vec<Arc<dyn Container>>>,
}

impl ChallengeFrameStrategy {
    fn mounted(&self) -> MutexGuard<'_, Vec<Arc<dyn Container>>> {
        self.mounted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the page the frame loads.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Handles the frame's outcome: submits results, then emits the token.
    fn complete(ctx: &StrategyContext, outcome: Result<Value, RiskError>) -> Result<(), RiskError> {
        let results = match outcome {
            Ok(results) => results,
            Err(err) => return ctx.error(err),
        };
        let body = match serde_json::to_value(ActionResultRequest::new(ctx.action_token(), results))
        {
            Ok(body) => body,
            Err(err) => return ctx.error(RiskError::decode("action result", &err)),
        };

        let reply_ctx = ctx.clone();
        ctx.session()
            .request(TransportRequest::post("/tokens", body), move |reply| {
                let payload = match reply {
                    Ok(payload) => payload,
                    Err(err) => return reply_ctx.error(err.into()),
                };
                match serde_json::from_value::<TokenDetails>(payload) {
                    Ok(token) => {
                        reply_ctx.token(token);
                        Ok(())
                    }
                    Err(err) => reply_ctx.error(RiskError::decode("token", &err)),
                }
            })
    }
}

impl Strategy for ChallengeFrameStrategy {
    fn name(&self) -> &str {
        CHALLENGE_FRAME_STRATEGY
    }

    fn attach(&self, container: Arc<dyn Container>) -> Result<(), RiskError> {
        let frame = ChallengeFrame {
            url: self.url.clone(),
            width: self.width,
            height: self.height,
            action_token: self.ctx.action_token().to_owned(),
        };
        let ctx = self.ctx.clone();
        container.mount(frame, Box::new(move |outcome| Self::complete(&ctx, outcome)))?;
        self.mounted().push(container);
        Ok(())
    }

    fn remove(&self) {
        let mounted = std::mem::take(&mut *self.mounted());
        for container in mounted {
            container.unmount();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concern::{ConcernEvent, ConcernEventKind};
    use crate::error::TransportError;
    use crate::event::EventChannel;
    use crate::session::Method;
    use crate::testing::{EventLog, MockTransport, RecordingContainer, session_with};
    use serde_json::json;

    fn strategy(transport: &MockTransport) -> (Box<dyn Strategy>, EventChannel<ConcernEvent>) {
        let events = EventChannel::new();
        let ctx = StrategyContext::new(session_with(transport.clone()), "tok_123".into(), events.clone());
        let strategy = ChallengeFrameBuilder::default()
            .build(ctx, &ActionProfile::default())
            .unwrap();
        (strategy, events)
    }

    #[test]
    fn test_attach_mounts_start_frame() {
        let transport = MockTransport::deferred();
        let (strategy, _events) = strategy(&transport);
        let container = RecordingContainer::new();

        strategy.attach(Arc::clone(&container) as Arc<dyn Container>).unwrap();

        let frames = container.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].url.as_str(),
            "https://api.recurly.com/js/v1/three_d_secure/start?key=ewr1-test&three_d_secure_action_token_id=tok_123"
        );
        assert_eq!((frames[0].width, frames[0].height), (DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT));
        assert_eq!(frames[0].action_token, "tok_123");
    }

    #[test]
    fn test_completion_submits_results_and_emits_token() {
        let transport = MockTransport::deferred();
        let (strategy, events) = strategy(&transport);
        let log = EventLog::attach(&events);
        let container = RecordingContainer::new();
        strategy.attach(Arc::clone(&container) as Arc<dyn Container>).unwrap();

        container.complete(Ok(json!({ "cres": "abc" }))).unwrap();
        assert_eq!(transport.pending(), 1);
        assert_eq!(log.count(ConcernEventKind::Token), 0);

        let request = transport.requests().pop().unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/tokens");
        assert_eq!(
            request.body.unwrap(),
            json!({
                "type": "three_d_secure_action_result",
                "three_d_secure_action_token_id": "tok_123",
                "results": { "cres": "abc" }
            })
        );

        transport
            .resolve_next(Ok(json!({ "id": "3dsr_1", "type": "three_d_secure_action_result" })))
            .unwrap();

        assert_eq!(
            log.events(),
            vec![ConcernEvent::Token(TokenDetails {
                id: "3dsr_1".into(),
                kind: "three_d_secure_action_result".into(),
            })]
        );
    }

    #[test]
    fn test_frame_failure_is_emitted_and_returned() {
        let transport = MockTransport::deferred();
        let (strategy, events) = strategy(&transport);
        let log = EventLog::attach(&events);
        let container = RecordingContainer::new();
        strategy.attach(Arc::clone(&container) as Arc<dyn Container>).unwrap();

        let err = RiskError::challenge("frame_closed", "user closed the challenge");
        assert_eq!(container.complete(Err(err.clone())), Err(err.clone()));
        assert_eq!(log.count(ConcernEventKind::Error), 1);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_submission_failure_is_emitted_and_returned() {
        let transport = MockTransport::deferred();
        let (strategy, events) = strategy(&transport);
        let log = EventLog::attach(&events);
        let container = RecordingContainer::new();
        strategy.attach(Arc::clone(&container) as Arc<dyn Container>).unwrap();
        container.complete(Ok(json!({}))).unwrap();

        let err = TransportError::api("invalid-results", "Results rejected").with_status(422);
        assert_eq!(transport.resolve_next(Err(err.clone())), Err(err.into()));
        assert_eq!(log.count(ConcernEventKind::Error), 1);
        assert_eq!(log.count(ConcernEventKind::Token), 0);
    }

    #[test]
    fn test_malformed_token_is_decode_error() {
        let transport = MockTransport::deferred();
        let (strategy, events) = strategy(&transport);
        let log = EventLog::attach(&events);
        let container = RecordingContainer::new();
        strategy.attach(Arc::clone(&container) as Arc<dyn Container>).unwrap();
        container.complete(Ok(json!({}))).unwrap();

        let result = transport.resolve_next(Ok(json!({ "unexpected": true })));
        assert!(matches!(result, Err(RiskError::Decode { context: "token", .. })));
        assert_eq!(log.count(ConcernEventKind::Error), 1);
    }

    #[test]
    fn test_remove_unmounts_every_container() {
        let transport = MockTransport::deferred();
        let (strategy, _events) = strategy(&transport);
        let first = RecordingContainer::new();
        let second = RecordingContainer::new();
        strategy.attach(Arc::clone(&first) as Arc<dyn Container>).unwrap();
        strategy.attach(Arc::clone(&second) as Arc<dyn Container>).unwrap();

        strategy.remove();
        strategy.remove();

        assert_eq!(first.unmount_count(), 1);
        assert_eq!(second.unmount_count(), 1);
    }

    #[test]
    fn test_opaque_api_url_is_rejected() {
        let config = SessionConfig::new("ewr1-test").with_api(Url::parse("data:text/plain,x").unwrap());
        assert!(matches!(
            start_url(&config, "tok"),
            Err(RiskError::InvalidOption { name: "api", .. })
        ));
    }
}
