//! Wire format types exchanged with the remote API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token type sent when submitting a completed 3-D Secure challenge.
pub const ACTION_RESULT_TOKEN_TYPE: &str = "three_d_secure_action_result";

/// Challenge metadata returned by `GET /token/{actionToken}`.
///
/// The payload is opaque to the orchestration layer: any JSON document is a
/// valid profile. Strategies read the parts they understand through the
/// lenient accessors, which return `None` for anything missing or
/// differently shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionProfile(Value);

impl Default for ActionProfile {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl ActionProfile {
    /// Wraps a raw payload.
    #[must_use]
    pub const fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// Returns the raw payload.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.0
    }

    fn str_at(&self, pointer: &str) -> Option<&str> {
        self.0.pointer(pointer).and_then(Value::as_str)
    }

    /// Returns the token identifier echoed by the API, if present.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.str_at("/id")
    }

    /// Returns the token type (e.g., `"three_d_secure_action"`), if present.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.str_at("/type")
    }

    /// Returns `gateway.type` (e.g., `"adyen"`), if present.
    #[must_use]
    pub fn gateway_type(&self) -> Option<&str> {
        self.str_at("/gateway/type")
    }

    /// Returns `three_d_secure.params`, if present.
    #[must_use]
    pub fn challenge_params(&self) -> Option<&Value> {
        self.0.pointer("/three_d_secure/params")
    }
}

/// Body of `POST /tokens` carrying a challenge outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResultRequest {
    /// Always [`ACTION_RESULT_TOKEN_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// The action token the challenge was started for.
    pub three_d_secure_action_token_id: String,
    /// Processor-specific challenge results.
    pub results: Value,
}

impl ActionResultRequest {
    /// Creates a result submission for `action_token`.
    #[must_use]
    pub fn new(action_token: impl Into<String>, results: Value) -> Self {
        Self {
            kind: ACTION_RESULT_TOKEN_TYPE.to_owned(),
            three_d_secure_action_token_id: action_token.into(),
            results,
        }
    }
}

/// Token returned once a challenge result has been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDetails {
    /// Token identifier to hand to the merchant backend.
    pub id: String,
    /// Token type.
    #[serde(rename = "type")]
    pub kind: String,
}
