use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{
    action::action_model::Action,
    agent::{
        agent_model::{Decision, DecisionRequest},
        prompt::{state_message, system_prompt},
    },
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("could not parse response: {0}")]
    Parse(String),

    #[error("no decision returned")]
    Empty,
}

/// Picks the next action for a snapshot.
#[async_trait]
pub trait DecisionMaker: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, DecisionError>;
}

#[async_trait]
impl<T: DecisionMaker + ?Sized> DecisionMaker for Arc<T> {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, DecisionError> {
        (**self).decide(request).await
    }
}

#[derive(Deserialize)]
struct ModelReply {
    #[serde(default)]
    done: Option<DoneReply>,
    #[serde(default)]
    action: Option<Value>,
}

#[derive(Deserialize)]
struct DoneReply {
    success: bool,
    #[serde(default)]
    text: String,
}

/// Parse a model reply.
///
/// Accepts `{"action": {"op": "tap", "target": 3}}` or
/// `{"done": {"success": true, "text": "..."}}`, optionally wrapped in a
/// markdown code fence or surrounded by prose. Reasoning blocks
/// (`<think>...</think>`) are dropped first.
pub fn parse_decision(raw: &str) -> Result<Decision, DecisionError> {
    let visible = strip_think_tags(raw);
    let json = extract_json(&visible).ok_or(DecisionError::Empty)?;

    let reply: ModelReply =
        serde_json::from_str(json).map_err(|e| DecisionError::Parse(e.to_string()))?;

    if let Some(done) = reply.done {
        return Ok(if done.success {
            Decision::Complete { summary: done.text }
        } else {
            Decision::Fail { reason: done.text }
        });
    }

    let action = reply.action.ok_or(DecisionError::Empty)?;
    serde_json::from_value::<Action>(action)
        .map(Decision::Act)
        .map_err(|e| DecisionError::Parse(format!("invalid action: {}", e)))
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

fn strip_think_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find(THINK_OPEN) {
        let Some(len) = rest[start..].find(THINK_CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + len + THINK_CLOSE.len()..];
    }
    out.push_str(rest);

    // A closing tag without its opener ends a reasoning prefix.
    match out.rfind(THINK_CLOSE) {
        Some(end) => out[end + THINK_CLOSE.len()..].to_string(),
        None => out,
    }
}

fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

// ============================================================================
// Ollama Backend
// ============================================================================

pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:1.5b";

pub struct OllamaDecisionMaker {
    client: reqwest::Client,
    pub endpoint: String,
    pub model: String,
}

impl Default for OllamaDecisionMaker {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_ENDPOINT, DEFAULT_OLLAMA_MODEL)
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: String,
    prompt: String,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaDecisionMaker {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl DecisionMaker for OllamaDecisionMaker {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, DecisionError> {
        let body = OllamaRequest {
            model: &self.model,
            system: system_prompt(),
            prompt: state_message(request),
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| DecisionError::Transport(e.to_string()))?;

        let reply: OllamaResponse = response
            .json()
            .await
            .map_err(|e| DecisionError::Parse(e.to_string()))?;

        debug!(model = %self.model, reply = %reply.response, "model replied");
        parse_decision(&reply.response)
    }
}

// ============================================================================
// Scripted Backend (for running without a model)
// ============================================================================

/// Replays a fixed sequence of decisions and records every request.
///
/// Once the script runs out it reports failure, so a run can never succeed
/// by accident.
pub struct ScriptedDecisionMaker {
    script: Mutex<VecDeque<Result<Decision, DecisionError>>>,
    requests: Mutex<Vec<DecisionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedDecisionMaker {
    pub fn new(script: Vec<Result<Decision, DecisionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn from_decisions(decisions: Vec<Decision>) -> Self {
        Self::new(decisions.into_iter().map(Ok).collect())
    }

    /// Simulate a slow model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<DecisionRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl DecisionMaker for ScriptedDecisionMaker {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, DecisionError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(_) => None,
        };

        next.unwrap_or_else(|| {
            Ok(Decision::Fail {
                reason: "script exhausted".into(),
            })
        })
    }
}
