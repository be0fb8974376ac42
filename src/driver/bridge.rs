use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::driver::{
    driver_model::{Bounds, Driver, DriverCommand, RawNode},
    error::DriverError,
};

/// How to start the helper process that owns the Appium session.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Desired capabilities forwarded verbatim to Appium.
    pub capabilities: Value,
}

/// Request sent to the helper over stdin (one JSON line).
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BridgeRequest<'a> {
    Start { capabilities: &'a Value },
    Tree,
    Screen,
    Dispatch { command: &'a DriverCommand },
    Quit,
}

impl BridgeRequest<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeRequest::Start { .. } => "start",
            BridgeRequest::Tree => "tree",
            BridgeRequest::Screen => "screen",
            BridgeRequest::Dispatch { command } => command.name(),
            BridgeRequest::Quit => "quit",
        }
    }
}

/// Wire envelope: every request carries an id that the helper echoes back.
#[derive(Debug, Serialize)]
pub struct BridgeEnvelope<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub request: BridgeRequest<'a>,
}

/// Response received from the helper over stdout (one JSON line).
#[derive(Debug, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<BridgeFailure>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub ready: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BridgeFailure {
    pub kind: FailureKind,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Stale,
    Timeout,
    Unavailable,
    #[serde(other)]
    Command,
}

impl BridgeResponse {
    /// Turn a response into its payload, mapping helper failures onto the
    /// driver error taxonomy.
    pub fn into_result(self, command: &str) -> Result<Option<Value>, DriverError> {
        if self.ok {
            return Ok(self.data);
        }

        let failure = self.error.unwrap_or(BridgeFailure {
            kind: FailureKind::Command,
            message: "unknown error".into(),
        });

        Err(match failure.kind {
            FailureKind::Stale => DriverError::StaleElement(failure.message),
            FailureKind::Timeout => DriverError::Timeout(failure.message),
            FailureKind::Unavailable => DriverError::Unavailable(failure.message),
            FailureKind::Command => DriverError::command(command, failure.message),
        })
    }
}

/// A driver backed by a long-lived helper process.
///
/// The helper keeps the Appium session open and translates the page source
/// into [`RawNode`] JSON. Commands are NDJSON over stdin, responses NDJSON
/// over stdout. Responses whose id does not match the pending request belong
/// to an abandoned (timed out) request and are skipped.
///
/// Both directions keep their partial line on the driver, so a request
/// abandoned mid-write or mid-read leaves the stream aligned for the next one.
pub struct BridgeDriver {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    /// Encoded bytes not yet accepted by the helper's stdin.
    outbox: Vec<u8>,
    /// Bytes of the response line read so far.
    inbox: Vec<u8>,
    next_id: u64,
    closed: bool,
}

impl BridgeDriver {
    pub async fn launch(config: &BridgeConfig) -> Result<Self, DriverError> {
        info!(program = %config.program, "launching automation bridge");

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DriverError::Unavailable(format!("failed to spawn {}: {}", config.program, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Unavailable("failed to capture bridge stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Unavailable("failed to capture bridge stdout".into()))?;

        let mut driver = BridgeDriver {
            child,
            stdin,
            reader: BufReader::new(stdout),
            outbox: Vec::new(),
            inbox: Vec::new(),
            next_id: 0,
            closed: false,
        };

        let response = driver
            .send(BridgeRequest::Start {
                capabilities: &config.capabilities,
            })
            .await?;

        if response.ready != Some(true) {
            response.into_result("start")?;
            return Err(DriverError::Protocol(
                "bridge did not report a ready session".into(),
            ));
        }

        Ok(driver)
    }

    async fn send(&mut self, request: BridgeRequest<'_>) -> Result<BridgeResponse, DriverError> {
        if self.closed {
            return Err(DriverError::Unavailable("bridge session closed".into()));
        }

        let id = self.next_id;
        self.next_id += 1;

        let envelope = BridgeEnvelope { id, request };

        let json = serde_json::to_vec(&envelope)
            .map_err(|e| DriverError::Protocol(format!("failed to encode request: {}", e)))?;
        self.outbox.extend_from_slice(&json);
        self.outbox.push(b'\n');

        // `write` is cancel safe: bytes leave the outbox only once accepted.
        while !self.outbox.is_empty() {
            match self.stdin.write(&self.outbox).await {
                Ok(0) => {
                    self.closed = true;
                    return Err(DriverError::Unavailable("bridge stdin closed".into()));
                }
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(e) => {
                    self.closed = true;
                    return Err(DriverError::Unavailable(format!("bridge stdin closed: {}", e)));
                }
            }
        }
        if let Err(e) = self.stdin.flush().await {
            self.closed = true;
            return Err(DriverError::Unavailable(format!("bridge stdin flush failed: {}", e)));
        }

        loop {
            let read = self
                .reader
                .read_until(b'\n', &mut self.inbox)
                .await
                .map_err(|e| DriverError::Unavailable(format!("bridge stdout failed: {}", e)))?;

            if read == 0 {
                self.closed = true;
                return Err(DriverError::Unavailable(
                    "bridge exited (empty response)".into(),
                ));
            }

            let line = std::mem::take(&mut self.inbox);
            let response: BridgeResponse = match serde_json::from_slice(line.trim_ascii()) {
                Ok(response) => response,
                Err(e) => {
                    warn!("skipping unparsable bridge output: {}", e);
                    continue;
                }
            };

            match response.id {
                Some(rid) if rid != id => {
                    debug!(expected = id, got = rid, "skipping response to abandoned request");
                    continue;
                }
                _ => return Ok(response),
            }
        }
    }

    async fn request(&mut self, request: BridgeRequest<'_>) -> Result<Option<Value>, DriverError> {
        let name = request.name();
        let response = self.send(request).await?;
        response.into_result(name)
    }

    pub async fn quit(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.send(BridgeRequest::Quit).await {
            debug!("bridge quit: {}", e);
        }
        self.closed = true;
        if let Err(e) = self.child.wait().await {
            warn!("bridge did not exit cleanly: {}", e);
        }
    }
}

#[async_trait]
impl Driver for BridgeDriver {
    async fn is_connected(&mut self) -> bool {
        !self.closed && matches!(self.child.try_wait(), Ok(None))
    }

    async fn fetch_tree(&mut self) -> Result<RawNode, DriverError> {
        let data = self
            .request(BridgeRequest::Tree)
            .await?
            .ok_or_else(|| DriverError::Protocol("no data in tree response".into()))?;
        serde_json::from_value(data)
            .map_err(|e| DriverError::Protocol(format!("malformed tree: {}", e)))
    }

    async fn screen_size(&mut self) -> Result<Bounds, DriverError> {
        let data = self
            .request(BridgeRequest::Screen)
            .await?
            .ok_or_else(|| DriverError::Protocol("no data in screen response".into()))?;
        serde_json::from_value(data)
            .map_err(|e| DriverError::Protocol(format!("malformed screen size: {}", e)))
    }

    async fn dispatch(&mut self, command: &DriverCommand) -> Result<(), DriverError> {
        self.request(BridgeRequest::Dispatch { command }).await?;
        Ok(())
    }

    async fn close(&mut self) {
        self.quit().await;
    }
}
