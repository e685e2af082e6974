//! JSON-lines host that drives the worker from stdin and reports on stdout.
//!
//! Each input line is one event. Install and activate are handled in order;
//! fetches run concurrently and answer with the `id` they were sent with.
//! Messages posted to connected clients are forwarded as `message` lines.
//! At end of input the host waits for outstanding fetches and background
//! work, then closes every client and exits.

use crate::clients::ClientType;
use crate::error::HostError;
use crate::service::{EventOutcome, LifecycleEvent, ServiceWorker};
use cachefirst_core::exchange::{headers_from_pairs, headers_to_pairs};
use cachefirst_core::{ClientMessage, Error, Method, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// One input line.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum HostInput {
    Install,
    Activate,
    Fetch {
        id: Value,
        request: WireRequest,
    },
    Connect {
        client: String,
        #[serde(rename = "type", default = "default_client_type")]
        kind: ClientType,
    },
    Disconnect {
        client: String,
    },
}

fn default_client_type() -> ClientType {
    ClientType::Window
}

fn default_method() -> String {
    "GET".to_string()
}

/// A request as written on the wire. Relative URLs resolve against the
/// configured origin.
#[derive(Debug, Deserialize)]
pub struct WireRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl WireRequest {
    fn into_request(self, worker: &ServiceWorker) -> Result<Request, HostError> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| HostError::InvalidInput(format!("method {:?}: {e}", self.method)))?;
        let url = worker.resolve_url(&self.url)?;
        let headers = headers_from_pairs(self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str())))?;
        Ok(Request { method, url, headers })
    }
}

/// One output line.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HostOutput {
    Installed,
    Activated,
    Response {
        id: Value,
        status: u16,
        headers: Vec<(String, String)>,
        /// UTF-8 bodies are sent as text.
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        /// Other bodies are sent hex encoded.
        #[serde(skip_serializing_if = "Option::is_none")]
        body_hex: Option<String>,
    },
    Message {
        client: String,
        message: ClientMessage,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        code: String,
        error: String,
    },
}

impl HostOutput {
    fn response(id: Value, response: &Response) -> Self {
        let (body, body_hex) = match std::str::from_utf8(&response.body) {
            Ok(text) => (Some(text.to_string()), None),
            Err(_) => (None, Some(hex::encode(&response.body))),
        };
        HostOutput::Response {
            id,
            status: response.status.as_u16(),
            headers: headers_to_pairs(&response.headers),
            body,
            body_hex,
        }
    }

    fn failure(id: Option<Value>, err: &HostError) -> Self {
        HostOutput::Error { id, code: err.code().to_string(), error: err.to_string() }
    }
}

fn reply(id: Option<Value>, outcome: Result<EventOutcome, Error>) -> HostOutput {
    match outcome {
        Ok(EventOutcome::Installed) => HostOutput::Installed,
        Ok(EventOutcome::Activated) => HostOutput::Activated,
        Ok(EventOutcome::Response(response)) => HostOutput::response(id.unwrap_or(Value::Null), &response),
        Err(err) => HostOutput::failure(id, &err.into()),
    }
}

/// Queue `line` for output. Returns false once the writer has gone away.
fn emit(out: &mpsc::UnboundedSender<HostOutput>, line: HostOutput) -> bool {
    match out.send(line) {
        Ok(()) => true,
        Err(mpsc::error::SendError(line)) => {
            tracing::debug!("output closed, dropping {:?}", line);
            false
        }
    }
}

async fn write_lines<W>(mut output: W, mut lines: mpsc::UnboundedReceiver<HostOutput>) -> Result<(), HostError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        let mut encoded = serde_json::to_string(&line).map_err(|e| HostError::InvalidInput(e.to_string()))?;
        encoded.push('\n');
        output.write_all(encoded.as_bytes()).await?;
        output.flush().await?;
    }
    output.shutdown().await?;
    Ok(())
}

async fn forward(
    client: String, mut messages: mpsc::UnboundedReceiver<ClientMessage>, out: mpsc::UnboundedSender<HostOutput>,
) {
    while let Some(message) = messages.recv().await {
        if out.send(HostOutput::Message { client: client.clone(), message }).is_err() {
            break;
        }
    }
    tracing::debug!("client {} closed", client);
}

/// Serve events from `input` until it ends.
pub async fn run<R, W>(worker: ServiceWorker, input: R, output: W) -> Result<(), HostError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_lines(output, rx));
    let mut fetches = JoinSet::new();
    let mut forwarders = JoinSet::new();

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<HostInput>(&line) {
            Ok(event) => event,
            Err(err) => {
                let err = HostError::from(err);
                tracing::warn!("ignoring malformed line: {}", err);
                if !emit(&out, HostOutput::failure(None, &err)) {
                    break;
                }
                continue;
            }
        };

        let delivered = match event {
            HostInput::Install => emit(&out, reply(None, worker.handle(LifecycleEvent::Install).await)),
            HostInput::Activate => emit(&out, reply(None, worker.handle(LifecycleEvent::Activate).await)),
            HostInput::Fetch { id, request } => match request.into_request(&worker) {
                Ok(request) => {
                    let worker = worker.clone();
                    let out = out.clone();
                    fetches.spawn(async move {
                        let outcome = worker.handle(LifecycleEvent::Fetch(request)).await;
                        emit(&out, reply(Some(id), outcome));
                    });
                    true
                }
                Err(err) => emit(&out, HostOutput::failure(Some(id), &err)),
            },
            HostInput::Connect { client, kind } => {
                let messages = worker.connect_client(&client, kind).await;
                forwarders.spawn(forward(client, messages, out.clone()));
                true
            }
            HostInput::Disconnect { client } => {
                if !worker.clients().disconnect(&client).await {
                    tracing::debug!("disconnect for unknown client {}", client);
                }
                true
            }
        };

        if !delivered {
            tracing::warn!("output closed, stopping input");
            break;
        }
    }

    while fetches.join_next().await.is_some() {}
    worker.settle().await;
    worker.clients().clear().await;
    while forwarders.join_next().await.is_some() {}

    drop(out);
    match writer.await {
        Ok(result) => result,
        Err(err) => Err(HostError::Io(std::io::Error::other(err))),
    }
}
