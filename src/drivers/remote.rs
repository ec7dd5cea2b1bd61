// file: src/drivers/remote.rs
// description: driver dispatching documents to an http analysis service
// reference: https://docs.rs/reqwest

use crate::config::RemoteConfig;
use crate::drivers::StageDriver;
use crate::error::{PipelineError, Result};
use crate::models::{Annotation, Document, Stage};
use crate::utils::{HealthCheck, Validator};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const HEALTH_PATH: &str = "/v1/health";
const PROCESS_PATH: &str = "/v1/process";
const MAX_BACKOFF_EXPONENT: u32 = 6;
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct ProcessRequest<'a> {
    document: RequestDocument<'a>,
    parameters: &'a BTreeMap<String, String>,
    gpu: bool,
}

#[derive(Debug, Serialize)]
struct RequestDocument<'a> {
    id: &'a str,
    text: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    annotations: Vec<RemoteAnnotation>,
}

#[derive(Debug, Deserialize)]
struct RemoteAnnotation {
    kind: String,
    begin: Option<usize>,
    end: Option<usize>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Outcome of a single call, deciding whether the retry loop continues.
enum CallError {
    TimedOut,
    Transient(String),
    Permanent(String),
}

pub struct RemoteDriver {
    stage: Stage,
    client: Client,
    call_timeout: Duration,
    startup_timeout: Duration,
    poll_interval: Duration,
    retry_backoff_ms: u64,
}

impl RemoteDriver {
    pub fn new(stage: Stage, remote: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let call_timeout = stage
            .timeout
            .unwrap_or(Duration::from_secs(remote.default_timeout_secs));

        Ok(Self {
            stage,
            client,
            call_timeout,
            startup_timeout: Duration::from_secs(remote.startup_timeout_secs),
            poll_interval: Duration::from_millis(remote.health_poll_interval_ms.max(1)),
            retry_backoff_ms: remote.retry_backoff_ms,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.stage.target, path)
    }

    async fn ping(&self) -> std::result::Result<(), String> {
        let response = self
            .client
            .get(self.url(HEALTH_PATH))
            .timeout(self.poll_interval.max(Duration::from_secs(5)))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("health endpoint returned {}", response.status()))
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(MAX_BACKOFF_EXPONENT);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }

    async fn call(&self, document: &Document) -> std::result::Result<Vec<Annotation>, CallError> {
        let request = ProcessRequest {
            document: RequestDocument {
                id: document.id(),
                text: document.text(),
                language: document.language(),
            },
            parameters: &self.stage.parameters,
            gpu: self.stage.gpu,
        };

        let response = self
            .client
            .post(self.url(PROCESS_PATH))
            .timeout(self.call_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::TimedOut
                } else if e.is_connect() || e.is_request() {
                    CallError::Transient(e.to_string())
                } else {
                    CallError::Permanent(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!(
                "service returned {}: {}",
                status,
                Validator::truncate_text(body.trim(), MAX_ERROR_BODY_CHARS)
            );
            return if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Err(CallError::Transient(message))
            } else {
                Err(CallError::Permanent(message))
            };
        }

        // The call timeout also covers reading the body.
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                CallError::TimedOut
            } else {
                CallError::Transient(format!("failed to read response body: {}", e))
            }
        })?;

        let parsed: ProcessResponse = serde_json::from_slice(&body)
            .map_err(|e| CallError::Permanent(format!("undecodable response: {}", e)))?;

        self.to_annotations(document, parsed)
            .map_err(CallError::Permanent)
    }

    fn to_annotations(
        &self,
        document: &Document,
        response: ProcessResponse,
    ) -> std::result::Result<Vec<Annotation>, String> {
        let length = document.metadata().end;

        response
            .annotations
            .into_iter()
            .map(|remote| {
                let mut annotation = Annotation::new(&self.stage.name, &remote.kind, remote.data);
                match (remote.begin, remote.end) {
                    (Some(begin), Some(end)) if begin <= end && end <= length => {
                        annotation = annotation.spanning(begin, end);
                    }
                    (None, None) => {}
                    (begin, end) => {
                        return Err(format!(
                            "annotation {} has invalid span {:?}..{:?} for text of length {}",
                            remote.kind, begin, end, length
                        ));
                    }
                }
                Ok(annotation)
            })
            .collect()
    }
}

#[async_trait]
impl StageDriver for RemoteDriver {
    fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Waits for the service to answer its health endpoint.
    async fn start(&self) -> Result<()> {
        let deadline = Instant::now() + self.startup_timeout;
        info!("Waiting for stage {} at {}", self.stage.name, self.stage.target);

        loop {
            match self.ping().await {
                Ok(()) => {
                    info!("Stage {} is ready", self.stage.name);
                    return Ok(());
                }
                Err(e) if Instant::now() < deadline => {
                    debug!("Stage {} not ready yet: {}", self.stage.name, e);
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    return Err(PipelineError::driver(
                        &self.stage.name,
                        format!(
                            "service at {} not ready after {}s: {}",
                            self.stage.target,
                            self.startup_timeout.as_secs(),
                            e
                        ),
                    ));
                }
            }
        }
    }

    async fn health_check(&self) -> HealthCheck {
        let started = Instant::now();
        match self.ping().await {
            Ok(()) => HealthCheck::healthy(&self.stage.name, started.elapsed()),
            Err(e) => HealthCheck::unhealthy(&self.stage.name, e, started.elapsed()),
        }
    }

    async fn process(&self, document: &Document) -> Result<Vec<Annotation>> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.call(document).await {
                Ok(annotations) => {
                    debug!(
                        "Stage {} returned {} annotations for {}",
                        self.stage.name,
                        annotations.len(),
                        document.id()
                    );
                    return Ok(annotations);
                }
                Err(CallError::TimedOut) if attempt <= self.stage.retries => {
                    let delay = self.backoff(attempt - 1);
                    warn!(
                        stage = %self.stage.name,
                        doc_id = %document.id(),
                        attempt,
                        "Remote call timed out after {}ms, retrying in {}ms",
                        self.call_timeout.as_millis(),
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(CallError::TimedOut) => {
                    return Err(PipelineError::Timeout {
                        stage: self.stage.name.clone(),
                        timeout_ms: self.call_timeout.as_millis() as u64,
                        attempts: attempt,
                    });
                }
                Err(CallError::Transient(message)) if attempt <= self.stage.retries => {
                    let delay = self.backoff(attempt - 1);
                    warn!(
                        stage = %self.stage.name,
                        doc_id = %document.id(),
                        attempt,
                        error = %message,
                        "Remote call failed, retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(CallError::Transient(message)) | Err(CallError::Permanent(message)) => {
                    return Err(PipelineError::Driver {
                        stage: self.stage.name.clone(),
                        message,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        debug!("Released remote stage {}", self.stage.name);
        Ok(())
    }
}
