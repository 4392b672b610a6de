//! HTTP reasoning service client
//!
//! Talks to a reasoning service exposing a healthcheck route and a predict
//! route. Before each prediction the world-state snapshot is written to
//! `world_state_dir/<session>/<prediction>.json`; the request references it
//! by URI instead of inlining it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{ReasoningError, ReasoningRequest, ReasoningResponse, ReasoningService, Result};
use crate::config::ReasoningConfig;
use crate::session::ActionStatus;

/// Confidence attached to every utterance token
const TOKEN_CONFIDENCE_SCORE: f64 = 0.95;
const TOKEN_CONFIDENCE_BIN: &str = "HIGH";

/// Reasoning service reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpReasoningClient {
    healthcheck_url: String,
    predict_url: String,
    world_state_dir: PathBuf,
    client: Client,
}

impl HttpReasoningClient {
    pub fn new(config: &ReasoningConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ReasoningError::RequestFailed(format!("Failed to create HTTP client: {}", e)))?;

        let base = config.base_endpoint.trim_end_matches('/');
        Ok(Self {
            healthcheck_url: format!("{}{}", base, config.healthcheck_path),
            predict_url: format!("{}{}", base, config.predict_path),
            world_state_dir: config.world_state_dir.clone(),
            client,
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    /// Location a snapshot for this prediction is written to
    fn world_state_path(&self, session_id: &str, prediction_id: &str) -> PathBuf {
        self.world_state_dir
            .join(session_id)
            .join(format!("{}.json", prediction_id))
    }

    async fn save_world_state(&self, path: &Path, world_state: &Value) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(world_state)
            .map_err(|e| ReasoningError::ParseError(format!("Failed to encode world state: {}", e)))?;
        tokio::fs::write(path, bytes).await?;
        tracing::debug!("Wrote world state to {}", path.display());
        Ok(())
    }

    fn map_send_error(&self, e: reqwest::Error) -> ReasoningError {
        if e.is_timeout() {
            ReasoningError::Timeout
        } else if e.is_connect() {
            ReasoningError::Unavailable(format!(
                "Cannot connect to reasoning service at {}",
                self.predict_url
            ))
        } else {
            ReasoningError::NetworkError(e.to_string())
        }
    }
}

#[async_trait]
impl ReasoningService for HttpReasoningClient {
    fn name(&self) -> &str {
        "reasoning-http"
    }

    async fn next_actions(&self, request: &ReasoningRequest) -> Result<ReasoningResponse> {
        let prediction_id = uuid::Uuid::new_v4().to_string();
        let path = self.world_state_path(&request.session_id, &prediction_id);
        self.save_world_state(&path, &request.world_state).await?;

        let body = PredictRequest::build(request, &prediction_id);
        tracing::debug!(
            "Predict request: session={}, utterance={:?}, prior_statuses={}",
            request.session_id,
            request.utterance,
            request.prior_action_statuses.len()
        );

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.predict_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        tracing::debug!(
            "Reasoning response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ReasoningError::RequestFailed(format!(
                "Predict endpoint returned {}: {}",
                status, error_text
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::ParseError(format!("Failed to parse response: {}", e)))?;

        let actions = match payload.get("actions") {
            Some(Value::Array(actions)) => actions.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(ReasoningError::ParseError(format!(
                    "`actions` must be a list, got {}",
                    other
                )))
            }
        };

        Ok(ReasoningResponse::from_actions(actions))
    }

    async fn check_health(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.healthcheck_url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ReasoningError::Unavailable(format!(
                "Healthcheck returned {}",
                response.status()
            )))
        }
    }
}

/// Request body of the predict route
#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    header: RequestHeader<'a>,
    request: RequestBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestHeader<'a> {
    session_id: &'a str,
    prediction_request_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    sensors: Vec<Sensor>,
    previous_actions: &'a [ActionStatus],
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum Sensor {
    GameMetaData {
        #[serde(rename = "metaData")]
        meta_data: MetaData,
    },
    SpeechRecognition {
        recognition: Recognition,
    },
}

#[derive(Debug, Serialize)]
struct MetaData {
    uri: String,
}

#[derive(Debug, Serialize)]
struct Recognition {
    tokens: Vec<Token>,
}

#[derive(Debug, Serialize)]
struct Token {
    value: String,
    confidence: Confidence,
}

#[derive(Debug, Serialize)]
struct Confidence {
    score: f64,
    bin: &'static str,
}

impl<'a> PredictRequest<'a> {
    fn build(request: &'a ReasoningRequest, prediction_id: &'a str) -> Self {
        let mut sensors = vec![Sensor::GameMetaData {
            meta_data: MetaData {
                uri: format!("efs://{}/{}.json", request.session_id, prediction_id),
            },
        }];

        if let Some(utterance) = request.utterance.as_deref().map(str::trim) {
            if !utterance.is_empty() {
                sensors.push(Sensor::SpeechRecognition {
                    recognition: Recognition {
                        tokens: utterance
                            .split(' ')
                            .map(|token| Token {
                                value: token.to_string(),
                                confidence: Confidence {
                                    score: TOKEN_CONFIDENCE_SCORE,
                                    bin: TOKEN_CONFIDENCE_BIN,
                                },
                            })
                            .collect(),
                    },
                });
            }
        }

        Self {
            header: RequestHeader {
                session_id: &request.session_id,
                prediction_request_id: prediction_id,
            },
            request: RequestBody {
                sensors,
                previous_actions: &request.prior_action_statuses,
            },
        }
    }
}
