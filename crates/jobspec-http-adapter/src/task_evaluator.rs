//! Remote task evaluation

use async_trait::async_trait;
use jobspec_engine::{EvaluationRequest, EvaluationResponse, TaskEvaluator};

use crate::config::CollaboratorConfig;
use crate::error::{AdapterError, Result};

/// [`TaskEvaluator`] backed by the `POST {base}/api/task` service
pub struct HttpTaskEvaluator {
    http_client: reqwest::Client,
    config: CollaboratorConfig,
}

impl HttpTaskEvaluator {
    pub fn new(config: CollaboratorConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http_client: reqwest::Client, config: CollaboratorConfig) -> Self {
        Self { http_client, config }
    }

    async fn request(&self, request: &EvaluationRequest) -> Result<EvaluationResponse> {
        let url = self.config.task_url();
        log::debug!("Evaluating task '{}' ({}) at {}", request.id, request.task_kind, url);

        let response = self.http_client.post(&url).json(request).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status { status, body });
        }
        Ok(response.json::<EvaluationResponse>().await?)
    }
}

#[async_trait]
impl TaskEvaluator for HttpTaskEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest) -> jobspec_engine::Result<EvaluationResponse> {
        Ok(self.request(request).await?)
    }
}
