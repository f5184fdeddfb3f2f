//! Remote graph parsing
//!
//! Posts the observation source to the parse service and reads back the
//! ordered task list. An `error` payload from the service is a parse error;
//! transport failures are collaborator errors.

use async_trait::async_trait;
use jobspec_engine::{EngineError, ExecutionPlan, GraphParser, TaskInstruction};
use serde::{Deserialize, Serialize};

use crate::config::CollaboratorConfig;
use crate::error::{AdapterError, Result};

#[derive(Debug, Serialize)]
struct GraphRequest<'a> {
    spec: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GraphResponse {
    Tasks { tasks: Vec<TaskInstruction> },
    Error { error: String },
}

/// [`GraphParser`] backed by the `POST {base}/api/graph` service
pub struct HttpGraphParser {
    http_client: reqwest::Client,
    config: CollaboratorConfig,
}

impl HttpGraphParser {
    pub fn new(config: CollaboratorConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http_client: reqwest::Client, config: CollaboratorConfig) -> Self {
        Self { http_client, config }
    }

    async fn request(&self, source: &str) -> Result<GraphResponse> {
        let url = self.config.graph_url();
        log::debug!("Requesting execution plan from {}", url);

        let response = self
            .http_client
            .post(&url)
            .json(&GraphRequest { spec: source })
            .send()
            .await?;

        // The service reports parse failures as `{"error": ...}`, whatever the status
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<GraphResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(AdapterError::Status {
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(AdapterError::UnexpectedResponse(e.to_string())),
        }
    }
}

#[async_trait]
impl GraphParser for HttpGraphParser {
    async fn parse(&self, observation_source: &str) -> jobspec_engine::Result<ExecutionPlan> {
        match self.request(observation_source).await? {
            GraphResponse::Tasks { tasks } => Ok(ExecutionPlan { tasks }),
            GraphResponse::Error { error } => Err(EngineError::parse(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobspec_engine::PlanInput;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_plan_from_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/graph"))
            .and(body_json(json!({"spec": "a -> b"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tasks": [
                    {"id": "a", "inputs": []},
                    {"id": "b", "inputs": [{"id": "a", "propagateResult": true}]}
                ]
            })))
            .mount(&server)
            .await;

        let parser = HttpGraphParser::new(CollaboratorConfig::with_base_url(server.uri()));
        let plan = parser.parse("a -> b").await.unwrap();
        assert_eq!(plan.order(), vec!["a", "b"]);
        assert_eq!(
            plan.tasks[1].inputs,
            vec![PlanInput {
                id: "a".into(),
                propagate_result: true
            }]
        );
    }

    #[tokio::test]
    async fn test_error_payload_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/graph"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"error": "bad token at 1:3"})))
            .mount(&server)
            .await;

        let parser = HttpGraphParser::new(CollaboratorConfig::with_base_url(server.uri()));
        let err = parser.parse("a [").await.unwrap_err();
        assert!(matches!(err, EngineError::Parse(ref e) if e.message == "bad token at 1:3"));
    }

    #[tokio::test]
    async fn test_server_failure_is_collaborator_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let parser = HttpGraphParser::new(CollaboratorConfig::with_base_url(server.uri()));
        let err = parser.parse("a").await.unwrap_err();
        assert!(matches!(err, EngineError::Collaborator(ref m) if m.contains("500")));
    }
}
