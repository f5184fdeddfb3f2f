//! Collaborator endpoint configuration

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:6688";
pub const DEFAULT_GRAPH_PATH: &str = "/api/graph";
pub const DEFAULT_TASK_PATH: &str = "/api/task";

/// Where the graph-parse and task-evaluation services live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollaboratorConfig {
    pub base_url: String,
    pub graph_path: String,
    pub task_path: String,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            graph_path: DEFAULT_GRAPH_PATH.to_string(),
            task_path: DEFAULT_TASK_PATH.to_string(),
        }
    }
}

impl CollaboratorConfig {
    /// Config with the default paths under another base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn graph_url(&self) -> String {
        join_url(&self.base_url, &self.graph_path)
    }

    pub fn task_url(&self) -> String {
        join_url(&self.base_url, &self.task_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
