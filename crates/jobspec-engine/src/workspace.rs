//! Editing workspace
//!
//! A [`Workspace`] owns a job and its compiled document and keeps the two in
//! step: every mutation goes through the graph or config, then the document
//! is recompiled.

use crate::compiler::{compile_job, CompiledDocument};
use crate::error::Result;
use crate::graph::{EdgeContext, RenamePolicy};
use crate::import::import_job_spec;
use crate::job::{Job, JobConfig, JobType};
use crate::snapshot::WorkspaceSnapshot;
use crate::types::{Edge, EdgeId, MockConfig, NodeId, Position, TaskKind};
use crate::validation::{validate_job, ValidationError};

#[derive(Debug, Clone)]
pub struct Workspace {
    job: Job,
    document: CompiledDocument,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(JobType::default())
    }
}

impl Workspace {
    /// Empty workspace for a job type
    pub fn new(job_type: JobType) -> Self {
        Self::from_job(Job::new(job_type))
    }

    pub fn from_job(job: Job) -> Self {
        let document = compile_job(&job);
        Self { job, document }
    }

    /// Workspace for an imported TOML job spec, with the import warnings
    pub fn import(text: &str) -> Result<(Self, Vec<String>)> {
        let imported = import_job_spec(text)?;
        Ok((Self::from_job(imported.job), imported.warnings))
    }

    pub fn restore(snapshot: &WorkspaceSnapshot) -> Result<Self> {
        Ok(Self::from_job(snapshot.restore()?))
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot::capture(&self.job)
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Mutable access for the simulator.
    ///
    /// Node machine events do not change the text, so nothing is recompiled;
    /// call [`recompile`](Self::recompile) after structural edits made here.
    pub fn job_mut(&mut self) -> &mut Job {
        &mut self.job
    }

    pub fn into_job(self) -> Job {
        self.job
    }

    pub fn document(&self) -> &CompiledDocument {
        &self.document
    }

    /// The full job spec text
    pub fn text(&self) -> String {
        self.document.to_text()
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        validate_job(&self.job)
    }

    pub fn recompile(&mut self) {
        self.document = compile_job(&self.job);
        log::debug!("Recompiled job spec ({} lines)", self.document.lines.len());
    }

    /// Edit the job config in place
    pub fn update_config(&mut self, edit: impl FnOnce(&mut JobConfig)) {
        edit(&mut self.job.config);
        self.recompile();
    }

    pub fn add_node(&mut self, kind: TaskKind, position: Position, edge_context: Option<EdgeContext>) -> Result<NodeId> {
        let id = self.job.graph.add_node(kind, position, edge_context)?;
        self.recompile();
        Ok(id)
    }

    pub fn connect(&mut self, source: &str, target: &str) -> Result<EdgeId> {
        let id = self.job.graph.connect(source, target)?;
        self.recompile();
        Ok(id)
    }

    pub fn disconnect(&mut self, edge_id: &str) -> Result<Edge> {
        let edge = self.job.graph.disconnect(edge_id)?;
        self.recompile();
        Ok(edge)
    }

    pub fn rename_node(&mut self, id: &str, new_custom_id: &str) -> Result<()> {
        self.rename_node_with(id, new_custom_id, RenamePolicy::default())
    }

    pub fn rename_node_with(&mut self, id: &str, new_custom_id: &str, policy: RenamePolicy) -> Result<()> {
        self.job.graph.rename_node_with(id, new_custom_id, policy)?;
        self.recompile();
        Ok(())
    }

    pub fn delete_node(&mut self, id: &str) -> Result<Vec<NodeId>> {
        let notified = self.job.graph.delete_node(id)?;
        self.recompile();
        Ok(notified)
    }

    pub fn replace_node_type(&mut self, id: &str, kind: TaskKind) -> Result<()> {
        self.job.graph.replace_node_type(id, kind)?;
        self.recompile();
        Ok(())
    }

    pub fn set_task_fields<I, K, V>(&mut self, id: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.job.graph.set_task_fields(id, fields)?;
        self.recompile();
        Ok(())
    }

    /// Mock payloads are not part of the text; no recompile
    pub fn set_mock(&mut self, id: &str, mock: MockConfig) -> Result<()> {
        self.job.graph.set_mock(id, mock)
    }

    pub fn set_position(&mut self, id: &str, position: Position) -> Result<()> {
        self.job.graph.set_position(id, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_edits_recompile() {
        let mut ws = Workspace::new(JobType::Webhook);
        let fetch = ws.add_node(TaskKind::Http, Position::default(), None).unwrap();
        ws.set_task_fields(&fetch, [("url", "https://x/y")]).unwrap();
        let parse = ws
            .add_node(TaskKind::JsonParse, Position::new(0.0, 150.0), Some(EdgeContext::after(&fetch)))
            .unwrap();
        assert!(ws.text().contains("task_1 -> task_2"), "{}", ws.text());

        ws.rename_node(&fetch, "fetch").unwrap();
        assert!(ws.text().contains("fetch -> task_2"));
        assert!(ws.text().contains("url=\"https://x/y\""));

        ws.delete_node(&parse).unwrap();
        assert!(!ws.text().contains("->"));
    }

    #[test]
    fn test_failed_edit_keeps_document() {
        let mut ws = Workspace::new(JobType::Cron);
        let a = ws.add_node(TaskKind::Any, Position::default(), None).unwrap();
        let b = ws.add_node(TaskKind::Any, Position::default(), None).unwrap();
        let before = ws.document().clone();

        let err = ws.rename_node(&b, "task_1").unwrap_err();
        assert!(matches!(err, EngineError::DuplicateIdentifier(_)));
        assert_eq!(ws.document(), &before);
        assert_eq!(ws.job().graph.node(&a).unwrap().custom_id(), "task_1");
    }

    #[test]
    fn test_update_config() {
        let mut ws = Workspace::new(JobType::Cron);
        ws.update_config(|c| c.name = Some("ticker".into()));
        assert!(ws.text().contains("name = \"ticker\""));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut ws = Workspace::new(JobType::Cron);
        let a = ws.add_node(TaskKind::Http, Position::default(), None).unwrap();
        ws.set_task_fields(&a, [("url", "https://x/y")]).unwrap();

        let restored = Workspace::restore(&ws.snapshot()).unwrap();
        assert_eq!(restored.text(), ws.text());
    }
}
