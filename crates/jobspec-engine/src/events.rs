//! Event types for streaming simulation progress
//!
//! Events are sent from the simulator to the frontend (or any consumer)
//! to report task progress, pending side effects and failures.

use serde::{Deserialize, Serialize};

/// Trait for sending pipeline events
///
/// This abstracts over the transport mechanism (channel, log, collector)
/// so the simulator can be driven from different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: PipelineEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

/// Events emitted while simulating a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// Simulation mode entered with a fresh plan
    #[serde(rename_all = "camelCase")]
    SimulationStarted {
        execution_id: String,
        task_count: usize,
    },

    /// A task was handed to the evaluator
    #[serde(rename_all = "camelCase")]
    TaskStarted {
        task_id: String,
        execution_id: String,
    },

    /// A side-effect task is waiting for execute or skip
    #[serde(rename_all = "camelCase")]
    SideEffectPending {
        task_id: String,
        execution_id: String,
    },

    /// A task settled with a value
    #[serde(rename_all = "camelCase")]
    TaskCompleted {
        task_id: String,
        execution_id: String,
        output: serde_json::Value,
    },

    /// A task settled with an error
    #[serde(rename_all = "camelCase")]
    TaskFailed {
        task_id: String,
        execution_id: String,
        error: String,
    },

    /// The plan could not be produced or walked
    #[serde(rename_all = "camelCase")]
    SimulationFailed {
        execution_id: String,
        error: String,
    },

    /// Simulation mode left; all tasks were reset
    #[serde(rename_all = "camelCase")]
    SimulationExited { execution_id: String },
}

impl PipelineEvent {
    /// Execution id carried by every event
    pub fn execution_id(&self) -> &str {
        match self {
            Self::SimulationStarted { execution_id, .. }
            | Self::TaskStarted { execution_id, .. }
            | Self::SideEffectPending { execution_id, .. }
            | Self::TaskCompleted { execution_id, .. }
            | Self::TaskFailed { execution_id, .. }
            | Self::SimulationFailed { execution_id, .. }
            | Self::SimulationExited { execution_id } => execution_id,
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: PipelineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// An event sink that writes each event to the log at debug level
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        match serde_json::to_string(&event) {
            Ok(json) => log::debug!("{}", json),
            Err(e) => log::warn!("Failed to serialize pipeline event: {}", e),
        }
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<PipelineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .map_err(|_| EventError {
                message: "Event collector poisoned".to_string(),
            })?
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = PipelineEvent::TaskCompleted {
            task_id: "parse".to_string(),
            execution_id: "sim-exec-1".to_string(),
            output: serde_json::json!(2),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "taskCompleted");
        assert_eq!(json["taskId"], "parse");
        assert_eq!(json["executionId"], "sim-exec-1");
    }

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();
        sink.send(PipelineEvent::SimulationExited {
            execution_id: "x".into(),
        })
        .unwrap();
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].execution_id(), "x");
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_poisoned_sink_reports_error() {
        let sink = std::sync::Arc::new(VecEventSink::new());
        let holder = sink.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.events.lock().unwrap();
            panic!("poison the collector");
        })
        .join();

        let err = sink
            .send(PipelineEvent::SimulationExited {
                execution_id: "x".into(),
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Event error: Event collector poisoned");
    }
}
