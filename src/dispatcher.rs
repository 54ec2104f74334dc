//! Task operation dispatch: parses a loosely-typed operation payload, applies
//! it to a board in one transaction, and fans out notifications after commit.

use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::notify::{fire_and_forget, Notification, Notifier};
use crate::storage::models::{TaskOp, TaskOpOutcome, TextLimits};
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unrecognized operation: {0}")]
    Unrecognized(String),
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// A parsed operation request.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub op: TaskOp,
    /// When present, the write is rejected unless the board is at this version
    pub expected_version: Option<u64>,
}

impl TaskRequest {
    pub fn new(op: TaskOp) -> Self {
        Self {
            op,
            expected_version: None,
        }
    }

    /// Parse `{"op": "...", ...}`. Unknown ops and payloads of the wrong shape
    /// are rejected rather than ignored.
    pub fn from_json(value: serde_json::Value) -> Result<Self, DispatchError> {
        let object = value
            .as_object()
            .ok_or_else(|| DispatchError::Unrecognized("payload must be a JSON object".into()))?;

        let op_name = object
            .get("op")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DispatchError::Unrecognized("missing 'op'".into()))?
            .to_string();

        let expected_version = match object.get("expected_version") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                DispatchError::Unrecognized("'expected_version' must be a non-negative integer".into())
            })?),
        };

        let op: TaskOp = serde_json::from_value(value).map_err(|e| {
            DispatchError::Unrecognized(format!("'{op_name}' ({e})"))
        })?;

        Ok(Self {
            op,
            expected_version,
        })
    }
}

/// Applies task operations against the board store.
pub struct TaskDispatcher {
    db: Database,
    limits: TextLimits,
    notifier: Arc<dyn Notifier>,
    engine_webhook_url: Option<String>,
    workflow_enabled: bool,
}

impl TaskDispatcher {
    pub fn new(db: Database, config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            limits: TextLimits {
                max_text_length: config.limits.max_text_length,
                max_title_length: config.limits.max_title_length,
            },
            notifier,
            engine_webhook_url: config.notify.engine_webhook_url.clone(),
            workflow_enabled: config.github.token.is_some(),
        }
    }

    /// Apply `request` to the board `slug`. Notifications for a publish go out
    /// only once the transaction has committed.
    pub fn dispatch(
        &self,
        slug: &str,
        request: &TaskRequest,
    ) -> Result<TaskOpOutcome, DispatchError> {
        let outcome = self
            .db
            .apply_task_op(slug, &request.op, request.expected_version, self.limits)
            .inspect_err(|e| {
                tracing::warn!(board = %slug, op = request.op.name(), error = %e, "Task operation failed");
            })?;

        tracing::debug!(
            board = %slug,
            op = request.op.name(),
            version = outcome.version,
            "Applied task operation"
        );

        if let Some(ref task_id) = outcome.published_task_id {
            tracing::info!(board = %slug, task_id = %task_id, "Task published");
            if self.workflow_enabled {
                fire_and_forget(&self.notifier, Notification::WorkflowDispatch);
            }
            if let Some(ref url) = self.engine_webhook_url {
                fire_and_forget(
                    &self.notifier,
                    Notification::Webhook {
                        url: url.clone(),
                        payload: serde_json::json!({ "board": slug, "task_id": task_id }),
                    },
                );
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_config, RecordingNotifier};

    fn dispatcher(config: &Config) -> (tempfile::TempDir, Database, Arc<RecordingNotifier>, TaskDispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("data")).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = TaskDispatcher::new(db.clone(), config, notifier.clone());
        (dir, db, notifier, dispatcher)
    }

    fn parse(value: serde_json::Value) -> TaskRequest {
        TaskRequest::from_json(value).unwrap()
    }

    #[test]
    fn test_parse_known_ops() {
        assert_eq!(
            parse(serde_json::json!({ "op": "add", "text": "x" })).op,
            TaskOp::Add { text: "x".into() }
        );
        assert_eq!(
            parse(serde_json::json!({ "op": "clear_done" })).op,
            TaskOp::ClearDone
        );
        assert_eq!(
            parse(serde_json::json!({ "op": "title" })).op,
            TaskOp::Title {
                title: "My Board".into()
            }
        );
        assert_eq!(
            parse(serde_json::json!({ "op": "set_all" })).op,
            TaskOp::SetAll { done: false }
        );

        let req = parse(serde_json::json!({ "op": "reorder", "order": ["a", "b"], "expected_version": 3 }));
        assert_eq!(req.expected_version, Some(3));
        assert_eq!(
            req.op,
            TaskOp::Reorder {
                order: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        for payload in [
            serde_json::json!({ "op": "explode" }),
            serde_json::json!({ "text": "no op" }),
            serde_json::json!({ "op": "reorder", "order": "not-a-list" }),
            serde_json::json!({ "op": "add", "expected_version": -1 }),
            serde_json::json!(["add"]),
        ] {
            assert!(matches!(
                TaskRequest::from_json(payload),
                Err(DispatchError::Unrecognized(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_publish_notifies_after_commit() {
        let mut config = test_config(std::path::Path::new("/tmp"));
        config.github.token = Some("token".into());
        config.notify.engine_webhook_url = Some("http://engine.invalid/hook".into());
        let (_dir, db, notifier, dispatcher) = dispatcher(&config);

        let added = dispatcher
            .dispatch("news", &TaskRequest::new(TaskOp::Add { text: "post".into() }))
            .unwrap();
        let id = added.added_task_id.unwrap();

        let outcome = dispatcher
            .dispatch("news", &TaskRequest::new(TaskOp::Publish { id: id.clone() }))
            .unwrap();
        assert_eq!(outcome.published_task_id.as_deref(), Some(id.as_str()));

        let seen = notifier.wait_for(2).await;
        assert!(seen.contains(&Notification::WorkflowDispatch));
        assert!(seen.contains(&Notification::Webhook {
            url: "http://engine.invalid/hook".into(),
            payload: serde_json::json!({ "board": "news", "task_id": id }),
        }));

        let snapshot = db.board_snapshot("news").unwrap();
        assert!(snapshot.tasks[0].is_published);
    }

    #[tokio::test]
    async fn test_publish_unknown_task_sends_nothing() {
        let mut config = test_config(std::path::Path::new("/tmp"));
        config.github.token = Some("token".into());
        let (_dir, _db, notifier, dispatcher) = dispatcher(&config);

        let outcome = dispatcher
            .dispatch("news", &TaskRequest::new(TaskOp::Publish { id: "missing".into() }))
            .unwrap();
        assert!(outcome.published_task_id.is_none());

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(notifier.recorded().is_empty());
    }

    #[test]
    fn test_stale_version_is_rejected() {
        let config = test_config(std::path::Path::new("/tmp"));
        let (_dir, db, _notifier, dispatcher) = dispatcher(&config);

        let first = dispatcher
            .dispatch("b", &TaskRequest::new(TaskOp::Add { text: "one".into() }))
            .unwrap();
        assert_eq!(first.version, 1);

        let stale = TaskRequest {
            op: TaskOp::Add { text: "two".into() },
            expected_version: Some(0),
        };
        let err = dispatcher.dispatch("b", &stale).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Storage(DatabaseError::VersionMismatch {
                expected: 0,
                actual: 1
            })
        ));
        assert_eq!(db.board_snapshot("b").unwrap().tasks.len(), 1);

        let fresh = TaskRequest {
            op: TaskOp::Add { text: "two".into() },
            expected_version: Some(1),
        };
        assert_eq!(dispatcher.dispatch("b", &fresh).unwrap().version, 2);
    }
}
