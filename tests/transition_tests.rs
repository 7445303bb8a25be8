//! Integration tests for the transition engine.
//!
//! Every test runs against both stores: an in-memory SQLite database and
//! the `MemoryStore`.

use std::sync::Arc;
use taskflow::cancel::CancelToken;
use taskflow::config::WorkflowConfig;
use taskflow::db::Database;
use taskflow::error::EngineError;
use taskflow::store::{MemoryStore, WorkStore};
use taskflow::types::{ItemKind, NewWorkItem, TransitionKind};
use taskflow::workflow::{
    HistoryQuery, TransitionEngine, TransitionRequest, ValidationMode, WorkflowHandle,
};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn stores() -> Vec<(&'static str, Arc<dyn WorkStore>)> {
    vec![
        ("sqlite", Arc::new(setup_db()) as Arc<dyn WorkStore>),
        ("memory", Arc::new(MemoryStore::new()) as Arc<dyn WorkStore>),
    ]
}

/// todo -> in_progress -> {done, blocked}, blocked -> in_progress.
fn rework_workflow() -> WorkflowConfig {
    WorkflowConfig::from_yaml_str(
        r#"
version: "1.0"
status_flow:
  todo: [in_progress]
  in_progress: [done, blocked]
  blocked: [in_progress]
  done: []
special_statuses:
  _start_: [todo]
  _complete_: [done]
"#,
    )
    .expect("Failed to parse workflow")
}

fn engine_with(store: Arc<dyn WorkStore>, workflow: WorkflowConfig) -> TransitionEngine {
    let (handle, _) =
        WorkflowHandle::from_config(workflow, ValidationMode::Normal).expect("Invalid workflow");
    TransitionEngine::new(store, handle)
}

fn default_engine(store: Arc<dyn WorkStore>) -> TransitionEngine {
    engine_with(store, WorkflowConfig::default())
}

fn create_task(engine: &TransitionEngine, key: &str, status: &str) {
    engine
        .create_item(NewWorkItem::new(key, ItemKind::Task, status), &CancelToken::new())
        .expect("Failed to create task");
}

fn current_status(store: &Arc<dyn WorkStore>, key: &str) -> String {
    store
        .get_item(key)
        .expect("Failed to read item")
        .expect("Item missing")
        .status
}

mod rework_flow_tests {
    use super::*;

    #[test]
    fn undeclared_backward_move_needs_force() {
        for (name, store) in stores() {
            let engine = engine_with(Arc::clone(&store), rework_workflow());
            let cancel = CancelToken::new();
            create_task(&engine, "T-1", "in_progress");

            let err = engine
                .transition(&TransitionRequest::new("T-1", "todo"), &cancel)
                .unwrap_err();
            match err {
                EngineError::InvalidTransition { allowed, .. } => {
                    assert_eq!(allowed, vec!["done", "blocked"], "{}", name);
                }
                other => panic!("{}: unexpected error {:?}", name, other),
            }
            assert_eq!(current_status(&store, "T-1"), "in_progress", "{}", name);
        }
    }

    #[test]
    fn forced_backward_move_without_reason_is_refused() {
        for (name, store) in stores() {
            let engine = engine_with(Arc::clone(&store), rework_workflow());
            create_task(&engine, "T-1", "in_progress");

            let err = engine
                .transition(
                    &TransitionRequest::new("T-1", "todo").force(true),
                    &CancelToken::new(),
                )
                .unwrap_err();
            assert!(
                matches!(err, EngineError::MissingRejectionReason { .. }),
                "{}: {:?}",
                name,
                err
            );
            assert!(store.history("T-1").unwrap().is_empty(), "{}", name);
        }
    }

    #[test]
    fn forced_backward_move_is_recorded_as_rejection() {
        for (name, store) in stores() {
            let engine = engine_with(Arc::clone(&store), rework_workflow());
            create_task(&engine, "T-1", "in_progress");

            let outcome = engine
                .transition(
                    &TransitionRequest::new("T-1", "todo")
                        .force(true)
                        .reason("needs rework"),
                    &CancelToken::new(),
                )
                .expect("Forced rejection failed");

            assert_eq!(outcome.item.status, "todo", "{}", name);
            assert_eq!(outcome.entry.kind, TransitionKind::Rejection, "{}", name);
            assert!(outcome.entry.forced, "{}", name);
            assert_eq!(
                outcome.entry.rejection_reason.as_deref(),
                Some("needs rework"),
                "{}",
                name
            );

            let history = store.history("T-1").unwrap();
            assert_eq!(history.len(), 1, "{}", name);
            assert_eq!(history[0], outcome.entry, "{}", name);
        }
    }

    #[test]
    fn leaving_blocked_along_a_declared_edge_is_forward() {
        for (name, store) in stores() {
            let engine = engine_with(Arc::clone(&store), rework_workflow());
            create_task(&engine, "T-1", "blocked");

            let outcome = engine
                .transition(
                    &TransitionRequest::new("T-1", "in_progress"),
                    &CancelToken::new(),
                )
                .expect("Transition failed");
            assert_eq!(outcome.entry.kind, TransitionKind::Forward, "{}", name);
        }
    }
}

mod phase_classification_tests {
    use super::*;

    #[test]
    fn review_back_to_development_is_a_rejection() {
        for (name, store) in stores() {
            let engine = default_engine(Arc::clone(&store));
            create_task(&engine, "T-1", "ready_for_review");

            let err = engine
                .transition(
                    &TransitionRequest::new("T-1", "in_progress"),
                    &CancelToken::new(),
                )
                .unwrap_err();
            assert!(
                matches!(err, EngineError::MissingRejectionReason { .. }),
                "{}",
                name
            );

            let outcome = engine
                .transition(
                    &TransitionRequest::new("T-1", "in_progress")
                        .agent("reviewer")
                        .reason("tests missing"),
                    &CancelToken::new(),
                )
                .expect("Rejection failed");
            assert_eq!(outcome.entry.kind, TransitionKind::Rejection, "{}", name);
            assert!(!outcome.entry.forced, "{}", name);
            assert_eq!(outcome.entry.agent.as_deref(), Some("reviewer"), "{}", name);
        }
    }

    #[test]
    fn moves_into_unranked_phase_are_forward() {
        for (name, store) in stores() {
            let engine = default_engine(Arc::clone(&store));
            create_task(&engine, "T-1", "in_progress");

            let outcome = engine
                .transition(
                    &TransitionRequest::new("T-1", "blocked").reason("ignored"),
                    &CancelToken::new(),
                )
                .expect("Transition failed");
            assert_eq!(outcome.entry.kind, TransitionKind::Forward, "{}", name);
            assert_eq!(outcome.entry.rejection_reason, None, "{}", name);
        }
    }

    #[test]
    fn reason_requirement_can_be_switched_off() {
        for (name, store) in stores() {
            let mut workflow = WorkflowConfig::default();
            workflow.settings.require_rejection_reason = false;
            let engine = engine_with(Arc::clone(&store), workflow);
            create_task(&engine, "T-1", "ready_for_review");

            let outcome = engine
                .transition(
                    &TransitionRequest::new("T-1", "in_progress"),
                    &CancelToken::new(),
                )
                .expect("Transition failed");
            assert_eq!(outcome.entry.kind, TransitionKind::Rejection, "{}", name);
            assert_eq!(outcome.entry.rejection_reason, None, "{}", name);
        }
    }

    #[test]
    fn explicit_reject_transitions_override_phases() {
        for (name, store) in stores() {
            let mut workflow = WorkflowConfig::default();
            workflow
                .settings
                .reject_transitions
                .insert("in_progress".to_string(), vec!["blocked".to_string()]);
            let engine = engine_with(Arc::clone(&store), workflow);
            create_task(&engine, "T-1", "in_progress");

            let outcome = engine
                .transition(
                    &TransitionRequest::new("T-1", "blocked").reason("spec unclear"),
                    &CancelToken::new(),
                )
                .expect("Transition failed");
            assert_eq!(outcome.entry.kind, TransitionKind::Rejection, "{}", name);
        }
    }
}

mod reason_doc_tests {
    use super::*;

    #[test]
    fn traversal_path_fails_before_any_write() {
        for (name, store) in stores() {
            let engine = default_engine(Arc::clone(&store));
            create_task(&engine, "T-1", "ready_for_review");

            let err = engine
                .transition(
                    &TransitionRequest::new("T-1", "in_progress")
                        .reason("see review")
                        .reason_doc("../../etc/passwd"),
                    &CancelToken::new(),
                )
                .unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidDocumentPath { .. }),
                "{}: {:?}",
                name,
                err
            );
            assert_eq!(current_status(&store, "T-1"), "ready_for_review", "{}", name);
            assert!(store.history("T-1").unwrap().is_empty(), "{}", name);
        }
    }

    #[test]
    fn relative_path_is_stored_verbatim() {
        for (name, store) in stores() {
            let engine = default_engine(Arc::clone(&store));
            create_task(&engine, "T-1", "ready_for_review");

            engine
                .transition(
                    &TransitionRequest::new("T-1", "in_progress")
                        .reason("see review")
                        .reason_doc("docs/review.md"),
                    &CancelToken::new(),
                )
                .expect("Rejection failed");

            let history = store.history("T-1").unwrap();
            assert_eq!(history.len(), 1, "{}", name);
            assert_eq!(
                history[0].reason_doc.as_deref(),
                Some("docs/review.md"),
                "{}",
                name
            );
        }
    }
}

mod atomicity_tests {
    use super::*;

    #[test]
    fn failed_history_append_leaves_memory_store_untouched() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn WorkStore> = memory.clone();
        let engine = default_engine(Arc::clone(&store));
        create_task(&engine, "T-1", "todo");

        memory.fail_history_appends(true);
        let err = engine
            .transition(
                &TransitionRequest::new("T-1", "in_progress"),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)), "{:?}", err);
        assert_eq!(current_status(&store, "T-1"), "todo");
        assert!(store.history("T-1").unwrap().is_empty());

        memory.fail_history_appends(false);
        engine
            .transition(
                &TransitionRequest::new("T-1", "in_progress"),
                &CancelToken::new(),
            )
            .expect("Transition failed after recovery");
        assert_eq!(current_status(&store, "T-1"), "in_progress");
    }

    #[test]
    fn failed_history_insert_rolls_back_sqlite_update() {
        let db = setup_db();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_history BEFORE INSERT ON transition_history
                 BEGIN SELECT RAISE(ABORT, 'history unavailable'); END;",
            )?;
            Ok(())
        })
        .expect("Failed to install trigger");

        let store: Arc<dyn WorkStore> = Arc::new(db);
        let engine = default_engine(Arc::clone(&store));
        create_task(&engine, "T-1", "todo");

        let err = engine
            .transition(
                &TransitionRequest::new("T-1", "in_progress"),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)), "{:?}", err);
        assert_eq!(current_status(&store, "T-1"), "todo");
    }

    #[test]
    fn stale_expected_status_is_reported() {
        for (name, store) in stores() {
            let engine = default_engine(Arc::clone(&store));
            create_task(&engine, "T-1", "todo");

            let entry = taskflow::types::NewHistoryEntry {
                old_status: Some("in_progress".to_string()),
                new_status: "ready_for_review".to_string(),
                agent: None,
                notes: None,
                forced: false,
                kind: TransitionKind::Forward,
                rejection_reason: None,
                reason_doc: None,
            };
            let err = store
                .apply_transition("T-1", "in_progress", entry)
                .unwrap_err();
            let err: EngineError = err.into();
            assert!(
                matches!(err, EngineError::StaleStatus { ref actual, .. } if actual == "todo"),
                "{}: {:?}",
                name,
                err
            );
            assert_eq!(current_status(&store, "T-1"), "todo", "{}", name);
        }
    }
}

mod request_validation_tests {
    use super::*;

    #[test]
    fn unknown_target_status_is_rejected_even_when_forced() {
        for (name, store) in stores() {
            let engine = default_engine(Arc::clone(&store));
            create_task(&engine, "T-1", "todo");

            let err = engine
                .transition(
                    &TransitionRequest::new("T-1", "shipped").force(true),
                    &CancelToken::new(),
                )
                .unwrap_err();
            assert!(matches!(err, EngineError::UnknownStatus(ref s) if s == "shipped"), "{}", name);
        }
    }

    #[test]
    fn missing_item_is_not_found() {
        for (name, store) in stores() {
            let engine = default_engine(store);
            let err = engine
                .transition(
                    &TransitionRequest::new("T-404", "in_progress"),
                    &CancelToken::new(),
                )
                .unwrap_err();
            assert!(matches!(err, EngineError::NotFound(_)), "{}", name);
        }
    }

    #[test]
    fn cancelled_token_stops_before_writing() {
        for (name, store) in stores() {
            let engine = default_engine(Arc::clone(&store));
            create_task(&engine, "T-1", "todo");

            let cancel = CancelToken::new();
            cancel.cancel();
            let err = engine
                .transition(&TransitionRequest::new("T-1", "in_progress"), &cancel)
                .unwrap_err();
            assert!(matches!(err, EngineError::Cancelled), "{}", name);
            assert_eq!(current_status(&store, "T-1"), "todo", "{}", name);
        }
    }

    #[test]
    fn creation_rejects_unknown_status_and_bad_parents() {
        for (name, store) in stores() {
            let engine = default_engine(store);
            let cancel = CancelToken::new();

            let err = engine
                .create_item(NewWorkItem::new("T-1", ItemKind::Task, "nope"), &cancel)
                .unwrap_err();
            assert!(matches!(err, EngineError::UnknownStatus(_)), "{}", name);

            engine
                .create_item(NewWorkItem::new("E-1", ItemKind::Epic, ""), &cancel)
                .expect("Failed to create epic");
            let err = engine
                .create_item(
                    NewWorkItem::new("T-2", ItemKind::Task, "").parent("E-1"),
                    &cancel,
                )
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidParent { .. }), "{}", name);

            let err = engine
                .create_item(NewWorkItem::new("E-1", ItemKind::Epic, ""), &cancel)
                .unwrap_err();
            assert!(matches!(err, EngineError::AlreadyExists(_)), "{}", name);
        }
    }

    #[test]
    fn blank_status_means_initial_status() {
        for (name, store) in stores() {
            let engine = default_engine(store);
            let item = engine
                .create_item(
                    NewWorkItem::new("T-1", ItemKind::Task, ""),
                    &CancelToken::new(),
                )
                .expect("Failed to create task");
            assert_eq!(item.status, "todo", "{}", name);
        }
    }
}

mod history_tests {
    use super::*;

    #[test]
    fn history_order_filters_and_counts() {
        for (name, store) in stores() {
            let engine = default_engine(Arc::clone(&store));
            let cancel = CancelToken::new();
            create_task(&engine, "T-1", "todo");

            let steps = [
                TransitionRequest::new("T-1", "in_progress"),
                TransitionRequest::new("T-1", "ready_for_review"),
                TransitionRequest::new("T-1", "in_progress").reason("first pass"),
                TransitionRequest::new("T-1", "ready_for_review"),
                TransitionRequest::new("T-1", "in_progress").reason("second pass"),
            ];
            for step in &steps {
                engine.transition(step, &cancel).expect("Transition failed");
            }

            let all = engine.history("T-1", HistoryQuery::default()).unwrap();
            assert_eq!(all.len(), 5, "{}", name);
            assert!(all.windows(2).all(|w| w[0].id < w[1].id), "{}", name);
            assert_eq!(all[0].old_status.as_deref(), Some("todo"), "{}", name);

            let newest_first = engine
                .history(
                    "T-1",
                    HistoryQuery {
                        reverse: true,
                        ..Default::default()
                    },
                )
                .unwrap();
            assert_eq!(
                newest_first[0].rejection_reason.as_deref(),
                Some("second pass"),
                "{}",
                name
            );

            assert_eq!(engine.rejection_count("T-1").unwrap(), 2, "{}", name);
        }
    }

    #[test]
    fn created_items_start_with_empty_history() {
        for (name, store) in stores() {
            let engine = default_engine(Arc::clone(&store));
            create_task(&engine, "T-1", "todo");
            assert!(
                engine
                    .history("T-1", HistoryQuery::default())
                    .unwrap()
                    .is_empty(),
                "{}",
                name
            );
        }
    }
}
