//! Integration tests for the SQLite database layer.
//!
//! Most tests use an in-memory database; persistence tests open a file in a
//! temp directory.

use taskflow::db::Database;
use taskflow::store::StoreError;
use taskflow::types::{ItemKind, NewHistoryEntry, NewWorkItem, RelationshipType, TransitionKind};
use tempfile::TempDir;

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn forward(from: &str, to: &str) -> NewHistoryEntry {
    NewHistoryEntry {
        old_status: Some(from.to_string()),
        new_status: to.to_string(),
        agent: Some("worker-1".to_string()),
        notes: None,
        forced: false,
        kind: TransitionKind::Forward,
        rejection_reason: None,
        reason_doc: None,
    }
}

mod item_tests {
    use super::*;

    #[test]
    fn insert_item_applies_defaults() {
        let db = setup_db();

        let item = db
            .insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
            .expect("Failed to insert item");

        assert_eq!(item.title, "T-1");
        assert_eq!(item.priority, 3);
        assert_eq!(item.execution_order, None);
        assert_eq!(item.progress, 0.0);
        assert!(item.created_at > 0);

        let loaded = db.get_item("T-1").unwrap().expect("Item missing");
        assert_eq!(loaded, item);
    }

    #[test]
    fn duplicate_key_is_already_exists() {
        let db = setup_db();
        db.insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
            .unwrap();

        let err = db
            .insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn missing_parent_is_item_not_found() {
        let db = setup_db();
        let err = db
            .insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo").parent("F-9"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::ItemNotFound(key)) if key == "F-9"
        ));
    }

    #[test]
    fn children_are_listed_per_parent() {
        let db = setup_db();
        db.insert_item(NewWorkItem::new("F-1", ItemKind::Feature, "todo"))
            .unwrap();
        db.insert_item(NewWorkItem::new("F-2", ItemKind::Feature, "todo"))
            .unwrap();
        for (key, parent) in [("T-1", "F-1"), ("T-2", "F-2"), ("T-3", "F-1")] {
            db.insert_item(NewWorkItem::new(key, ItemKind::Task, "todo").parent(parent))
                .unwrap();
        }

        let children: Vec<String> = db
            .list_children("F-1")
            .unwrap()
            .into_iter()
            .map(|i| i.key)
            .collect();
        assert_eq!(children, vec!["T-1", "T-3"]);
        assert_eq!(db.list_items().unwrap().len(), 5);
    }

    #[test]
    fn set_progress_on_missing_item_fails() {
        let db = setup_db();
        let err = db.set_progress("nope", 50.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::ItemNotFound(_))
        ));
    }
}

mod history_tests {
    use super::*;

    #[test]
    fn apply_transition_updates_status_and_appends() {
        let db = setup_db();
        db.insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
            .unwrap();

        let (item, entry) = db
            .apply_transition("T-1", "todo", forward("todo", "in_progress"))
            .expect("Transition failed");
        assert_eq!(item.status, "in_progress");
        assert_eq!(entry.item_key, "T-1");
        assert_eq!(entry.agent.as_deref(), Some("worker-1"));

        db.apply_transition("T-1", "in_progress", forward("in_progress", "ready_for_review"))
            .unwrap();

        let history = db.history("T-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], entry);
        assert!(history[0].id < history[1].id);
    }

    #[test]
    fn compare_and_swap_refuses_stale_status() {
        let db = setup_db();
        db.insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
            .unwrap();

        let err = db
            .apply_transition("T-1", "blocked", forward("blocked", "in_progress"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::StaleStatus { actual, .. }) if actual == "todo"
        ));
        assert!(db.history("T-1").unwrap().is_empty());
    }

    #[test]
    fn history_rows_cannot_be_rewritten() {
        let db = setup_db();
        db.insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
            .unwrap();
        db.apply_transition("T-1", "todo", forward("todo", "in_progress"))
            .unwrap();

        let result = db.with_conn(|conn| {
            conn.execute("UPDATE transition_history SET new_status = 'completed'", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(db.history("T-1").unwrap()[0].new_status, "in_progress");

        let result = db.with_conn(|conn| {
            conn.execute("DELETE FROM transition_history", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(db.history("T-1").unwrap().len(), 1);
    }

    #[test]
    fn items_with_history_cannot_be_deleted() {
        let db = setup_db();
        db.insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
            .unwrap();
        db.apply_transition("T-1", "todo", forward("todo", "in_progress"))
            .unwrap();

        let result = db.with_conn(|conn| {
            conn.execute("DELETE FROM work_items WHERE key = 'T-1'", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(db.get_item("T-1").unwrap().is_some());
        assert_eq!(db.history("T-1").unwrap().len(), 1);
    }
}

mod relationship_tests {
    use super::*;

    #[test]
    fn relationships_require_existing_endpoints() {
        let db = setup_db();
        db.insert_item(NewWorkItem::new("A", ItemKind::Task, "todo"))
            .unwrap();

        let err = db
            .create_relationship("A", "B", RelationshipType::DependsOn)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::ItemNotFound(key)) if key == "B"
        ));
    }

    #[test]
    fn delete_missing_relationship_fails() {
        let db = setup_db();
        let err = db.delete_relationship(42).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::RelationshipNotFound(42))
        ));
    }

    #[test]
    fn delete_missing_pair_fails() {
        let db = setup_db();
        for key in ["A", "B"] {
            db.insert_item(NewWorkItem::new(key, ItemKind::Task, "todo"))
                .unwrap();
        }
        let err = db
            .delete_relationship_by_pair("A", "B", RelationshipType::DependsOn)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::EdgeNotFound { from, .. }) if from == "A"
        ));
    }

    #[test]
    fn type_filter_uses_in_list() {
        let db = setup_db();
        for key in ["A", "B", "C", "D"] {
            db.insert_item(NewWorkItem::new(key, ItemKind::Task, "todo"))
                .unwrap();
        }
        db.create_relationship("A", "B", RelationshipType::DependsOn)
            .unwrap();
        db.create_relationship("A", "C", RelationshipType::Blocks)
            .unwrap();
        db.create_relationship("A", "D", RelationshipType::Duplicates)
            .unwrap();

        let picked: Vec<String> = db
            .outgoing(
                "A",
                &[RelationshipType::Duplicates, RelationshipType::DependsOn],
            )
            .unwrap()
            .into_iter()
            .map(|r| r.to_key)
            .collect();
        assert_eq!(picked, vec!["B", "D"]);
        assert_eq!(db.outgoing("A", &[]).unwrap().len(), 3);
        assert_eq!(db.incoming("C", &[]).unwrap().len(), 1);
    }
}

mod persistence_tests {
    use super::*;

    #[test]
    fn data_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("tasks.db");

        {
            let db = Database::open(&path).expect("Failed to open database");
            db.insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
                .unwrap();
            db.apply_transition("T-1", "todo", forward("todo", "in_progress"))
                .unwrap();
        }

        let db = Database::open(&path).expect("Failed to reopen database");
        assert_eq!(db.get_item("T-1").unwrap().unwrap().status, "in_progress");
        assert_eq!(db.history("T-1").unwrap().len(), 1);
    }

    #[test]
    fn status_override_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.db");

        {
            let db = Database::open(&path).expect("Failed to open database");
            let item = db
                .insert_item(
                    NewWorkItem::new("F-1", ItemKind::Feature, "todo").status_override(true),
                )
                .unwrap();
            assert!(item.status_override);
        }

        let db = Database::open(&path).expect("Failed to reopen database");
        assert!(db.get_item("F-1").unwrap().unwrap().status_override);
        let released = db.set_status_override("F-1", false).unwrap();
        assert!(!released.status_override);
        assert!(!db.get_item("F-1").unwrap().unwrap().status_override);
    }
}
