use std::time::Duration;

use plan_tracker::db::Database;
use plan_tracker::engine::StatusEngine;
use plan_tracker::models::*;
use plan_tracker::plan::PlanDocument;
use plan_tracker::remote::{IssueTracker, MemoryTracker, SyncCoordinator, SyncScope};

fn key(raw: &str) -> ItemKey {
    ItemKey::parse(raw).expect("valid key")
}

fn setup() -> Database {
    let db = Database::open_memory().expect("Failed to create in-memory database");
    db.migrate().expect("Failed to run migrations");
    for (raw, title) in [
        ("E1", "Setup"),
        ("S1.1", "Scaffold"),
        ("T1.1.1", "Init repo"),
        ("T1.1.2", "Add CI"),
        ("E2", "Features"),
    ] {
        db.create(CreateItemInput::new(key(raw), None, title))
            .expect("Failed to create item");
    }
    db
}

fn coordinator<'a>(
    db: &'a Database,
    plan: &'a PlanDocument,
    tracker: &'a MemoryTracker,
) -> SyncCoordinator<'a, MemoryTracker> {
    SyncCoordinator::new(db, plan, tracker, Duration::ZERO)
}

fn issue_for(db: &Database, tracker: &MemoryTracker, raw: &str) -> plan_tracker::remote::MemoryIssue {
    let number = db
        .get(&key(raw))
        .expect("Query failed")
        .remote_ref
        .expect("item should be linked");
    tracker.issue(number).expect("issue should exist")
}

mod create_missing {
    use super::*;

    #[tokio::test]
    async fn test_creates_one_issue_per_item_and_links_it() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();

        let report = coordinator(&db, &plan, &tracker)
            .create_missing(&SyncScope::default())
            .await
            .expect("Pass failed");

        assert!(report.is_clean());
        assert_eq!(report.succeeded.len(), 5);
        assert_eq!(tracker.issues().len(), 5);
        assert!(db.unlinked_items().expect("Query failed").is_empty());

        let task = issue_for(&db, &tracker, "T1.1.1");
        assert_eq!(task.title, "[T1.1.1] Init repo");
        for label in ["type:task", "epic:E1", "story:S1.1", "status:backlog"] {
            assert!(task.labels.contains(label), "missing {}", label);
        }
    }

    #[tokio::test]
    async fn test_second_pass_creates_nothing() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();
        let mut sync = coordinator(&db, &plan, &tracker);

        sync.create_missing(&SyncScope::default()).await.expect("Pass failed");
        let report = sync.create_missing(&SyncScope::default()).await.expect("Pass failed");

        assert!(report.succeeded.is_empty());
        assert_eq!(report.skipped.len(), 5);
        assert_eq!(tracker.issues().len(), 5);
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_the_pass_continues() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();
        tracker.fail_on("T1.1.1");

        let report = coordinator(&db, &plan, &tracker)
            .create_missing(&SyncScope::default())
            .await
            .expect("Pass failed");

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].target, "T1.1.1");
        assert_eq!(report.succeeded.len(), 4);
        assert!(db.get(&key("T1.1.1")).expect("Query failed").remote_ref.is_none());
        assert!(db.get(&key("T1.1.2")).expect("Query failed").remote_ref.is_some());
    }

    #[tokio::test]
    async fn test_scope_and_limit_narrow_the_pass() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();

        let scope = SyncScope {
            kinds: vec![ItemKind::Task],
            epic: Some(key("E1")),
            limit: Some(1),
        };
        let report = coordinator(&db, &plan, &tracker)
            .create_missing(&scope)
            .await
            .expect("Pass failed");

        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].target, "T1.1.1");
        assert_eq!(tracker.issues().len(), 1);
    }

    #[tokio::test]
    async fn test_plan_section_becomes_the_issue_description() {
        let db = setup();
        let plan = PlanDocument::parse(
            "### Task T1.1.1: Init repo\n\nRun `git init` and push.\n\n### Task T1.1.2: Add CI\n",
        );
        let tracker = MemoryTracker::new();

        coordinator(&db, &plan, &tracker)
            .create_missing(&SyncScope::default())
            .await
            .expect("Pass failed");

        let task = issue_for(&db, &tracker, "T1.1.1");
        assert!(task.body.contains("Run `git init` and push."));
        let other = issue_for(&db, &tracker, "T1.1.2");
        assert!(other.body.contains("See detailed implementation plan."));
    }
}

mod mirror_status {
    use super::*;

    #[tokio::test]
    async fn test_done_item_gets_done_label_and_closed_issue() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();
        let mut sync = coordinator(&db, &plan, &tracker);
        sync.create_missing(&SyncScope::default()).await.expect("Pass failed");

        StatusEngine::new(&db)
            .complete(&key("T1.1.1"))
            .expect("Transition failed");
        let report = sync.mirror_status(&SyncScope::default()).await.expect("Pass failed");

        assert!(report.is_clean());
        let task = issue_for(&db, &tracker, "T1.1.1");
        assert!(task.closed);
        assert!(task.labels.contains("status:done"));
        assert!(!task.labels.contains("status:backlog"));

        let open = issue_for(&db, &tracker, "T1.1.2");
        assert!(!open.closed);
        assert!(open.labels.contains("status:backlog"));
    }

    #[tokio::test]
    async fn test_removes_every_stale_status_label() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();
        let mut sync = coordinator(&db, &plan, &tracker);
        sync.create_missing(&SyncScope::default()).await.expect("Pass failed");

        let number = db.get(&key("E2")).expect("Query failed").remote_ref.expect("linked");
        tracker.add_label(number, "status:todo").await.expect("Label failed");
        StatusEngine::new(&db)
            .start(&key("E2"))
            .expect("Transition failed");

        sync.mirror_status(&SyncScope::default()).await.expect("Pass failed");

        let status_labels: Vec<String> = tracker
            .issue(number)
            .expect("issue should exist")
            .labels
            .into_iter()
            .filter(|l| l.starts_with(STATUS_LABEL_PREFIX))
            .collect();
        assert_eq!(status_labels, vec!["status:in-progress"]);
    }

    #[tokio::test]
    async fn test_unlinked_items_are_skipped() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();

        let report = coordinator(&db, &plan, &tracker)
            .mirror_status(&SyncScope::default())
            .await
            .expect("Pass failed");

        assert!(report.succeeded.is_empty());
        assert_eq!(report.skipped.len(), 5);
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_tracker_leaves_local_state_alone() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();
        let mut sync = coordinator(&db, &plan, &tracker);
        sync.create_missing(&SyncScope::default()).await.expect("Pass failed");

        StatusEngine::new(&db)
            .complete(&key("E1"))
            .expect("Transition failed");
        tracker.set_unavailable(true);
        let report = sync.mirror_status(&SyncScope::default()).await.expect("Pass failed");

        assert_eq!(report.failed.len(), 5);
        assert_eq!(db.get(&key("E1")).expect("Query failed").status, Status::Done);
    }
}

mod refresh_content {
    use super::*;

    #[tokio::test]
    async fn test_rewrites_bodies_from_current_state() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();
        let mut sync = coordinator(&db, &plan, &tracker);
        sync.create_missing(&SyncScope::default()).await.expect("Pass failed");

        assert!(issue_for(&db, &tracker, "S1.1").body.contains("- [ ] **T1.1.1**: Init repo"));

        StatusEngine::new(&db)
            .complete(&key("T1.1.1"))
            .expect("Transition failed");
        let report = sync.refresh_content(&SyncScope::default()).await.expect("Pass failed");

        assert_eq!(report.succeeded.len(), 5);
        let story = issue_for(&db, &tracker, "S1.1");
        assert!(story.body.contains("- [x] **T1.1.1**: Init repo"));
        let epic = issue_for(&db, &tracker, "E1");
        assert!(epic.body.contains("- **Progress:** 50%"));
    }
}

mod ensure_labels {
    use super::*;

    #[tokio::test]
    async fn test_defines_kind_priority_status_and_epic_labels() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();

        let report = coordinator(&db, &plan, &tracker)
            .ensure_labels()
            .await
            .expect("Pass failed");

        assert!(report.is_clean());
        assert_eq!(report.succeeded.len(), 14);
        for name in ["type:epic", "type:subtask", "status:in-progress", "epic:E1", "epic:E2"] {
            assert!(tracker.label(name).is_some(), "missing {}", name);
        }
        let epic = tracker.label("epic:E1").expect("label should exist");
        assert_eq!(epic.description, "Epic 1: Setup");
    }
}

mod ensure_milestones {
    use super::*;

    #[tokio::test]
    async fn test_creates_one_milestone_per_epic() {
        let db = setup();
        db.update(
            &key("E1"),
            UpdateItemInput {
                description: Some("Everything before feature work".to_string()),
                ..Default::default()
            },
        )
        .expect("Failed to update");
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();

        let report = coordinator(&db, &plan, &tracker)
            .ensure_milestones()
            .await
            .expect("Pass failed");

        assert!(report.is_clean());
        let titles: Vec<String> = tracker.milestones().into_iter().map(|m| m.title).collect();
        assert_eq!(titles, vec!["E1: Setup", "E2: Features"]);
        let setup = tracker.milestone("E1: Setup").expect("milestone should exist");
        assert_eq!(setup.description, "Everything before feature work");
        assert_eq!(tracker.milestone("E2: Features").expect("milestone should exist").description, "");
    }

    #[tokio::test]
    async fn test_unavailable_tracker_reports_every_epic() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();
        tracker.set_unavailable(true);

        let report = coordinator(&db, &plan, &tracker)
            .ensure_milestones()
            .await
            .expect("Pass failed");

        assert_eq!(report.failed.len(), 2);
        assert!(tracker.milestones().is_empty());
    }
}

mod run_all {
    use super::*;

    #[tokio::test]
    async fn test_labels_milestones_then_issues() {
        let db = setup();
        let plan = PlanDocument::default();
        let tracker = MemoryTracker::new();

        let report = coordinator(&db, &plan, &tracker)
            .run_all(&SyncScope::default())
            .await
            .expect("Pass failed");

        assert!(report.is_clean());
        assert_eq!(report.succeeded.len(), 14 + 2 + 5);
        assert_eq!(tracker.milestones().len(), 2);
        assert_eq!(tracker.issues().len(), 5);

        let calls = tracker.calls();
        let first_milestone = calls
            .iter()
            .position(|c| c.starts_with("ensure-milestone"))
            .expect("milestones should be created");
        let first_issue = calls
            .iter()
            .position(|c| c.starts_with("create"))
            .expect("issues should be created");
        let last_label = calls
            .iter()
            .rposition(|c| c.starts_with("ensure-label"))
            .expect("labels should be created");
        assert!(last_label < first_milestone);
        assert!(first_milestone < first_issue);
    }
}
