//! PRD watcher integration tests
//!
//! A loop rewrites the PRD while a watcher observes it.

use std::time::Duration;

use prdloop::domain::LoopState;
use prdloop::manager::{Manager, ManagerConfig};
use prdloop::prd::{Prd, PrdWatcher, Story, WatchEvent, merge_progress, reconcile_file};
use prdloop::runner::{RetryConfig, WorkerConfig};
use tempfile::TempDir;

fn two_stories() -> Prd {
    Prd::new("", "Auth")
        .with_story(Story::new("US-001", "Login", 1))
        .with_story(Story::new("US-002", "Logout", 2))
}

/// Integration test: the watcher reports the status change the loop produced
#[tokio::test]
async fn test_watcher_sees_loop_progress() {
    let temp = TempDir::new().unwrap();
    let prd_dir = temp.path().join("auth");
    std::fs::create_dir(&prd_dir).unwrap();
    let prd_path = prd_dir.join("prd.json");
    two_stories().save(&prd_path).unwrap();

    let mut done = two_stories();
    for story in &mut done.user_stories {
        story.passes = true;
    }
    let done_path = temp.path().join("done.json");
    done.save(&done_path).unwrap();

    let mut watcher = PrdWatcher::new(&prd_path);
    let mut changes = watcher.start().unwrap();

    let manager = Manager::new(ManagerConfig {
        base_dir: prd_dir.clone(),
        max_iterations: 2,
        worker: WorkerConfig::script(format!("sleep 0.2; cp {} prd.json", done_path.display())),
        retry: RetryConfig::disabled(),
    });
    let _events = manager.take_events();
    manager.register("auth", &prd_path).await.unwrap();
    manager.start("auth").await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(change) = changes.recv().await {
            if let WatchEvent::Changed(prd) = change
                && prd.all_complete()
            {
                return prd;
            }
        }
        panic!("watch channel closed");
    })
    .await
    .unwrap();

    assert_eq!(seen.name, "auth");
    assert_eq!(seen.completed_count(), 2);

    manager.stop_all().await;
    assert_eq!(manager.get_state("auth").await, Some(LoopState::Complete));
    watcher.stop();
    assert!(!watcher.is_running());
}

/// Integration test: re-authoring a PRD mid-flight keeps recorded progress
#[test]
fn test_reconcile_keeps_progress() {
    let temp = TempDir::new().unwrap();
    let prd_dir = temp.path().join("auth");
    std::fs::create_dir(&prd_dir).unwrap();
    let prd_path = prd_dir.join("prd.json");

    let mut old = two_stories();
    old.user_stories[0].passes = true;
    old.user_stories[1].in_progress = true;

    // New definition drops US-002, renames US-001, adds US-003
    let new = Prd::new("", "Auth v2")
        .with_story(Story::new("US-001", "Login with SSO", 1))
        .with_story(Story::new("US-003", "Audit log", 3));
    new.save(&prd_path).unwrap();

    let merged = reconcile_file(&prd_path, &old).unwrap();
    let reloaded = Prd::load(&prd_path).unwrap();

    assert_eq!(reloaded.user_stories.len(), 2);
    assert!(reloaded.story("US-001").unwrap().passes);
    assert_eq!(reloaded.story("US-001").unwrap().title, "Login with SSO");
    assert!(!reloaded.story("US-003").unwrap().has_progress());
    assert_eq!(merged.completed_count(), 1);
    assert_eq!(reloaded.next_story().unwrap().id, "US-003");

    // Merging is pure: the old document is untouched
    let again = merge_progress(&old, two_stories());
    assert!(again.user_stories[1].in_progress);
    assert!(old.user_stories[0].passes);
}
