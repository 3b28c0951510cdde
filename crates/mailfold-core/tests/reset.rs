//! Tests for draining managed folders back into the inbox.

#![allow(clippy::unwrap_used, clippy::redundant_clone)]

mod common;

use common::{Call, MemoryMailbox};
use mailfold_core::service::{MailboxError, Uid};
use mailfold_core::{Confirmation, Error, ResetPlan};

fn work_tree() -> MemoryMailbox {
    let mut mailbox = MemoryMailbox::new()
        .with_folder("Folders")
        .with_folder("Folders/Work")
        .with_folder("Folders/Work/Feedback");
    mailbox.deliver("Folders/Work/Feedback", "Review 1", "a@corp.example", "Great", true);
    mailbox.deliver("Folders/Work/Feedback", "Review 2", "b@corp.example", "Good", false);
    mailbox
}

#[tokio::test]
async fn test_reset_processes_deepest_first() {
    let mut mailbox = work_tree();

    let plan = ResetPlan::discover(&mut mailbox, "Folders").await.unwrap();
    assert_eq!(
        plan.folders().collect::<Vec<_>>(),
        ["Folders/Work/Feedback", "Folders/Work"]
    );
    mailbox.calls.clear();

    let report = plan
        .execute(&mut mailbox, "INBOX", Confirmation::assumed())
        .await
        .unwrap();

    assert_eq!(
        mailbox.calls,
        [
            Call::Select("Folders/Work/Feedback".to_string()),
            Call::Search("ALL".to_string()),
            Call::Move(vec![1, 2], "INBOX".to_string()),
            Call::Unselect,
            Call::Delete("Folders/Work/Feedback".to_string()),
            Call::Select("Folders/Work".to_string()),
            Call::Search("ALL".to_string()),
            Call::Unselect,
            Call::Delete("Folders/Work".to_string()),
        ]
    );
    assert_eq!(mailbox.messages("INBOX").len(), 2);
    assert!(mailbox.folders.contains_key("Folders"));
    assert!(!mailbox.folders.contains_key("Folders/Work"));
    assert_eq!(report.messages_moved(), 2);
    assert_eq!(report.folders_deleted(), 2);
    assert_eq!(report.failures().count(), 0);
}

#[tokio::test]
async fn test_reset_continues_after_folder_failure() {
    let mut mailbox = work_tree().with_folder("Folders/Travel");
    mailbox.deliver("Folders/Travel", "Boarding pass", "air@example.com", "Gate 4", false);
    mailbox.fail(
        "delete",
        "Folders/Work/Feedback",
        MailboxError::Rejected("[INUSE] folder busy".to_string()),
    );

    let plan = ResetPlan::discover(&mut mailbox, "Folders").await.unwrap();
    let report = plan
        .execute(&mut mailbox, "INBOX", Confirmation::assumed())
        .await
        .unwrap();

    assert_eq!(report.folders.len(), 3);
    let failed: Vec<&str> = report.failures().map(|f| f.name.as_str()).collect();
    assert_eq!(failed, ["Folders/Work/Feedback"]);
    assert_eq!(report.messages_moved(), 3);
    assert!(mailbox.folders.contains_key("Folders/Work/Feedback"));
    assert!(!mailbox.folders.contains_key("Folders/Travel"));
    assert_eq!(mailbox.messages("INBOX").len(), 3);
}

#[tokio::test]
async fn test_reset_aborts_on_fatal_error() {
    let mut mailbox = work_tree();
    mailbox.fail(
        "select",
        "Folders/Work/Feedback",
        MailboxError::Connection("broken pipe".to_string()),
    );

    let plan = ResetPlan::discover(&mut mailbox, "Folders").await.unwrap();
    let result = plan
        .execute(&mut mailbox, "INBOX", Confirmation::assumed())
        .await;

    assert!(matches!(result, Err(Error::Transport(MailboxError::Connection(_)))));
    assert!(mailbox.folders.contains_key("Folders/Work"));
}

#[tokio::test]
async fn test_reset_with_nothing_to_do() {
    let mut mailbox = MemoryMailbox::new();
    mailbox.deliver("INBOX", "Hello", "me@example.com", "hi", false);

    let plan = ResetPlan::discover(&mut mailbox, "Folders").await.unwrap();
    assert!(plan.is_empty());

    let report = plan
        .execute(&mut mailbox, "INBOX", Confirmation::from_answer("y").unwrap())
        .await
        .unwrap();

    assert!(report.folders.is_empty());
    assert_eq!(mailbox.messages("INBOX")[0].uid, Uid::new(1).get());
}

#[tokio::test]
async fn test_reset_drains_into_given_source_folder() {
    let mut mailbox = work_tree().with_folder("Incoming");

    let plan = ResetPlan::discover(&mut mailbox, "Folders").await.unwrap();
    let report = plan
        .execute(&mut mailbox, "Incoming", Confirmation::assumed())
        .await
        .unwrap();

    assert_eq!(report.messages_moved(), 2);
    assert_eq!(mailbox.messages("Incoming").len(), 2);
    assert!(mailbox.messages("INBOX").is_empty());
    assert!(mailbox.calls.contains(&Call::Move(vec![1, 2], "Incoming".to_string())));
}
