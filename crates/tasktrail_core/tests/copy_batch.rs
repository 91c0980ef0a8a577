mod support;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use support::Fixture;
use tasktrail_core::repo::attachment_repo::{AttachmentRepository, SqliteAttachmentRepository};
use tasktrail_core::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use tasktrail_core::{
    open_db, AttachmentMode, BatchState, CancelHandle, CopyError, CopyOptions, CopySource,
    ErrorKind, ExitClass, ItemStatus,
};

/// Five tasks `item-1..item-5` in `work`, plus an empty `archive`.
fn five_sources(fx: &Fixture) -> Vec<CopySource> {
    let work = fx.container(None, "work");
    fx.container(None, "archive");
    (1..=5)
        .map(|n| {
            let task = fx.task(work.uuid, &format!("item-{n}"));
            fx.attach(task.uuid, "notes.txt", format!("notes {n}").as_bytes());
            CopySource::new(format!("work/item-{n}")).expecting_version(task.version)
        })
        .collect()
}

fn stale_third(mut sources: Vec<CopySource>) -> Vec<CopySource> {
    sources[2] = sources[2].clone().expecting_version(99);
    sources
}

#[test]
fn continue_on_error_isolates_a_precondition_failure() {
    let fx = Fixture::new();
    let sources = stale_third(five_sources(&fx));

    let options = CopyOptions::default().with_continue_on_error(true);
    let report = fx.engine().copy(&sources, "archive", &options).unwrap();

    assert_eq!(report.summary.succeeded, 4);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.state, BatchState::PartiallyFailed);
    assert_eq!(report.exit_class(), ExitClass::Partial);
    assert_eq!(report.exit_class().exit_code(), 2);
    let statuses: Vec<ItemStatus> = report.results.iter().map(|result| result.status).collect();
    assert_eq!(
        statuses,
        vec![
            ItemStatus::Created,
            ItemStatus::Created,
            ItemStatus::Failed,
            ItemStatus::Created,
            ItemStatus::Created,
        ]
    );
    assert_eq!(
        report.results[2].error.as_ref().unwrap().kind,
        ErrorKind::PreconditionFailed
    );

    let archive = tasktrail_core::PathResolver::new(&fx.conn)
        .resolve_container("archive")
        .unwrap();
    let slugs: Vec<String> = SqliteTaskRepository::new(&fx.conn)
        .list_tasks(archive.uuid)
        .unwrap()
        .into_iter()
        .map(|task| task.fields.slug)
        .collect();
    assert_eq!(slugs, vec!["item-1", "item-2", "item-4", "item-5"]);
}

#[test]
fn fail_fast_never_attempts_items_after_the_failure() {
    let fx = Fixture::new();
    let sources = stale_third(five_sources(&fx));

    let report = fx
        .engine()
        .copy(&sources, "archive", &CopyOptions::default())
        .unwrap();

    let statuses: Vec<ItemStatus> = report.results.iter().map(|result| result.status).collect();
    assert_eq!(
        statuses,
        vec![
            ItemStatus::Created,
            ItemStatus::Created,
            ItemStatus::Failed,
            ItemStatus::NotAttempted,
            ItemStatus::NotAttempted,
        ]
    );
    assert_eq!(report.summary.state, BatchState::Aborted);
    assert_eq!(report.summary.attempted, 3);
    assert_eq!(report.summary.not_attempted, 2);
    assert_eq!(fx.count("SELECT COUNT(*) FROM tasks;"), 7);
}

#[test]
fn worker_counts_one_and_four_produce_identical_state() {
    let sequential = run_snapshot(1);
    let parallel = run_snapshot(4);
    assert_eq!(sequential, parallel);
    assert_eq!(sequential.len(), 8);
}

/// Destination contents after copying eight tasks, ignoring identities.
fn run_snapshot(workers: usize) -> Vec<(String, String, BTreeSet<String>, Vec<(String, u64)>)> {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    let archive = fx.container(None, "archive");
    for n in 1..=8 {
        let task = fx.task(work.uuid, &format!("task-{n}"));
        for m in 0..n % 3 {
            fx.attach(task.uuid, &format!("file-{m}.txt"), &vec![b'x'; n * 10 + m]);
        }
    }

    let options = CopyOptions::default()
        .with_workers(workers)
        .with_attachment_mode(AttachmentMode::Full);
    let report = fx
        .engine()
        .copy(&[CopySource::from("work/*")], "archive", &options)
        .unwrap();
    assert_eq!(report.summary.succeeded, 8);
    assert_eq!(report.summary.state, BatchState::Completed);

    let attachments = SqliteAttachmentRepository::new(&fx.conn);
    SqliteTaskRepository::new(&fx.conn)
        .list_tasks(archive.uuid)
        .unwrap()
        .into_iter()
        .map(|task| {
            let files = attachments
                .list_attachments(task.uuid)
                .unwrap()
                .into_iter()
                .map(|attachment| {
                    assert!(fx.storage().exists(&attachment.rel_path));
                    (attachment.filename, attachment.size_bytes)
                })
                .collect();
            (task.fields.slug, task.fields.title, task.fields.labels, files)
        })
        .collect()
}

#[test]
fn concurrent_copies_into_same_slug_leave_one_winner() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    let home = fx.container(None, "home");
    fx.container(None, "archive");
    fx.task(work.uuid, "fix-login");
    fx.task(home.uuid, "fix-login");

    let options = CopyOptions::default()
        .with_workers(2)
        .with_continue_on_error(true);
    let report = fx
        .engine()
        .copy(
            &[CopySource::from("work/fix-login"), CopySource::from("home/fix-login")],
            "archive",
            &options,
        )
        .unwrap();

    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.failed, 1);
    let loser = report.failed().next().unwrap();
    assert_eq!(loser.error.as_ref().unwrap().kind, ErrorKind::AlreadyExists);
    assert_eq!(fx.count("SELECT COUNT(*) FROM tasks WHERE slug = 'fix-login';"), 3);
}

#[test]
fn zero_resolved_sources_fail_the_batch_unless_allowed() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    fx.container(None, "archive");
    fx.task(work.uuid, "fix-login");

    let err = fx
        .engine()
        .copy(&[CopySource::from("work/chore-*")], "archive", &CopyOptions::default())
        .unwrap_err();
    assert!(matches!(err, CopyError::NotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let report = fx
        .engine()
        .copy(
            &[CopySource::from("work/chore-*")],
            "archive",
            &CopyOptions::default().with_allow_zero_matches(true),
        )
        .unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.summary.state, BatchState::Completed);
    assert_eq!(report.exit_class(), ExitClass::AllSucceeded);
    assert_eq!(fx.count("SELECT COUNT(*) FROM tasks;"), 1);
}

#[test]
fn unknown_destination_fails_the_batch() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    fx.task(work.uuid, "fix-login");

    let err = fx
        .engine()
        .copy(&[CopySource::from("T-1")], "nowhere", &CopyOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn unresolved_reference_is_reported_in_input_order() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    fx.container(None, "archive");
    fx.task(work.uuid, "a");
    fx.task(work.uuid, "b");
    let sources = [
        CopySource::from("work/a"),
        CopySource::from("work/missing"),
        CopySource::from("work/b"),
    ];

    let report = fx
        .engine()
        .copy(
            &sources,
            "archive",
            &CopyOptions::default().with_continue_on_error(true),
        )
        .unwrap();
    let refs: Vec<(&str, ItemStatus)> = report
        .results
        .iter()
        .map(|result| (result.source_ref.as_str(), result.status))
        .collect();
    assert_eq!(
        refs,
        vec![
            ("work/a", ItemStatus::Created),
            ("work/missing", ItemStatus::Failed),
            ("work/b", ItemStatus::Created),
        ]
    );
    assert_eq!(report.results[1].error.as_ref().unwrap().kind, ErrorKind::NotFound);

    let fail_fast = fx
        .engine()
        .copy(&sources, "archive", &CopyOptions::default().with_overwrite(true))
        .unwrap();
    let statuses: Vec<ItemStatus> = fail_fast.results.iter().map(|result| result.status).collect();
    assert_eq!(
        statuses,
        vec![
            ItemStatus::Overwritten,
            ItemStatus::Failed,
            ItemStatus::NotAttempted,
        ]
    );
    assert_eq!(fail_fast.summary.state, BatchState::Aborted);
    assert_eq!(fail_fast.summary.attempted, 1);
    assert_eq!(fail_fast.summary.not_attempted, 1);
    assert_eq!(fx.copied_events(), 3);
}

#[test]
fn fail_fast_runs_items_listed_before_an_unresolved_reference() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    fx.container(None, "archive");
    fx.task(work.uuid, "a");
    fx.task(work.uuid, "b");
    let sources = [
        CopySource::from("work/a"),
        CopySource::from("work/b"),
        CopySource::from("work/missing"),
    ];

    let report = fx
        .engine()
        .copy(&sources, "archive", &CopyOptions::default())
        .unwrap();

    let statuses: Vec<ItemStatus> = report.results.iter().map(|result| result.status).collect();
    assert_eq!(
        statuses,
        vec![ItemStatus::Created, ItemStatus::Created, ItemStatus::Failed]
    );
    assert_eq!(report.summary.state, BatchState::Aborted);
    assert_eq!(report.summary.attempted, 2);
    assert_eq!(report.exit_class(), ExitClass::Partial);
    assert_eq!(fx.count("SELECT COUNT(*) FROM tasks;"), 4);
}

#[test]
fn items_wait_for_a_write_lock_held_by_another_connection() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    fx.container(None, "archive");
    fx.task(work.uuid, "a");
    fx.task(work.uuid, "b");

    let holder = open_db(&fx.config.db_path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let release = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(6));
        holder.execute_batch("COMMIT;").unwrap();
    });

    let started = Instant::now();
    let report = fx
        .engine()
        .copy(
            &[CopySource::from("work/a"), CopySource::from("work/b")],
            "archive",
            &CopyOptions::default().with_workers(2),
        )
        .unwrap();
    release.join().unwrap();

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(report.summary.state, BatchState::Completed);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(fx.count("SELECT COUNT(*) FROM tasks;"), 4);
}

#[test]
fn duplicate_references_are_copied_once() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    fx.container(None, "archive");
    let task = fx.task(work.uuid, "fix-login");

    let report = fx
        .engine()
        .copy(
            &[
                CopySource::from("work/fix-login"),
                CopySource::from(task.label.as_str()),
                CopySource::from("work/fix-*"),
            ],
            "archive",
            &CopyOptions::default(),
        )
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.summary.state, BatchState::Completed);
}

#[test]
fn cancelled_batch_attempts_nothing() {
    let fx = Fixture::new();
    let sources = five_sources(&fx);
    let cancel = CancelHandle::new();
    cancel.cancel();

    let report = fx
        .engine()
        .copy_cancellable(&sources, "archive", &CopyOptions::default().with_workers(3), &cancel)
        .unwrap();

    assert_eq!(report.summary.not_attempted, 5);
    assert_eq!(report.summary.state, BatchState::Aborted);
    assert_eq!(report.exit_class(), ExitClass::NoneSucceeded);
    assert_eq!(fx.count("SELECT COUNT(*) FROM tasks;"), 5);
}

#[test]
fn ndjson_output_has_one_record_per_source() {
    let fx = Fixture::new();
    let sources = stale_third(five_sources(&fx));

    let report = fx
        .engine()
        .copy(
            &sources,
            "archive",
            &CopyOptions::default().with_continue_on_error(true),
        )
        .unwrap();
    let records: Vec<serde_json::Value> = report
        .to_ndjson()
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(records.len(), 5);
    assert_eq!(records[0]["status"], "created");
    assert_eq!(records[0]["display_path"], "archive/item-1");
    assert_eq!(records[0]["attachments"], 1);
    assert_eq!(records[2]["error"]["kind"], "precondition_failed");
}
