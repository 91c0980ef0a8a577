mod support;

use support::Fixture;
use tasktrail_core::{AttachmentMode, CopyOptions, CopySource, ErrorKind, ItemStatus};

fn seed(fx: &Fixture) -> Vec<CopySource> {
    let work = fx.container(None, "work");
    let archive = fx.container(None, "archive");
    let first = fx.task(work.uuid, "first");
    fx.attach(first.uuid, "a.txt", b"0123456789");
    fx.attach(first.uuid, "b.txt", b"01234");
    let second = fx.task(work.uuid, "second");
    fx.attach(second.uuid, "c.txt", b"abc");
    fx.task(work.uuid, "third");
    fx.task(archive.uuid, "third");
    vec![
        CopySource::from("work/first"),
        CopySource::from("work/second"),
        CopySource::from("work/third"),
    ]
}

/// Row counts of every table a copy writes.
fn row_counts(fx: &Fixture) -> [i64; 4] {
    [
        fx.count("SELECT COUNT(*) FROM tasks;"),
        fx.count("SELECT COUNT(*) FROM attachments;"),
        fx.count("SELECT COUNT(*) FROM events;"),
        fx.count("SELECT COUNT(*) FROM task_labels;"),
    ]
}

#[test]
fn dry_run_never_touches_rows_or_files() {
    let fx = Fixture::new();
    let sources = seed(&fx);
    let rows_before = row_counts(&fx);
    let files_before = fx.stored_files();

    let options = CopyOptions::default()
        .with_dry_run(true)
        .with_overwrite(true)
        .with_attachment_mode(AttachmentMode::Full);
    let report = fx.engine().copy(&sources, "archive", &options).unwrap();

    assert!(report.summary.dry_run);
    assert!(report
        .results
        .iter()
        .all(|result| result.status == ItemStatus::Planned));
    assert_eq!(row_counts(&fx), rows_before);
    assert_eq!(fx.stored_files(), files_before);
}

#[test]
fn dry_run_reports_what_a_real_run_replicates() {
    let fx = Fixture::new();
    let sources = seed(&fx);
    let options = CopyOptions::default()
        .with_overwrite(true)
        .with_attachment_mode(AttachmentMode::Full);

    let preview = fx
        .engine()
        .copy(&sources, "archive", &options.clone().with_dry_run(true))
        .unwrap();
    let actions: Vec<Option<&str>> = preview
        .results
        .iter()
        .map(|result| result.planned_action)
        .collect();
    assert_eq!(actions, vec![Some("create"), Some("create"), Some("overwrite")]);
    assert_eq!(preview.results[0].display_path.as_deref(), Some("archive/first"));

    let real = fx.engine().copy(&sources, "archive", &options).unwrap();
    let planned: Vec<(usize, u64)> = preview
        .results
        .iter()
        .map(|result| (result.attachments, result.attachment_bytes))
        .collect();
    let replicated: Vec<(usize, u64)> = real
        .results
        .iter()
        .map(|result| (result.attachments, result.attachment_bytes))
        .collect();
    assert_eq!(planned, vec![(2, 15), (1, 3), (0, 0)]);
    assert_eq!(planned, replicated);
    assert_eq!(preview.summary.attachments, real.summary.attachments);
    assert_eq!(preview.summary.attachment_bytes, 18);
}

#[test]
fn dry_run_predicts_guard_failures() {
    let fx = Fixture::new();
    let mut sources = seed(&fx);
    sources[1] = sources[1].clone().expecting_version(7);

    let report = fx
        .engine()
        .copy(
            &sources,
            "archive",
            &CopyOptions::default().with_dry_run(true),
        )
        .unwrap();

    let kinds: Vec<Option<ErrorKind>> = report
        .results
        .iter()
        .map(|result| result.error.as_ref().map(|error| error.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            None,
            Some(ErrorKind::PreconditionFailed),
            Some(ErrorKind::AlreadyExists),
        ]
    );
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.failed, 2);
}

#[test]
fn skip_mode_previews_no_attachments() {
    let fx = Fixture::new();
    let sources = seed(&fx);

    let report = fx
        .engine()
        .copy(
            &sources[..2],
            "archive",
            &CopyOptions::default()
                .with_dry_run(true)
                .with_attachment_mode(AttachmentMode::Skip),
        )
        .unwrap();

    assert_eq!(report.summary.attachments, 0);
    assert_eq!(report.summary.attachment_bytes, 0);
}
