mod support;

use support::Fixture;
use tasktrail_core::{PathResolver, ResolveError};

#[test]
fn hierarchical_path_walks_containers_from_root() {
    let fx = Fixture::new();
    let work = fx.container(None, "Work");
    let backend = fx.container(Some(work.uuid), "Backend");
    let task = fx.task(backend.uuid, "fix-login");

    let resolver = PathResolver::new(&fx.conn);
    assert_eq!(resolver.resolve_container("work/backend").unwrap().uuid, backend.uuid);
    assert_eq!(resolver.resolve_task("Work/Backend/Fix Login").unwrap().uuid, task.uuid);
    assert_eq!(
        resolver.task_display_path(&task).unwrap(),
        "work/backend/fix-login"
    );
}

#[test]
fn friendly_labels_and_uuids_resolve_directly() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    let task = fx.task(work.uuid, "fix-login");

    let resolver = PathResolver::new(&fx.conn);
    assert_eq!(resolver.resolve_task(&task.label).unwrap().uuid, task.uuid);
    assert_eq!(resolver.resolve_task("t-1").unwrap().uuid, task.uuid);
    assert_eq!(resolver.resolve_task(&task.uuid.to_string()).unwrap().uuid, task.uuid);
    assert_eq!(resolver.resolve_container(&work.label).unwrap().uuid, work.uuid);
}

#[test]
fn label_like_reference_is_not_retried_as_a_path() {
    let fx = Fixture::new();
    let container = fx.container(None, "C-9");

    let resolver = PathResolver::new(&fx.conn);
    assert!(matches!(
        resolver.resolve_container("C-9"),
        Err(ResolveError::NotFound(_))
    ));
    assert_eq!(resolver.resolve_container("/C-9").unwrap().uuid, container.uuid);
}

#[test]
fn missing_segment_is_not_found() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    fx.task(work.uuid, "fix-login");

    let resolver = PathResolver::new(&fx.conn);
    assert!(matches!(
        resolver.resolve_task("work/nope/fix-login"),
        Err(ResolveError::NotFound(_))
    ));
    assert!(matches!(
        resolver.resolve_task("work/missing-task"),
        Err(ResolveError::NotFound(_))
    ));
    assert!(matches!(
        resolver.resolve_task("T-404"),
        Err(ResolveError::NotFound(_))
    ));
}

#[test]
fn same_slug_under_different_parents_is_disambiguated_by_path() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    let home = fx.container(None, "home");
    let work_docs = fx.container(Some(work.uuid), "docs");
    let home_docs = fx.container(Some(home.uuid), "docs");

    let resolver = PathResolver::new(&fx.conn);
    assert_eq!(resolver.resolve_container("work/docs").unwrap().uuid, work_docs.uuid);
    assert_eq!(resolver.resolve_container("home/docs").unwrap().uuid, home_docs.uuid);
    assert!(matches!(
        resolver.resolve_container("docs"),
        Err(ResolveError::NotFound(_))
    ));
}

#[test]
fn glob_in_last_segment_matches_zero_or_more_tasks() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    fx.task(work.uuid, "bug-101");
    fx.task(work.uuid, "bug-102");
    fx.task(work.uuid, "feature-7");

    let resolver = PathResolver::new(&fx.conn);
    let bugs = resolver.resolve_tasks("work/bug-*").unwrap();
    let slugs: Vec<&str> = bugs.iter().map(|task| task.slug()).collect();
    assert_eq!(slugs, vec!["bug-101", "bug-102"]);

    assert!(resolver.resolve_tasks("work/chore-*").unwrap().is_empty());
    assert_eq!(resolver.resolve_tasks("work/*").unwrap().len(), 3);
}

#[test]
fn single_segment_resolves_inside_scope() {
    let fx = Fixture::new();
    let work = fx.container(None, "work");
    let task = fx.task(work.uuid, "fix-login");

    let scoped = PathResolver::with_scope(&fx.conn, work.uuid);
    assert_eq!(scoped.resolve_task("fix-login").unwrap().uuid, task.uuid);
    assert!(matches!(
        PathResolver::new(&fx.conn).resolve_task("fix-login"),
        Err(ResolveError::NotFound(_))
    ));
}
