#![allow(dead_code)]

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tasktrail_core::{
    open_db, Attachment, AttachmentStorage, Container, ContainerId, CopyEngine, StoreConfig,
    Task, TaskFields, TaskId, TaskService,
};
use tempfile::TempDir;

/// File-backed store plus attachment root in a temporary directory.
pub(crate) struct Fixture {
    pub dir: TempDir,
    pub config: StoreConfig,
    pub conn: Connection,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::from_data_dir(dir.path().join("data"));
        fs::create_dir_all(dir.path().join("data")).unwrap();
        let conn = open_db(&config.db_path).unwrap();
        Self { dir, config, conn }
    }

    pub(crate) fn engine(&self) -> CopyEngine {
        CopyEngine::open(self.config.clone())
    }

    pub(crate) fn storage(&self) -> AttachmentStorage {
        AttachmentStorage::new(&self.config.attachments_root)
    }

    pub(crate) fn service(&self) -> TaskService<'_> {
        TaskService::new(&self.conn, "tester")
    }

    pub(crate) fn container(&self, parent: Option<ContainerId>, name: &str) -> Container {
        self.service().create_container(parent, name).unwrap()
    }

    pub(crate) fn task(&self, container: ContainerId, slug: &str) -> Task {
        let fields = TaskFields::new(slug, format!("Title of {slug}"));
        self.service().create_task(container, fields).unwrap()
    }

    pub(crate) fn task_with(&self, container: ContainerId, fields: TaskFields) -> Task {
        self.service().create_task(container, fields).unwrap()
    }

    /// Imports `content` as attachment `filename` of `task`.
    pub(crate) fn attach(&self, task: TaskId, filename: &str, content: &[u8]) -> Attachment {
        let inbox = self.dir.path().join("inbox").join(task.to_string());
        fs::create_dir_all(&inbox).unwrap();
        let path = inbox.join(filename);
        fs::write(&path, content).unwrap();
        self.service()
            .add_attachment(&self.storage(), task, &path, Some("text/plain"))
            .unwrap()
    }

    pub(crate) fn count(&self, sql: &str) -> i64 {
        self.conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    pub(crate) fn copied_events(&self) -> i64 {
        self.count("SELECT COUNT(*) FROM events WHERE event_type = 'copied';")
    }

    /// Every regular file under the attachment root, sorted.
    pub(crate) fn stored_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        collect_files(&self.config.attachments_root, &mut files);
        files.sort();
        files
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.push(path);
        }
    }
}
