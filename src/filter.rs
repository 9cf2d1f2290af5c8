//! Decides which local tasks take part in a sync

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::SyncConfig;
use crate::identity::TaskId;
use crate::task::Task;

/// Something that knows which task identifiers already have a remote counterpart
pub trait MappedIds {
    fn is_mapped(&self, id: &TaskId) -> bool;
}

impl MappedIds for HashSet<TaskId> {
    fn is_mapped(&self, id: &TaskId) -> bool {
        self.contains(id)
    }
}

/// Whether a task is eligible for sync.
///
/// The rules are evaluated in order, and the first one that excludes the task wins:
/// 1. tasks without a due date when `due_date_only` is set, unless they have been synced already
/// 2. tasks under an excluded folder
/// 3. tasks carrying an excluded tag
/// 4. completed tasks older than `completed_task_age_days`
pub fn should_sync<M: MappedIds + ?Sized>(task: &Task, config: &SyncConfig, mappings: &M, now: DateTime<Utc>) -> bool {
    let is_mapped = task.identifier()
        .map(|id| mappings.is_mapped(id))
        .unwrap_or(false);

    if config.due_date_only && task.due_date().is_none() && is_mapped == false {
        return false;
    }

    if config.excluded_folders.iter().any(|folder| is_under_folder(task.file_path(), folder)) {
        return false;
    }

    if has_excluded_tag(task, &config.excluded_tags) {
        return false;
    }

    if let (Some(max_age), Some(completed_on)) = (config.completed_task_age_days, task.completion_status().completion_date()) {
        let age = now.date_naive().signed_duration_since(completed_on).num_days();
        if age > i64::from(max_age) {
            return false;
        }
    }

    true
}

/// Path-segment aware prefix check (`Archive` contains `Archive/a.md`, but not `Archived/a.md`)
fn is_under_folder(file_path: &str, folder: &str) -> bool {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        return false;
    }
    let file_path = file_path.trim_start_matches('/');
    match file_path.strip_prefix(folder) {
        None => false,
        Some(rest) => rest.starts_with('/'),
    }
}

fn has_excluded_tag(task: &Task, excluded_tags: &[String]) -> bool {
    if excluded_tags.is_empty() {
        return false;
    }
    task.tags().iter().any(|tag| {
        let tag = normalize_tag(tag);
        excluded_tags.iter().any(|excluded| normalize_tag(excluded) == tag)
    })
}

fn normalize_tag(tag: &str) -> String {
    tag.trim_start_matches('#').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use crate::task::CompletionStatus;

    fn task(path: &str, due: Option<NaiveDate>) -> Task {
        Task::new("Task".to_string(), path.to_string(), "- [ ] Task".to_string(), Utc::now())
            .with_due_date(due)
    }

    fn mapped_task(due: Option<NaiveDate>) -> (Task, HashSet<TaskId>) {
        let id = TaskId::assign();
        let raw = crate::identity::embed("- [ ] Task", &id);
        let task = Task::new("Task".to_string(), "notes.md".to_string(), raw, Utc::now()).with_due_date(due);
        let mut ids = HashSet::new();
        ids.insert(id);
        (task, ids)
    }

    #[test]
    fn due_date_only() {
        let config = SyncConfig { due_date_only: true, ..SyncConfig::default() };
        let none = HashSet::new();

        let a = task("notes.md", NaiveDate::from_ymd_opt(2026, 1, 20));
        let b = task("notes.md", None);
        let (c, c_ids) = mapped_task(None);

        assert!(should_sync(&a, &config, &none, Utc::now()));
        assert!(should_sync(&b, &config, &none, Utc::now()) == false);
        assert!(should_sync(&c, &config, &c_ids, Utc::now()));
    }

    #[test]
    fn mapping_neutralizes_due_date_requirement() {
        let (task, ids) = mapped_task(None);
        for folders in vec![vec![], vec!["notes.md".to_string()], vec!["".to_string()]] {
            let with = SyncConfig { due_date_only: true, excluded_folders: folders.clone(), ..SyncConfig::default() };
            let without = SyncConfig { due_date_only: false, excluded_folders: folders, ..SyncConfig::default() };
            assert_eq!(
                should_sync(&task, &with, &ids, Utc::now()),
                should_sync(&task, &without, &ids, Utc::now()),
            );
        }
    }

    #[test]
    fn malformed_identifier_means_unmapped() {
        let config = SyncConfig { due_date_only: true, ..SyncConfig::default() };
        let t = Task::new("Task".to_string(), "notes.md".to_string(), "- [ ] Task ^not-an-id".to_string(), Utc::now());
        assert!(should_sync(&t, &config, &HashSet::new(), Utc::now()) == false);
    }

    #[test]
    fn excluded_folders() {
        let config = SyncConfig { excluded_folders: vec!["Archive/".to_string(), "Projects/Old".to_string()], ..SyncConfig::default() };
        let none = HashSet::new();
        assert!(should_sync(&task("Archive/2024.md", None), &config, &none, Utc::now()) == false);
        assert!(should_sync(&task("Projects/Old/a.md", None), &config, &none, Utc::now()) == false);
        assert!(should_sync(&task("Archived/2024.md", None), &config, &none, Utc::now()));
        assert!(should_sync(&task("Projects/Older.md", None), &config, &none, Utc::now()));
    }

    #[test]
    fn excluded_tags() {
        let config = SyncConfig { excluded_tags: vec!["#private".to_string(), "Someday".to_string()], ..SyncConfig::default() };
        let none = HashSet::new();
        let private = task("notes.md", None).with_tags(vec!["#private"]);
        let someday = task("notes.md", None).with_tags(vec!["work", "someday"]);
        let public = task("notes.md", None).with_tags(vec!["work"]);
        assert!(should_sync(&private, &config, &none, Utc::now()) == false);
        assert!(should_sync(&someday, &config, &none, Utc::now()) == false);
        assert!(should_sync(&public, &config, &none, Utc::now()));
    }

    #[test]
    fn old_completed_tasks() {
        let config = SyncConfig { completed_task_age_days: Some(30), ..SyncConfig::default() };
        let none = HashSet::new();
        let now = Utc::now();
        let old = task("notes.md", None)
            .with_completion_status(CompletionStatus::Completed(Some((now - Duration::days(31)).date_naive())));
        let recent = task("notes.md", None)
            .with_completion_status(CompletionStatus::Completed(Some((now - Duration::days(30)).date_naive())));
        let unknown_date = task("notes.md", None)
            .with_completion_status(CompletionStatus::Completed(None));

        assert!(should_sync(&old, &config, &none, now) == false);
        assert!(should_sync(&recent, &config, &none, now));
        assert!(should_sync(&unknown_date, &config, &none, now));
    }
}
