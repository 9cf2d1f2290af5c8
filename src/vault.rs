//! A note store over a folder of Markdown notes
//!
//! Tasks are list items with a checkbox, with optional tokens:
//! ```text
//! - [ ] Buy milk #errands 📅 2026-01-20 ^0123456789abcdef0123456789abcdef
//! - [x] Call the plumber ✅ 2026-01-18
//! ```
//! Priority and scheduling markers (`⏫`, `⏳ 2026-01-19`...) are not synced, but stay on the line when it is rewritten.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{BoxError, SyncError};
use crate::identity::TaskId;
use crate::task::{CompletionStatus, Task, TaskFields};
use crate::traits::NoteStore;

const DUE_MARKER: &str = "📅";
const DONE_MARKER: &str = "✅";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A folder of `.md` files. Sub-folders are walked, hidden ones (e.g. `.obsidian`) are not.
#[derive(Clone, Debug)]
pub struct MarkdownVault {
    root: PathBuf,
}

impl MarkdownVault {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn note_files(&self) -> Result<Vec<PathBuf>, BoxError> {
        let mut files = Vec::new();
        let mut folders = vec![self.root.clone()];
        while let Some(folder) = folders.pop() {
            for dir_entry in fs::read_dir(&folder)? {
                let path = dir_entry?.path();
                let hidden = path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with('.'))
                    .unwrap_or(false);
                if hidden {
                    continue;
                }
                if path.is_dir() {
                    folders.push(path);
                } else if path.extension().and_then(|ext| ext.to_str()) == Some("md") {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// The path of a note, relative to the vault, with `/` separators
    fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn read_note(&self, path: &Path) -> Result<Vec<Task>, BoxError> {
        let content = fs::read_to_string(path)?;
        let last_modified: DateTime<Utc> = fs::metadata(path)?.modified()?.into();
        let file_path = self.relative_path(path);

        Ok(content.lines()
            .filter_map(|line| parse_task_line(line, &file_path, last_modified))
            .collect())
    }

    /// Replace the first line of a note that is exactly `old_line`
    fn replace_line(&self, file_path: &str, old_line: &str, new_line: &str) -> Result<(), BoxError> {
        let path = self.root.join(file_path);
        let content = fs::read_to_string(&path)
            .map_err(|err| SyncError::NoteStore(format!("Unable to read {}: {}", file_path, err)))?;

        let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let mut lines: Vec<&str> = content.lines().collect();
        let index = lines.iter()
            .position(|line| *line == old_line)
            .ok_or_else(|| SyncError::NoteStore(format!("The task line {:?} is not in {} anymore", old_line, file_path)))?;
        lines[index] = new_line;

        let mut new_content = lines.join(newline);
        if content.ends_with('\n') {
            new_content.push_str(newline);
        }
        fs::write(&path, new_content)
            .map_err(|err| SyncError::NoteStore(format!("Unable to write {}: {}", file_path, err)))?;
        Ok(())
    }
}

#[async_trait]
impl NoteStore for MarkdownVault {
    async fn list_tasks(&self) -> Result<Vec<Task>, BoxError> {
        let mut tasks = Vec::new();
        for path in self.note_files()? {
            match self.read_note(&path) {
                Ok(note_tasks) => tasks.extend(note_tasks),
                Err(err) => log::warn!("Unable to read {}: {}. Ignoring it", path.display(), err),
            }
        }
        Ok(tasks)
    }

    async fn rewrite_task_line(&mut self, task: &Task, new_raw_text: &str) -> Result<(), BoxError> {
        self.replace_line(task.file_path(), task.raw_text(), new_raw_text)
    }

    async fn apply_remote_fields(&mut self, task: &Task, fields: &TaskFields) -> Result<(), BoxError> {
        let today = Utc::now().date_naive();
        let completion = match (fields.completed, task.completion_status()) {
            (false, _) => CompletionStatus::Uncompleted,
            (true, CompletionStatus::Completed(date)) => CompletionStatus::Completed(*date),
            (true, CompletionStatus::Uncompleted) => CompletionStatus::Completed(Some(today)),
        };
        let new_line = render_task_line(task.raw_text(), fields, &completion, task.identifier())?;
        self.replace_line(task.file_path(), task.raw_text(), &new_line)
    }
}


/// Markers of the Tasks plugin that are kept on the line as they are, since they have no VTODO counterpart
const PRIORITY_MARKERS: &[&str] = &["🔺", "⏫", "🔼", "🔽", "⏬"];
/// Same, for markers followed by a date (start, scheduled, created, cancelled)
const DATED_MARKERS: &[&str] = &["🛫", "⏳", "➕", "❌"];

/// A task line, split into its parts
struct TaskLine<'a> {
    indent: &'a str,
    bullet: &'a str,
    done: bool,
    description: Vec<&'a str>,
    tags: Vec<String>,
    due_date: Option<NaiveDate>,
    done_date: Option<NaiveDate>,
    /// Tokens this store does not sync, in their original order
    unsynced: Vec<&'a str>,
}

fn parse_date(token: Option<&&str>) -> Option<NaiveDate> {
    token.and_then(|token| NaiveDate::parse_from_str(token, DATE_FORMAT).ok())
}

impl<'a> TaskLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let body = line.trim_start();
        let indent = &line[..line.len() - body.len()];

        let (bullet, done, text) = ["- ", "* "].iter()
            .filter_map(|bullet| body.strip_prefix(*bullet).map(|rest| (*bullet, rest)))
            .find_map(|(bullet, rest)| {
                if let Some(text) = rest.strip_prefix("[ ]") {
                    return Some((bullet, false, text));
                }
                rest.strip_prefix("[x]").or_else(|| rest.strip_prefix("[X]"))
                    .map(|text| (bullet, true, text))
            })?;

        let mut parsed = Self {
            indent, bullet, done,
            description: Vec::new(), tags: Vec::new(),
            due_date: None, done_date: None,
            unsynced: Vec::new(),
        };

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            if token == DUE_MARKER {
                parsed.due_date = parse_date(tokens.get(i + 1));
                i += 2;
            } else if token == DONE_MARKER {
                parsed.done_date = parse_date(tokens.get(i + 1));
                i += 2;
            } else if DATED_MARKERS.contains(&token) && parse_date(tokens.get(i + 1)).is_some() {
                parsed.unsynced.extend_from_slice(&tokens[i..i + 2]);
                i += 2;
            } else if PRIORITY_MARKERS.contains(&token) {
                parsed.unsynced.push(token);
                i += 1;
            } else if token.starts_with('^') && crate::identity::is_well_formed(&token[1..]) {
                i += 1;
            } else {
                if token.len() > 1 && token.starts_with('#') {
                    parsed.tags.push(token[1..].to_string());
                }
                parsed.description.push(token);
                i += 1;
            }
        }
        Some(parsed)
    }
}

fn parse_task_line(line: &str, file_path: &str, last_modified: DateTime<Utc>) -> Option<Task> {
    let parsed = TaskLine::parse(line)?;

    let description = parsed.description.join(" ");
    if description.is_empty() {
        return None;
    }
    let completion_status = match parsed.done {
        true => CompletionStatus::Completed(parsed.done_date),
        false => CompletionStatus::Uncompleted,
    };

    Some(
        Task::new(description, file_path.to_string(), line.to_string(), last_modified)
            .with_due_date(parsed.due_date)
            .with_completion_status(completion_status)
            .with_tags(parsed.tags)
    )
}

/// Build a task line from synced values.
///
/// The indentation, bullet and unsynced tokens of `old_line` are kept. The description is put on a single line.
fn render_task_line(old_line: &str, fields: &TaskFields, completion: &CompletionStatus, id: Option<&TaskId>) -> Result<String, SyncError> {
    let description = fields.description.split_whitespace().collect::<Vec<_>>().join(" ");
    if description.is_empty() {
        return Err(SyncError::NoteStore(format!("Refusing to write an empty description over {:?}", old_line)));
    }

    let (indent, bullet, unsynced) = match TaskLine::parse(old_line) {
        Some(parsed) => (parsed.indent, parsed.bullet, parsed.unsynced),
        None => ("", "- ", Vec::new()),
    };
    let checkbox = if fields.completed { "[x]" } else { "[ ]" };

    let mut line = format!("{}{}{} {}", indent, bullet, checkbox, description);
    for token in unsynced {
        line.push(' ');
        line.push_str(token);
    }
    if let Some(due) = fields.due_date {
        line.push_str(&format!(" {} {}", DUE_MARKER, due.format(DATE_FORMAT)));
    }
    if let CompletionStatus::Completed(Some(date)) = completion {
        line.push_str(&format!(" {} {}", DONE_MARKER, date.format(DATE_FORMAT)));
    }
    Ok(match id {
        Some(id) => crate::identity::embed(&line, id),
        None => line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault_with(notes: &[(&str, &str)]) -> (tempfile::TempDir, MarkdownVault) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in notes {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let vault = MarkdownVault::new(dir.path());
        (dir, vault)
    }

    #[test]
    fn task_lines() {
        let now = Utc::now();
        let id = TaskId::assign();
        let line = format!("  - [ ] Buy milk #errands 📅 2026-01-20 ^{}", id);
        let task = parse_task_line(&line, "daily.md", now).unwrap();
        assert_eq!(task.description(), "Buy milk #errands");
        assert_eq!(task.due_date(), NaiveDate::from_ymd_opt(2026, 1, 20));
        assert_eq!(task.identifier(), Some(&id));
        assert!(task.tags().contains("errands"));
        assert!(task.completed() == false);

        let done = parse_task_line("- [x] Call the plumber ✅ 2026-01-18", "daily.md", now).unwrap();
        assert_eq!(done.completion_status(), &CompletionStatus::Completed(NaiveDate::from_ymd_opt(2026, 1, 18)));

        let done_no_date = parse_task_line("- [X] Water the plants", "daily.md", now).unwrap();
        assert_eq!(done_no_date.completion_status(), &CompletionStatus::Completed(None));

        assert!(parse_task_line("- plain list item", "daily.md", now).is_none());
        assert!(parse_task_line("Some text", "daily.md", now).is_none());
        assert!(parse_task_line("- [ ] ", "daily.md", now).is_none());
    }

    #[test]
    fn rendering() {
        let id = TaskId::assign();
        let fields = TaskFields {
            description: "Buy oat milk".to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 1, 21),
            completed: true,
        };
        let completion = CompletionStatus::Completed(NaiveDate::from_ymd_opt(2026, 1, 19));
        let line = render_task_line(&format!("\t- [ ] Buy milk ^{}", id), &fields, &completion, Some(&id)).unwrap();
        assert_eq!(line, format!("\t- [x] Buy oat milk 📅 2026-01-21 ✅ 2026-01-19 ^{}", id));
    }

    #[tokio::test]
    async fn list_tasks_walks_the_vault() {
        let (_dir, vault) = vault_with(&[
            ("daily.md", "# Today\n- [ ] Buy milk\nSome text\n"),
            ("Projects/house.md", "- [x] Call the plumber\n"),
            (".obsidian/ignored.md", "- [ ] Hidden\n"),
            ("notes.txt", "- [ ] Not a note\n"),
        ]);

        let tasks = vault.list_tasks().await.unwrap();
        let mut found: Vec<(&str, &str)> = tasks.iter().map(|t| (t.file_path(), t.description())).collect();
        found.sort();
        assert_eq!(found, vec![("Projects/house.md", "Call the plumber"), ("daily.md", "Buy milk")]);
    }

    #[tokio::test]
    async fn rewrite_keeps_the_rest_of_the_note() {
        let (dir, mut vault) = vault_with(&[("daily.md", "# Today\r\n- [ ] Buy milk\r\n- [ ] Call mom\r\n")]);
        let task = vault.list_tasks().await.unwrap().remove(0);

        let id = TaskId::assign();
        let new_line = crate::identity::embed(task.raw_text(), &id);
        vault.rewrite_task_line(&task, &new_line).await.unwrap();

        let content = fs::read_to_string(dir.path().join("daily.md")).unwrap();
        assert_eq!(content, format!("# Today\r\n- [ ] Buy milk ^{}\r\n- [ ] Call mom\r\n", id));

        let tasks = vault.list_tasks().await.unwrap();
        assert_eq!(tasks[0].identifier(), Some(&id));

        // The old line is gone
        assert!(vault.rewrite_task_line(&task, "- [ ] whatever").await.is_err());
    }

    #[tokio::test]
    async fn remote_fields_are_written_back() {
        let id = TaskId::assign();
        let note = format!("- [ ] Buy milk ^{}\n", id);
        let (dir, mut vault) = vault_with(&[("daily.md", note.as_str())]);
        let task = vault.list_tasks().await.unwrap().remove(0);

        let fields = TaskFields { description: "Buy oat milk".to_string(), due_date: NaiveDate::from_ymd_opt(2026, 1, 20), completed: false };
        vault.apply_remote_fields(&task, &fields).await.unwrap();

        let content = fs::read_to_string(dir.path().join("daily.md")).unwrap();
        assert_eq!(content, format!("- [ ] Buy oat milk 📅 2026-01-20 ^{}\n", id));
    }

    #[tokio::test]
    async fn multiline_descriptions_keep_the_task_on_one_line() {
        let id = TaskId::assign();
        let note = format!("- [ ] Buy milk ^{}\n- [ ] Call mom\n", id);
        let (dir, mut vault) = vault_with(&[("daily.md", note.as_str())]);
        let task = vault.list_tasks().await.unwrap().remove(0);

        let fields = TaskFields { description: "Buy milk\nand eggs\r\n".to_string(), due_date: None, completed: false };
        vault.apply_remote_fields(&task, &fields).await.unwrap();

        let content = fs::read_to_string(dir.path().join("daily.md")).unwrap();
        assert_eq!(content, format!("- [ ] Buy milk and eggs ^{}\n- [ ] Call mom\n", id));
        let tasks = vault.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].identifier(), Some(&id));
        assert_eq!(tasks[0].description(), "Buy milk and eggs");

        let blank = TaskFields { description: " \n ".to_string(), due_date: None, completed: false };
        assert!(vault.apply_remote_fields(&tasks[0], &blank).await.is_err());
    }

    #[tokio::test]
    async fn pulled_lines_keep_their_bullet_and_local_tokens() {
        let id = TaskId::assign();
        let note = format!("  * [ ] Pay rent ⏫ ⏳ 2026-01-25 📅 2026-02-01 ^{}\n", id);
        let (dir, mut vault) = vault_with(&[("daily.md", note.as_str())]);
        let task = vault.list_tasks().await.unwrap().remove(0);
        assert_eq!(task.description(), "Pay rent");

        let fields = TaskFields { description: "Pay the rent".to_string(), due_date: NaiveDate::from_ymd_opt(2026, 2, 3), completed: false };
        vault.apply_remote_fields(&task, &fields).await.unwrap();

        let content = fs::read_to_string(dir.path().join("daily.md")).unwrap();
        assert_eq!(content, format!("  * [ ] Pay the rent ⏫ ⏳ 2026-01-25 📅 2026-02-03 ^{}\n", id));
    }
}
