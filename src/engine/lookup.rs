//! Secondary lookup of remote entries for tasks that have no mapping yet

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::config::ContentMatch;
use crate::remote::RemoteEntry;
use crate::task::Task;

/// Finds the remote counterpart of an unmapped task, if one already exists on the server.
///
/// A remote entry is handed out at most once per cycle, and never if a mapping already points to it.
pub struct SecondaryLookup {
    strategy: ContentMatch,
    /// Remote UIDs that already belong to a task
    claimed: HashSet<String>,
    /// Unclaimed remote UIDs, by (summary, due date)
    by_content: HashMap<(String, Option<NaiveDate>), Vec<String>>,
}

impl SecondaryLookup {
    pub fn new<'a, I>(strategy: ContentMatch, index: &HashMap<String, RemoteEntry>, mapped_uids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let claimed: HashSet<String> = mapped_uids.into_iter().map(String::from).collect();

        let mut by_content: HashMap<_, Vec<String>> = HashMap::new();
        if strategy == ContentMatch::UidThenSummary {
            for (uid, entry) in index {
                if claimed.contains(uid) {
                    continue;
                }
                match crate::ical::read_remote(&entry.raw_text) {
                    Err(err) => log::debug!("Remote entry {} cannot be used for content matching: {}", uid, err),
                    Ok(todo) => {
                        let key = (todo.fields.description, todo.fields.due_date);
                        by_content.entry(key).or_default().push(uid.clone());
                    },
                }
            }
        }

        Self { strategy, claimed, by_content }
    }

    /// Mark a remote UID as used
    pub fn claim(&mut self, uid: &str) {
        self.claimed.insert(uid.to_string());
    }

    pub fn find<'a>(&mut self, task: &Task, index: &'a HashMap<String, RemoteEntry>) -> Option<&'a RemoteEntry> {
        if self.strategy == ContentMatch::Disabled {
            return None;
        }

        if let Some(id) = task.identifier() {
            if let Some(entry) = index.get(id.as_str()) {
                if self.claimed.contains(&entry.uid) == false {
                    self.claim(&entry.uid);
                    return Some(entry);
                }
            }
        }

        if self.strategy == ContentMatch::UidThenSummary {
            let key = (task.description().to_string(), task.due_date());
            if let Some(candidates) = self.by_content.get_mut(&key) {
                while let Some(uid) = candidates.pop() {
                    if self.claimed.contains(&uid) {
                        continue;
                    }
                    if let Some(entry) = index.get(&uid) {
                        self.claimed.insert(uid);
                        return Some(entry);
                    }
                }
            }
        }

        None
    }
}
