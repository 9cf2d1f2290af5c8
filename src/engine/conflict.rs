//! Last-write-wins conflict policy

use chrono::{DateTime, Utc};

/// Which side of a task pair must be written through
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing changed since the last sync
    Unchanged,
    /// Local values overwrite the remote entry
    LocalWins,
    /// Remote values overwrite the local task
    RemoteWins,
}

/// Decide what to do with a mapped task.
///
/// When only one side changed since the last sync, that side wins. When both changed, the most recent
/// modification wins, and ties favor the local side. An unknown remote modification time counts as older.
pub fn resolve(
    local_changed: bool,
    remote_changed: bool,
    local_modified: &DateTime<Utc>,
    remote_modified: Option<&DateTime<Utc>>,
) -> Resolution {
    match (local_changed, remote_changed) {
        (false, false) => Resolution::Unchanged,
        (true, false) => Resolution::LocalWins,
        (false, true) => Resolution::RemoteWins,
        (true, true) => match remote_modified {
            Some(remote_modified) if remote_modified > local_modified => Resolution::RemoteWins,
            _ => Resolution::LocalWins,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn one_sided_changes() {
        let now = Utc::now();
        assert_eq!(resolve(false, false, &now, None), Resolution::Unchanged);
        assert_eq!(resolve(true, false, &now, Some(&(now + Duration::hours(1)))), Resolution::LocalWins);
        assert_eq!(resolve(false, true, &(now + Duration::hours(1)), Some(&now)), Resolution::RemoteWins);
    }

    #[test]
    fn most_recent_change_wins() {
        let now = Utc::now();
        let later = now + Duration::minutes(5);
        assert_eq!(resolve(true, true, &now, Some(&later)), Resolution::RemoteWins);
        assert_eq!(resolve(true, true, &later, Some(&now)), Resolution::LocalWins);
    }

    #[test]
    fn ties_favor_local() {
        let now = Utc::now();
        assert_eq!(resolve(true, true, &now, Some(&now)), Resolution::LocalWins);
        assert_eq!(resolve(true, true, &now, None), Resolution::LocalWins);
    }
}
