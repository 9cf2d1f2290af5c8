//! A module to build brand new iCal entries

use chrono::{DateTime, Utc};
use ics::properties::{Due, LastModified, Status, Summary};
use ics::components::Parameter;
use ics::{ICalendar, ToDo};

use crate::ical::{escape_text, format_date, format_timestamp};
use crate::task::TaskFields;

/// Create a minimal VTODO entry.
///
/// This is only used for entries that do not exist on the server yet (or, as a logged fallback, to replace an entry that cannot be rewritten).
pub fn build_new(uid: &str, fields: &TaskFields, prod_id: &str, now: &DateTime<Utc>) -> String {
    let s_now = format_timestamp(now);

    let mut todo = ToDo::new(uid.to_string(), s_now.clone());
    todo.push(LastModified::new(s_now));
    todo.push(Summary::new(escape_text(&fields.description)));

    let status = if fields.completed { Status::completed() } else { Status::needs_action() };
    todo.push(status);

    if let Some(due_date) = &fields.due_date {
        let mut due = Due::new(format_date(due_date));
        due.add(Parameter::new("VALUE", "DATE"));
        todo.push(due);
    }

    let mut calendar = ICalendar::new("2.0", prod_id.to_string());
    calendar.add_todo(todo);

    calendar.to_string()
}
