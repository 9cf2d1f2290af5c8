//! A module to read the synced values out of a remote entry

use std::error::Error;

use chrono::{DateTime, Utc};
use ical::parser::ical::component::{IcalCalendar, IcalTodo};

use crate::ical::{parse_date, parse_timestamp, unescape_text};
use crate::task::TaskFields;

/// The values of a remote VTODO this crate cares about
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteTodo {
    pub uid: String,
    pub fields: TaskFields,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Parse an iCal entry into a [`RemoteTodo`]
pub fn read_remote(content: &str) -> Result<RemoteTodo, Box<dyn Error + Send + Sync>> {
    let mut reader = ical::IcalParser::new(content.as_bytes());
    let parsed_item = match reader.next() {
        None => return Err("Invalid iCal data to parse".into()),
        Some(item) => match item {
            Err(err) => return Err(format!("Unable to parse iCal data: {}", err).into()),
            Ok(item) => item,
        }
    };

    let todo = assert_single_todo(&parsed_item)?;

    let mut uid = None;
    let mut summary = None;
    let mut completed = false;
    let mut due_date = None;
    let mut last_modified = None;
    for prop in &todo.properties {
        let value = match &prop.value {
            None => continue,
            Some(value) => value.trim_end_matches(&['\r', '\n'][..]),
        };
        match prop.name.to_ascii_uppercase().as_str() {
            "UID" => uid = Some(value.trim().to_string()),
            "SUMMARY" => summary = Some(unescape_text(value)),
            "STATUS" => completed = value.trim().eq_ignore_ascii_case("COMPLETED"),
            "DUE" => due_date = parse_date(value),
            "LAST-MODIFIED" => last_modified = parse_timestamp(value),
            _ => {},
        }
    }

    let uid = match uid {
        Some(uid) => uid,
        None => return Err("Missing UID".into()),
    };

    Ok(RemoteTodo {
        uid,
        fields: TaskFields {
            description: summary.unwrap_or_default(),
            due_date,
            completed,
        },
        last_modified,
    })
}

fn assert_single_todo(item: &IcalCalendar) -> Result<&IcalTodo, Box<dyn Error + Send + Sync>> {
    if item.todos.len() == 1 && item.events.is_empty() && item.journals.is_empty() {
        Ok(&item.todos[0])
    } else {
        Err("Only a single TODO is supported".into())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    const EXAMPLE_ICAL: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//Nextcloud Tasks v0.13.6\r
BEGIN:VTODO\r
UID:0633de27-8c32-42be-bcb8-63bc879c6185\r
CREATED:20210321T001600\r
LAST-MODIFIED:20210321T001600Z\r
DTSTAMP:20210321T001600\r
SUMMARY:Do not forget to do this\\, really\r
DUE;VALUE=DATE:20210401\r
STATUS:COMPLETED\r
END:VTODO\r
END:VCALENDAR\r
";

    const EXAMPLE_EVENT: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
UID:event\r
SUMMARY:Meeting\r
END:VEVENT\r
END:VCALENDAR\r
";

    #[test]
    fn test_ical_parsing() {
        let todo = read_remote(EXAMPLE_ICAL).unwrap();

        assert_eq!(todo.uid, "0633de27-8c32-42be-bcb8-63bc879c6185");
        assert_eq!(todo.fields.description, "Do not forget to do this, really");
        assert_eq!(todo.fields.due_date, NaiveDate::from_ymd_opt(2021, 4, 1));
        assert_eq!(todo.fields.completed, true);
        assert_eq!(todo.last_modified, Some(Utc.with_ymd_and_hms(2021, 3, 21, 0, 16, 0).unwrap()));
    }

    #[test]
    fn test_events_are_rejected() {
        assert!(read_remote(EXAMPLE_EVENT).is_err());
    }
}
