//! Rewrite the managed properties of an existing entry

use chrono::{DateTime, Utc};

use crate::ical::lines::{ContentLine, Document};
use crate::ical::{escape_text, format_date, format_timestamp, CodecError, ManagedFields};
use crate::task::TaskFields;

const TODO: &str = "VTODO";

/// Rewrite the managed properties of `existing` with the desired values.
///
/// Each managed property replaces its first occurrence in the VTODO, or is inserted just before `END:VTODO`.
/// A `DUE` line is removed when there is no due date. `DTSTAMP` and `LAST-MODIFIED` are set to `now`.
/// Every other line is copied verbatim, in its original order.
///
/// The result is validated before being returned.
pub fn apply_update(existing: &str, fields: &TaskFields, now: &DateTime<Utc>) -> Result<String, CodecError> {
    let doc = Document::parse(existing);
    let desired = desired_lines(fields, now);

    let mut output = Vec::with_capacity(doc.lines().len() + desired.len());
    let mut written = ManagedFields::empty();
    let mut stack: Vec<String> = Vec::new();
    let mut found_todo = false;

    for line in doc.lines() {
        if let Some(component) = line.begins() {
            stack.push(component.to_ascii_uppercase());
            if is_todo(&stack) {
                found_todo = true;
            }
            output.push(line.clone());
            continue;
        }

        if let Some(component) = line.ends() {
            if is_todo(&stack) && component.eq_ignore_ascii_case(TODO) {
                // Insert whatever was not present in the original entry
                for (field, new_line) in &desired {
                    if written.contains(*field) == false {
                        if let Some(new_line) = new_line {
                            output.push(new_line.clone());
                        }
                        written.insert(*field);
                    }
                }
            }
            if stack.pop().map(|c| c.eq_ignore_ascii_case(component)) != Some(true) {
                return Err(CodecError::Unbalanced(component.to_string()));
            }
            output.push(line.clone());
            continue;
        }

        if is_todo(&stack) {
            if let Some(field) = ManagedFields::from_name(line.name()) {
                if written.contains(field) == false {
                    written.insert(field);
                    if let Some(new_line) = desired_line(&desired, field) {
                        output.push(new_line.clone());
                    }
                    continue;
                }
            }
        }

        output.push(line.clone());
    }

    if found_todo == false {
        return Err(CodecError::MissingMarker("BEGIN:VTODO"));
    }
    if let Some(unclosed) = stack.pop() {
        return Err(CodecError::Unbalanced(unclosed));
    }

    let text = Document::from_lines(output).to_text();
    validate(&text)?;
    Ok(text)
}

/// Check the structure of an entry: a single VTODO with both markers, exactly one UID, SUMMARY and STATUS, and at most one DUE
pub fn validate(text: &str) -> Result<(), CodecError> {
    let doc = Document::parse(text);
    let mut stack: Vec<String> = Vec::new();
    let mut n_todos = 0;
    let mut n_closed_todos = 0;
    let (mut uid, mut summary, mut status, mut due) = (0, 0, 0, 0);

    for line in doc.lines() {
        if let Some(component) = line.begins() {
            stack.push(component.to_ascii_uppercase());
            if is_todo(&stack) {
                n_todos += 1;
            }
            continue;
        }
        if let Some(component) = line.ends() {
            if is_todo(&stack) && component.eq_ignore_ascii_case(TODO) {
                n_closed_todos += 1;
            }
            if stack.pop().map(|c| c.eq_ignore_ascii_case(component)) != Some(true) {
                return Err(CodecError::Unbalanced(component.to_string()));
            }
            continue;
        }
        if is_todo(&stack) {
            match line.name() {
                "UID" => uid += 1,
                "SUMMARY" => summary += 1,
                "STATUS" => status += 1,
                "DUE" => due += 1,
                _ => {},
            }
        }
    }

    if n_todos == 0 {
        return Err(CodecError::MissingMarker("BEGIN:VTODO"));
    }
    if n_closed_todos == 0 {
        return Err(CodecError::MissingMarker("END:VTODO"));
    }
    if let Some(unclosed) = stack.pop() {
        return Err(CodecError::Unbalanced(unclosed));
    }
    if n_todos != 1 {
        return Err(CodecError::TodoCount(n_todos));
    }
    check_count("UID", "exactly one", uid, |n| n == 1)?;
    check_count("SUMMARY", "exactly one", summary, |n| n == 1)?;
    check_count("STATUS", "exactly one", status, |n| n == 1)?;
    check_count("DUE", "at most one", due, |n| n <= 1)?;
    Ok(())
}

fn check_count(name: &'static str, expected: &'static str, found: usize, ok: fn(usize) -> bool) -> Result<(), CodecError> {
    if ok(found) {
        Ok(())
    } else {
        Err(CodecError::PropertyCount { name, expected, found })
    }
}

/// Whether the innermost open component is the VTODO (and not e.g. one of its VALARMs)
fn is_todo(stack: &[String]) -> bool {
    stack.last().map(|c| c == TODO).unwrap_or(false)
}

/// The lines to write, in insertion order. `None` means "this property must not exist"
fn desired_lines(fields: &TaskFields, now: &DateTime<Utc>) -> Vec<(ManagedFields, Option<ContentLine>)> {
    let status = if fields.completed { "COMPLETED" } else { "NEEDS-ACTION" };
    let stamp = format_timestamp(now);
    vec![
        (ManagedFields::SUMMARY, Some(ContentLine::new("SUMMARY", "", &escape_text(&fields.description)))),
        (ManagedFields::STATUS, Some(ContentLine::new("STATUS", "", status))),
        (ManagedFields::DUE, fields.due_date.map(|due| ContentLine::new("DUE", "VALUE=DATE", &format_date(&due)))),
        (ManagedFields::DTSTAMP, Some(ContentLine::new("DTSTAMP", "", &stamp))),
        (ManagedFields::LAST_MODIFIED, Some(ContentLine::new("LAST-MODIFIED", "", &stamp))),
    ]
}

fn desired_line(desired: &[(ManagedFields, Option<ContentLine>)], field: ManagedFields) -> Option<&ContentLine> {
    desired.iter()
        .find(|(f, _)| *f == field)
        .and_then(|(_, line)| line.as_ref())
}
