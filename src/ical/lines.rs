//! A structural view of iCal text: an ordered sequence of content lines.
//!
//! Each line keeps its original bytes, so that properties this crate does not manage can be written back verbatim.

/// Maximum length of a content line, in octets, before it must be folded
const FOLD_AT: usize = 75;

/// A content line (`NAME[;PARAM=VALUE]*:VALUE`), possibly folded over several physical lines
#[derive(Clone, Debug, PartialEq)]
pub struct ContentLine {
    /// Physical lines as found in the source, without line terminators
    raw: Vec<String>,
    /// Upper-cased property name
    name: String,
    /// Parameters, as written (without the leading `;`)
    params: String,
    /// Unfolded value, still escaped
    value: String,
}

impl ContentLine {
    /// Build a fresh line, folded if needed
    pub fn new(name: &str, params: &str, value: &str) -> Self {
        let logical = if params.is_empty() {
            format!("{}:{}", name, value)
        } else {
            format!("{};{}:{}", name, params, value)
        };
        Self {
            raw: fold(&logical),
            name: name.to_ascii_uppercase(),
            params: params.to_string(),
            value: value.to_string(),
        }
    }

    fn from_physical(raw: Vec<String>) -> Self {
        let mut logical = String::new();
        for (i, physical) in raw.iter().enumerate() {
            if i == 0 {
                logical.push_str(physical);
            } else {
                // Drop the single whitespace that marks a continuation
                let mut chars = physical.chars();
                chars.next();
                logical.push_str(chars.as_str());
            }
        }
        let (name, params, value) = split_logical(&logical);
        Self { raw, name, params, value }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn params(&self) -> &str { &self.params }
    pub fn value(&self) -> &str { &self.value }

    /// `BEGIN:<component>` lines
    pub fn begins(&self) -> Option<&str> {
        if self.name == "BEGIN" { Some(self.value.trim()) } else { None }
    }

    /// `END:<component>` lines
    pub fn ends(&self) -> Option<&str> {
        if self.name == "END" { Some(self.value.trim()) } else { None }
    }

    fn write_to(&self, out: &mut String) {
        for physical in &self.raw {
            out.push_str(physical);
            out.push_str("\r\n");
        }
    }
}

/// Split an unfolded line into its name, parameters and value.
/// Colons and semicolons inside double-quoted parameter values do not count as separators.
fn split_logical(logical: &str) -> (String, String, String) {
    let mut in_quotes = false;
    let mut params_start = None;
    for (i, c) in logical.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if in_quotes == false && params_start.is_none() => params_start = Some(i),
            ':' if in_quotes == false => {
                let (name, params) = match params_start {
                    None => (&logical[..i], ""),
                    Some(p) => (&logical[..p], &logical[p + 1..i]),
                };
                return (name.trim().to_ascii_uppercase(), params.to_string(), logical[i + 1..].to_string());
            },
            _ => {},
        }
    }
    // No value at all. This is not a valid property, but we keep it as an opaque line
    (logical.trim().to_ascii_uppercase(), String::new(), String::new())
}

/// Fold a logical line into physical lines of at most 75 octets, without splitting UTF-8 characters
fn fold(logical: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut limit = FOLD_AT;
    for c in logical.chars() {
        if current.len() + c.len_utf8() > limit {
            lines.push(std::mem::take(&mut current));
            current.push(' ');
            limit = FOLD_AT;
        }
        current.push(c);
    }
    lines.push(current);
    lines
}

/// An iCal document, as an ordered list of content lines
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    lines: Vec<ContentLine>,
}

impl Document {
    /// Split a text (CRLF or LF line endings) into content lines. Blank lines are dropped.
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut current: Vec<String> = Vec::new();

        for physical in text.split('\n') {
            let physical = physical.strip_suffix('\r').unwrap_or(physical);
            if physical.is_empty() {
                continue;
            }
            let is_continuation = physical.starts_with(' ') || physical.starts_with('\t');
            if is_continuation && current.is_empty() == false {
                current.push(physical.to_string());
                continue;
            }
            if current.is_empty() == false {
                lines.push(ContentLine::from_physical(std::mem::take(&mut current)));
            }
            current.push(physical.to_string());
        }
        if current.is_empty() == false {
            lines.push(ContentLine::from_physical(current));
        }

        Self { lines }
    }

    pub fn from_lines(lines: Vec<ContentLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[ContentLine] {
        &self.lines
    }

    /// Serialize, with CRLF line endings
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            line.write_to(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_names_params_values() {
        let doc = Document::parse("DUE;VALUE=DATE:20260120\nX-APPLE-LOC;X-TITLE=\"a:b;c\":geo:1,2\nSUMMARY:a: b\n");
        let lines = doc.lines();
        assert_eq!(lines[0].name(), "DUE");
        assert_eq!(lines[0].params(), "VALUE=DATE");
        assert_eq!(lines[0].value(), "20260120");
        assert_eq!(lines[1].name(), "X-APPLE-LOC");
        assert_eq!(lines[1].params(), "X-TITLE=\"a:b;c\"");
        assert_eq!(lines[1].value(), "geo:1,2");
        assert_eq!(lines[2].value(), "a: b");
    }

    #[test]
    fn folded_lines_are_kept_verbatim() {
        let text = "BEGIN:VTODO\r\nDESCRIPTION:This is a lo\r\n ng description\r\nEND:VTODO\r\n";
        let doc = Document::parse(text);
        assert_eq!(doc.lines().len(), 3);
        assert_eq!(doc.lines()[1].value(), "This is a long description");
        assert_eq!(doc.to_text(), text);
    }

    #[test]
    fn lf_input_is_written_with_crlf() {
        let doc = Document::parse("BEGIN:VTODO\nUID:1\nEND:VTODO\n");
        assert_eq!(doc.to_text(), "BEGIN:VTODO\r\nUID:1\r\nEND:VTODO\r\n");
    }

    #[test]
    fn new_lines_are_folded() {
        let value = "é".repeat(60);
        let line = ContentLine::new("SUMMARY", "", &value);
        let mut out = String::new();
        line.write_to(&mut out);
        for physical in out.split("\r\n").filter(|l| l.is_empty() == false) {
            assert!(physical.len() <= FOLD_AT);
        }
        let reparsed = Document::parse(&out);
        assert_eq!(reparsed.lines().len(), 1);
        assert_eq!(reparsed.lines()[0].value(), value);
    }
}
