//! `ATTLOG` body parsing.
//!
//! Each non-empty line is one punch:
//!
//! ```text
//! <subject>\t<time>[\t<check_type>\t<verify_type>\t<work_code>...]
//! ```
//!
//! Fields are tab separated, or whitespace separated when the line has no
//! tab. A time split across fields (`2026-01-10 08:00:00`) or carrying an
//! `AM`/`PM` marker shifts the remaining fields to the right.

use attsync_core::PushLine;
use chrono::NaiveDateTime;

const FORMATS_24H: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const FORMATS_12H: &[&str] = &[
    "%Y-%m-%d %I:%M:%S %p",
    "%Y/%m/%d %I:%M:%S %p",
    "%d/%m/%Y %I:%M:%S %p",
];

fn is_clock(field: &str) -> bool {
    field.contains(':') && field.chars().all(|c| c.is_ascii_digit() || c == ':')
}

fn is_meridiem(field: &str) -> bool {
    field.eq_ignore_ascii_case("AM") || field.eq_ignore_ascii_case("PM")
}

/// Parses one attendance line for device `serial`.
pub fn parse_attlog_line(line: &str, serial: &str) -> Option<PushLine> {
    let line = line.trim();
    let fields: Vec<&str> = if line.contains('\t') {
        line.split('\t').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    };
    if fields.len() < 2 || fields[0].is_empty() {
        return None;
    }

    let mut stamp = fields[1].to_string();
    let mut next = 2;
    if fields.get(next).is_some_and(|f| is_clock(f)) && !stamp.contains(':') {
        stamp.push(' ');
        stamp.push_str(fields[next]);
        next += 1;
    }
    let twelve_hour = fields.get(next).is_some_and(|f| is_meridiem(f));
    if twelve_hour {
        stamp.push(' ');
        stamp.push_str(&fields[next].to_ascii_uppercase());
        next += 1;
    }

    let formats = if twelve_hour { FORMATS_12H } else { FORMATS_24H };
    let time = formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&stamp, fmt).ok())?;

    let field = |i: usize| fields.get(next + i).map(|f| f.to_string()).unwrap_or_default();

    Some(PushLine {
        serial: serial.to_string(),
        subject_id: fields[0].to_string(),
        time,
        check_type: field(0),
        verify_type: field(1),
        work_code: field(2),
        raw: line.to_string(),
    })
}

/// Parses a whole body. Returns the parsed lines and how many non-empty
/// lines were skipped.
pub fn parse_attlog(body: &str, serial: &str) -> (Vec<PushLine>, usize) {
    let mut parsed = Vec::new();
    let mut skipped = 0;

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_attlog_line(line, serial) {
            Some(record) => parsed.push(record),
            None => {
                skipped += 1;
                tracing::warn!(serial, line, "unparsable attendance line");
            }
        }
    }

    (parsed, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_separated_line() {
        let line = parse_attlog_line("100\t2026-01-10 08:00:00\t1\t15\t0\t0", "CQZ7").unwrap();
        assert_eq!(line.subject_id, "100");
        assert_eq!(line.time.to_string(), "2026-01-10 08:00:00");
        assert_eq!(line.check_type, "1");
        assert_eq!(line.verify_type, "15");
        assert_eq!(line.work_code, "0");
        assert_eq!(line.serial, "CQZ7");
    }

    #[test]
    fn minimal_line_has_empty_codes() {
        let line = parse_attlog_line("101\t2026-01-10 08:00:05", "CQZ7").unwrap();
        assert_eq!(line.check_type, "");
        assert_eq!(line.verify_type, "");
    }

    #[test]
    fn space_separated_time_is_rejoined() {
        let line = parse_attlog_line("7 2026/01/10 17:45:00 0 1", "X").unwrap();
        assert_eq!(line.time.to_string(), "2026-01-10 17:45:00");
        assert_eq!(line.check_type, "0");
        assert_eq!(line.verify_type, "1");
    }

    #[test]
    fn twelve_hour_shifts_fields() {
        let line = parse_attlog_line("7\t10/01/2026 05:45:00\tpm\t1\t15\t3", "X").unwrap();
        assert_eq!(line.time.to_string(), "2026-01-10 17:45:00");
        assert_eq!(line.check_type, "1");
        assert_eq!(line.verify_type, "15");
        assert_eq!(line.work_code, "3");

        let spaced = parse_attlog_line("7 10/01/2026 05:45:00 AM 0", "X").unwrap();
        assert_eq!(spaced.time.to_string(), "2026-01-10 05:45:00");
        assert_eq!(spaced.check_type, "0");
    }

    #[test]
    fn bad_lines_are_counted() {
        let body = "100\t2026-01-10 08:00:00\n\nnonsense\n101\tyesterday\n102 2026-01-10T09:00:00\n";
        let (parsed, skipped) = parse_attlog(body, "X");
        assert_eq!(parsed.len(), 2);
        assert_eq!(skipped, 2);
        assert_eq!(parsed[1].subject_id, "102");
    }
}
