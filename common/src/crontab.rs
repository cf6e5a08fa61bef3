// Crontab data model and parser.
//
// Parses system-crontab streams: comment and blank lines, NAME=VALUE
// environment assignments that accumulate onto later job lines, macro
// lines (`@daily user command`), and five-field positional lines
// (`* * * * * user command`). A malformed line is warned about and
// skipped; it never aborts the stream.

use crate::errors::CrontabError;
use crate::expression::CronExpression;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{BufRead, BufReader, Read};
use tracing::warn;

lazy_static! {
    static ref ENV_LINE: Regex =
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*)$").expect("static regex");
}

/// One schedule-to-command binding from a crontab source.
#[derive(Debug, Clone, PartialEq)]
pub struct CrontabEntry {
    /// Cron time specification: five positional fields or a macro.
    pub spec: String,
    /// Target user identity; `None` runs as the invoking process.
    pub user: Option<String>,
    /// Shell command line, executed verbatim via `sh -c`.
    pub command: String,
    /// `NAME=VALUE` assignments accumulated above this line, in order.
    pub env: Vec<String>,
}

impl CrontabEntry {
    pub fn new(spec: impl Into<String>, user: Option<String>, command: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            user,
            command: command.into(),
            env: Vec::new(),
        }
    }

    /// One-line description used by the logging callbacks.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("spec:'{}'", self.spec)];
        if let Some(user) = &self.user {
            parts.push(format!("usr:{}", user));
        }
        parts.push(format!("cmd:'{}'", self.command));
        if !self.env.is_empty() {
            parts.push(format!("env:'{}'", self.env.join(" ")));
        }
        parts.join(" ")
    }
}

/// Parser over one crontab stream.
pub struct CrontabParser<R: Read> {
    reader: BufReader<R>,
    /// Source name for warnings, e.g. the file path.
    source: String,
}

impl<R: Read> CrontabParser<R> {
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            source: source.into(),
        }
    }

    /// Parse the whole stream into entries. Lines that cannot be parsed,
    /// including those whose time spec is rejected by the expression
    /// engine, are skipped with a warning.
    pub fn parse(self) -> Result<Vec<CrontabEntry>, CrontabError> {
        let source = self.source;
        let mut entries = Vec::new();
        // Ordered NAME=VALUE list; reassignment of a NAME overrides in place.
        let mut env: Vec<(String, String)> = Vec::new();

        for (index, line) in self.reader.lines().enumerate() {
            let line = line?;
            let line_no = index + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(captures) = ENV_LINE.captures(trimmed) {
                let name = captures[1].to_string();
                let value = captures[2].to_string();
                match env.iter_mut().find(|(n, _)| *n == name) {
                    Some(slot) => slot.1 = value,
                    None => env.push((name, value)),
                }
                continue;
            }

            match parse_job_line(trimmed) {
                Some(mut entry) => {
                    if let Err(e) = CronExpression::parse(&entry.spec) {
                        warn!(
                            source = %source,
                            line = line_no,
                            error = %e,
                            "Skipping crontab line with invalid time spec"
                        );
                        continue;
                    }
                    entry.env = env
                        .iter()
                        .map(|(n, v)| format!("{}={}", n, v))
                        .collect();
                    entries.push(entry);
                }
                None => {
                    warn!(
                        source = %source,
                        line = line_no,
                        content = %trimmed,
                        "Skipping malformed crontab line"
                    );
                }
            }
        }

        Ok(entries)
    }
}

/// Split one job line into (spec, user, command). Returns `None` when the
/// line has too few tokens. The command keeps its internal whitespace.
fn parse_job_line(line: &str) -> Option<CrontabEntry> {
    // Number of leading whitespace-separated tokens forming the spec:
    // one for most macros, two for `@every <duration>`, five positional
    // fields otherwise.
    let spec_tokens = if line.starts_with("@every") {
        2
    } else if line.starts_with('@') {
        1
    } else {
        5
    };

    let mut rest = line;
    let mut spec_parts = Vec::with_capacity(spec_tokens);
    for _ in 0..spec_tokens {
        let (token, remainder) = next_token(rest)?;
        spec_parts.push(token);
        rest = remainder;
    }
    let (user, remainder) = next_token(rest)?;
    let command = remainder.trim_start();
    if command.is_empty() {
        return None;
    }

    Some(CrontabEntry::new(
        spec_parts.join(" "),
        Some(user.to_string()),
        command,
    ))
}

fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(end) => Some((&input[..end], &input[end..])),
        None => Some((input, "")),
    }
}
