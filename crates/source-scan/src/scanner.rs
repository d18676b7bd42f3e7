use std::collections::HashMap;

use cmdsync_canonical::{CanonicalDocument, CommandKind, CommandRecord, Expectation};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::locate::syntax_spans;

/// Candidate call sites: `<root>.<device>.send(` / `<root>.<device>.CheckCommand(`.
/// The regex only finds the opening; the argument extent comes from the
/// balanced scan below, which strings would defeat.
static CALL_SITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\w+)\.(\w+)\.(send|CheckCommand)\s*\(").expect("valid call pattern"));

/// `cmd=` argument forms of a CheckCommand, tried in order: triple-quoted
/// f-string, triple-quoted plain, single-line f-string, single-line plain,
/// dotted attribute reference, bare identifier.
static CMD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?s)cmd\s*=\s*f['"]{3}(.*?)['"]{3}"#,
        r#"(?s)cmd\s*=\s*['"]{3}(.*?)['"]{3}"#,
        r#"cmd\s*=\s*f['"]([^'"]*?)['"]"#,
        r#"cmd\s*=\s*['"]([^'"]*?)['"]"#,
        r#"cmd\s*=\s*([A-Za-z_]\w*(?:\.\w+)+)"#,
        r#"cmd\s*=\s*([A-Za-z_]\w*)"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid cmd pattern"))
    .collect()
});

// `_` is a word character, so `\bexpect` cannot match inside `not_expect`.
static EXPECT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bexpect\s*=\s*\[").expect("valid expect pattern"));
static NOT_EXPECT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bnot_expect\s*=\s*\[").expect("valid not_expect pattern"));

/// One recovered call site, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub device: String,
    pub kind: CommandKind,
    /// Non-blank command lines of a `send`; the single `cmd` of a check.
    pub commands: Vec<String>,
    /// `expect`/`not_expect` entries of a check call; empty for sends.
    pub expectations: Vec<Expectation>,
    /// Full matched call text, `<root>.<device>.<method>(...)`.
    pub text: String,
}

/// Scan source text for device command call sites.
///
/// An unbalanced call (opening paren never closed outside a string) is
/// skipped with a warning and the scan resumes one character past its start.
#[must_use]
pub fn scan_calls(source: &str) -> Vec<CallSite> {
    let bytes = source.as_bytes();
    let mut calls = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let Some(caps) = CALL_SITE.captures(&source[pos..]) else {
            break;
        };
        let Some(whole) = caps.get(0) else { break };
        let start = pos + whole.start();
        let open_end = pos + whole.end();
        let device = caps[2].to_string();
        let method = &caps[3];

        let Some(end) = balanced_call_end(bytes, open_end) else {
            log::warn!("unbalanced {method} call at byte {start}, resuming after it");
            pos = start + 1;
            continue;
        };
        let text = &source[start..end];

        match method {
            "send" => {
                let content = send_argument(text);
                let commands: Vec<String> = content
                    .split('\n')
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                if !commands.is_empty() {
                    calls.push(CallSite {
                        device,
                        kind: CommandKind::Send,
                        commands,
                        expectations: Vec::new(),
                        text: text.to_string(),
                    });
                }
            }
            _ => {
                if let Some(cmd) = check_cmd_argument(text) {
                    calls.push(CallSite {
                        device,
                        kind: CommandKind::Check,
                        commands: vec![cmd],
                        expectations: check_expectations(text),
                        text: text.to_string(),
                    });
                }
            }
        }
        pos = end;
    }
    calls
}

/// Index of `cmd` text → full `CheckCommand(...)` snippet for every check
/// call site, used to carry a call's full argument list through a rewrite.
#[must_use]
pub fn check_call_index(source: &str) -> HashMap<String, String> {
    let mut index = HashMap::new();
    for call in scan_calls(source) {
        if call.kind != CommandKind::Check {
            continue;
        }
        let Some(cmd) = call.commands.first() else {
            continue;
        };
        if let Some(offset) = call.text.find("CheckCommand") {
            index.insert(cmd.clone(), call.text[offset..].to_string());
        }
    }
    index
}

/// Scan a whole script into a canonical document: one entry per function
/// found by the syntax locator, call sites grouped into device blocks in
/// source order. Functions without call sites get an empty transcript.
pub fn scan_document(source: &str) -> Result<CanonicalDocument> {
    let spans = syntax_spans(source)?;
    let lines: Vec<&str> = source.lines().collect();
    let mut doc = CanonicalDocument::new();

    for span in spans {
        let body = lines
            .get(span.start_line - 1..span.end_line)
            .unwrap_or_default()
            .join("\n");
        let transcript = doc.entry(&span.name);
        for call in scan_calls(&body) {
            for command in &call.commands {
                let mut record = CommandRecord::bare(&span.name, &call.device, command);
                record.kind = call.kind;
                record.expectations = call.expectations.clone();
                transcript.push_record(record);
            }
        }
    }
    Ok(doc)
}

/// Find the close of an already-open paren group, ignoring parens inside
/// single-, double- and triple-quoted strings and skipping backslash escapes.
/// Returns the byte index one past the closing paren. All state characters
/// are ASCII, so a byte cursor is safe in UTF-8 text.
fn balanced_call_end(bytes: &[u8], mut pos: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut string_char: Option<u8> = None;
    let mut triple = false;

    while pos < bytes.len() {
        let b = bytes[pos];
        if b == b'\\' && pos + 1 < bytes.len() {
            pos += 2;
            continue;
        }
        match string_char {
            None => match b {
                b'\'' | b'"' => {
                    if bytes[pos..].starts_with(&[b, b, b]) {
                        triple = true;
                        pos += 2;
                    }
                    string_char = Some(b);
                }
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(pos + 1);
                    }
                }
                _ => {}
            },
            Some(q) if b == q => {
                if triple {
                    if bytes[pos..].starts_with(&[q, q, q]) {
                        string_char = None;
                        triple = false;
                        pos += 2;
                    }
                } else {
                    string_char = None;
                }
            }
            Some(_) => {}
        }
        pos += 1;
    }
    None
}

/// Strip the argument of a `send(...)` call down to its command text.
/// Quote styles tried in order: triple f-string, triple plain, single-line
/// f-string, single-line plain; anything else passes through as-is.
fn send_argument(call: &str) -> String {
    let open = call.find('(').map_or(0, |i| i + 1);
    let close = call.rfind(')').unwrap_or(call.len());
    let params = call[open..close].trim();

    let stripped = if let Some(rest) = strip_quoted(params, &["f'''", "f\"\"\""], &["'''", "\"\"\""])
    {
        rest
    } else if let Some(rest) = strip_quoted(params, &["'''", "\"\"\""], &["'''", "\"\"\""]) {
        rest
    } else if let Some(rest) = strip_quoted(params, &["f'", "f\""], &["'", "\""]) {
        rest
    } else if let Some(rest) = strip_quoted(params, &["'", "\""], &["'", "\""]) {
        rest
    } else {
        params
    };
    stripped.trim().to_string()
}

/// Remove one of `prefixes` and, when present, one of `suffixes`; an
/// unterminated string keeps its tail.
fn strip_quoted<'a>(s: &'a str, prefixes: &[&str], suffixes: &[&str]) -> Option<&'a str> {
    for prefix in prefixes {
        if let Some(rest) = s.strip_prefix(prefix) {
            for suffix in suffixes {
                if let Some(inner) = rest.strip_suffix(suffix) {
                    return Some(inner);
                }
            }
            return Some(rest);
        }
    }
    None
}

/// `expect=[..]` / `not_expect=[..]` string lists of a check call, scanned
/// with the same quote-aware cursor as everything else here.
fn check_expectations(call: &str) -> Vec<Expectation> {
    let mut out = Vec::new();
    for content in bracket_list(call, &EXPECT_KEY) {
        out.push(Expectation::include(content));
    }
    for content in bracket_list(call, &NOT_EXPECT_KEY) {
        out.push(Expectation::exclude(content));
    }
    out
}

fn bracket_list(call: &str, key: &Regex) -> Vec<String> {
    let Some(m) = key.find(call) else {
        return Vec::new();
    };
    let list = &call[m.end()..];
    let Some(end) = list_end(list) else {
        return Vec::new();
    };
    quoted_strings(&list[..end])
}

fn list_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(q) => {
                if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                ']' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

fn quoted_strings(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut buf = String::new();
    for c in s.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    buf.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    out.push(std::mem::take(&mut buf));
                    quote = None;
                } else {
                    buf.push(c);
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
            }
        }
    }
    out
}

fn check_cmd_argument(call: &str) -> Option<String> {
    let open = call.find('(').map_or(0, |i| i + 1);
    let close = call.rfind(')').unwrap_or(call.len());
    let params = &call[open..close];

    for pattern in CMD_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(params) {
            return Some(caps[1].trim().to_string());
        }
    }
    None
}
