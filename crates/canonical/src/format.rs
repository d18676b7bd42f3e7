use crate::types::{CanonicalDocument, ExpectKind, FunctionTranscript};

/// Opens a function section.
pub const FUNC_MARKER: &str = "!!!func ";
/// Opens a device block inside a function section.
pub const DEVICE_MARKER: &str = "!!device ";
/// Prefix for commands (or whole phases) that failed or warned.
pub const FAILURE_PREFIX: &str = "command failed: ";

/// Serialize a whole document to canonical text, function sections in
/// document order.
#[must_use]
pub fn format_document(doc: &CanonicalDocument) -> String {
    let mut out = String::new();
    for (name, transcript) in doc.iter() {
        out.push_str(&format_function(name, transcript));
    }
    out
}

/// Serialize one function section.
///
/// Decoration rules: a failed/warning command renders with [`FAILURE_PREFIX`]
/// instead of bare text; `ctrl+z` renders as `return`; expectations append an
/// annotation line after the command; a synthetic failure block (no device)
/// renders its error text behind the failure prefix with no device line.
#[must_use]
pub fn format_function(name: &str, transcript: &FunctionTranscript) -> String {
    let mut out = String::new();
    out.push_str(FUNC_MARKER);
    out.push_str(name);
    out.push('\n');

    if let Some(desc) = &transcript.description {
        out.push('<');
        out.push_str(desc);
        out.push_str(">\n");
    }

    for block in &transcript.blocks {
        let Some(device) = &block.device_name else {
            for record in &block.records {
                let error = record
                    .raw_transcript
                    .as_deref()
                    .unwrap_or(record.command_text.as_str());
                out.push_str(FAILURE_PREFIX);
                out.push_str(error);
                out.push('\n');
            }
            continue;
        };

        out.push_str(DEVICE_MARKER);
        out.push_str(device);
        out.push('\n');

        for record in &block.records {
            let command = if record.command_text == "ctrl+z" {
                "return"
            } else {
                record.command_text.as_str()
            };
            if record.exec_result.is_failure() {
                out.push_str(FAILURE_PREFIX);
            }
            out.push_str(command);
            out.push('\n');

            if let Some(annotation) = expectation_annotation(record) {
                out.push_str(&annotation);
                out.push('\n');
            }
        }
    }

    out
}

fn expectation_annotation(record: &crate::types::CommandRecord) -> Option<String> {
    if record.expectations.is_empty() {
        return None;
    }

    let mut include = String::new();
    let mut exclude = String::new();
    for expectation in &record.expectations {
        let (buf, label) = match expectation.kind {
            ExpectKind::Include => (&mut include, "expect:"),
            ExpectKind::Exclude => (&mut exclude, "not-expect:"),
        };
        if buf.is_empty() {
            buf.push_str(label);
        } else {
            buf.push(',');
        }
        buf.push_str(&expectation.content);
    }

    let joined = match (include.is_empty(), exclude.is_empty()) {
        (false, true) => include,
        (true, false) => exclude,
        (false, false) => format!("{include},{exclude}"),
        (true, true) => return None,
    };
    Some(format!("({joined})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommandRecord, ExecResult, Expectation, FunctionTranscript};
    use pretty_assertions::assert_eq;

    fn record(cmd: &str, result: ExecResult) -> CommandRecord {
        let mut r = CommandRecord::bare("setup", "DUT1", cmd);
        r.exec_result = result;
        r
    }

    #[test]
    fn formats_devices_and_failure_markers() {
        let mut transcript = FunctionTranscript::default();
        transcript.push_record(record("system-view", ExecResult::Pass));
        transcript.push_record(record("bad command", ExecResult::Fail));
        transcript.push_record(record("ctrl+z", ExecResult::Pass));

        let text = format_function("setup", &transcript);
        assert_eq!(
            text,
            "!!!func setup\n!!device DUT1\nsystem-view\ncommand failed: bad command\nreturn\n"
        );
    }

    #[test]
    fn formats_expectation_annotations() {
        let mut rec = record("display ip routing", ExecResult::Pass);
        rec.kind = crate::types::CommandKind::Check;
        rec.expectations.push(Expectation::include("Direct"));
        rec.expectations.push(Expectation::include("Static"));
        rec.expectations.push(Expectation::exclude("Down"));
        let mut transcript = FunctionTranscript::default();
        transcript.push_record(rec);

        let text = format_function("test_step_1", &transcript);
        assert!(text.contains("display ip routing\n(expect:Direct,Static,not-expect:Down)\n"));
    }

    #[test]
    fn formats_synthetic_failure_without_device_line() {
        let mut transcript = FunctionTranscript::default();
        transcript.push_record(CommandRecord::synthetic_failure("setup", "topology mapping lost"));

        let text = format_function("setup", &transcript);
        assert_eq!(text, "!!!func setup\ncommand failed: topology mapping lost\n");
    }

    #[test]
    fn formats_description_decoration() {
        let transcript = FunctionTranscript {
            description: Some("initial BGP configuration".to_string()),
            blocks: Vec::new(),
        };
        let text = format_function("setup", &transcript);
        assert_eq!(text, "!!!func setup\n<initial BGP configuration>\n");
    }
}
