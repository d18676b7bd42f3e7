use crate::types::{CanonicalDocument, FunctionTranscript};

/// Names of functions whose transcript differs between two documents.
///
/// Comparison is structural per function: the ordered list of
/// (device name, joined command text) pairs. A function present in only one
/// document is compared against an empty transcript and therefore differs
/// unless it is itself empty. Output preserves the old document's key order,
/// then appends new-only keys.
#[must_use]
pub fn diff_documents(old: &CanonicalDocument, new: &CanonicalDocument) -> Vec<String> {
    let mut names: Vec<&str> = old.function_names().collect();
    for name in new.function_names() {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let empty = FunctionTranscript::default();
    let mut diff = Vec::new();
    for name in names {
        let before = old.get(name).unwrap_or(&empty);
        let after = new.get(name).unwrap_or(&empty);
        if block_signature(before) != block_signature(after) {
            diff.push(name.to_string());
        }
    }
    diff
}

fn block_signature(transcript: &FunctionTranscript) -> Vec<(Option<&str>, String)> {
    transcript
        .blocks
        .iter()
        .map(|b| (b.device_name.as_deref(), b.joined_commands()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format_document;
    use crate::parse::parse_document;
    use crate::types::CommandRecord;
    use pretty_assertions::assert_eq;

    fn doc(layout: &[(&str, &[(&str, &[&str])])]) -> CanonicalDocument {
        let mut doc = CanonicalDocument::new();
        for (func, blocks) in layout {
            let transcript = doc.entry(func);
            for (device, commands) in *blocks {
                for command in *commands {
                    transcript.push_record(CommandRecord::bare(*func, *device, *command));
                }
            }
        }
        doc
    }

    #[test]
    fn identical_documents_have_no_diff() {
        let a = doc(&[
            ("setup", &[("DUT1", &["system-view", "quit"])]),
            ("step_1", &[("DUT1", &["display version"])]),
        ]);
        assert!(diff_documents(&a, &a.clone()).is_empty());
    }

    #[test]
    fn extra_command_line_flags_only_that_function() {
        let old = doc(&[
            ("setup", &[("DUT1", &["system-view"])]),
            ("step_1", &[("DUT1", &["display version"])]),
            ("step_2", &[("DUT1", &["display ip routing"])]),
        ]);
        let new = doc(&[
            ("setup", &[("DUT1", &["system-view"])]),
            ("step_1", &[("DUT1", &["display version"])]),
            ("step_2", &[("DUT1", &["display ip routing", "display fib"])]),
        ]);
        assert_eq!(diff_documents(&old, &new), vec!["step_2".to_string()]);
    }

    #[test]
    fn device_change_is_a_diff() {
        let old = doc(&[("step_1", &[("DUT1", &["display version"])])]);
        let new = doc(&[("step_1", &[("DUT2", &["display version"])])]);
        assert_eq!(diff_documents(&old, &new), vec!["step_1".to_string()]);
    }

    #[test]
    fn one_sided_functions_count_and_order_is_old_then_new() {
        let old = doc(&[
            ("setup", &[("DUT1", &["a"])]),
            ("step_1", &[("DUT1", &["b"])]),
        ]);
        let new = doc(&[
            ("step_1", &[("DUT1", &["changed"])]),
            ("step_9", &[("DUT1", &["c"])]),
        ]);
        assert_eq!(
            diff_documents(&old, &new),
            vec!["setup".to_string(), "step_1".to_string(), "step_9".to_string()]
        );
    }

    #[test]
    fn format_parse_cycle_yields_empty_diff() {
        let d = doc(&[
            ("setup", &[("DUT1", &["system-view", "quit"]), ("DUT2", &["quit"])]),
            ("teardown", &[("DUT1", &["undo bgp 100"])]),
        ]);
        let reparsed = parse_document(&format_document(&d));
        assert!(diff_documents(&d, &reparsed).is_empty());
    }
}
