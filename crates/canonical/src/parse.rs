use crate::format::{DEVICE_MARKER, FUNC_MARKER};
use crate::types::{CanonicalDocument, CommandRecord};

/// Deserialize canonical text back into a document.
///
/// The parser is deliberately lenient: a command line before any device
/// line, or a device line before any function line, is logged and skipped,
/// never fatal. Decoration (failure markers, annotations, descriptions) is
/// not recognized specially; such lines come back as plain command text,
/// which is why round-tripping is only guaranteed for undecorated documents.
#[must_use]
pub fn parse_document(text: &str) -> CanonicalDocument {
    let mut doc = CanonicalDocument::new();
    let mut current_func: Option<String> = None;
    let mut current_device: Option<String> = None;

    for (line_no, line) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let stripped = line.trim();

        if let Some(rest) = stripped.strip_prefix(FUNC_MARKER) {
            let name = rest.trim();
            if name.is_empty() {
                log::warn!("line {line_no}: empty function name, skipping marker");
                continue;
            }
            doc.entry(name);
            current_func = Some(name.to_string());
            current_device = None;
            continue;
        }

        if let Some(rest) = stripped.strip_prefix(DEVICE_MARKER) {
            let Some(func) = &current_func else {
                log::warn!("line {line_no}: device line before any function, skipping");
                continue;
            };
            let device = rest.trim();
            if device.is_empty() {
                log::warn!("line {line_no}: empty device name, skipping marker");
                continue;
            }
            // Open the block eagerly so empty device sections survive.
            doc.entry(func)
                .blocks
                .push(crate::types::DeviceBlock::new(Some(device.to_string())));
            current_device = Some(device.to_string());
            continue;
        }

        if stripped.is_empty() {
            continue;
        }

        let (Some(func), Some(device)) = (&current_func, &current_device) else {
            log::warn!("line {line_no}: command without an enclosing device, skipping: {stripped}");
            continue;
        };
        let record = CommandRecord::bare(func.clone(), device.clone(), stripped);
        doc.entry(func)
            .blocks
            .last_mut()
            .expect("device block opened before commands")
            .records
            .push(record);
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format_document;
    use crate::types::CommandRecord;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_functions_devices_and_commands() {
        let text = "\
!!!func setup
!!device DUT1
system-view
quit
!!device DUT2
display version
!!!func test_step_1
!!device DUT1
display ip routing
";
        let doc = parse_document(text);
        let names: Vec<&str> = doc.function_names().collect();
        assert_eq!(names, vec!["setup", "test_step_1"]);

        let setup = doc.get("setup").unwrap();
        assert_eq!(setup.blocks.len(), 2);
        assert_eq!(setup.blocks[0].joined_commands(), "system-view\nquit");
        assert_eq!(setup.blocks[1].device_name.as_deref(), Some("DUT2"));
    }

    #[test]
    fn skips_orphan_lines_without_aborting() {
        let text = "\
display version
!!device DUT9
!!!func setup
<decoration line>
!!device DUT1
quit
";
        let doc = parse_document(text);
        assert_eq!(doc.len(), 1);
        let setup = doc.get("setup").unwrap();
        // The decoration line had no device yet and is dropped.
        assert_eq!(setup.blocks.len(), 1);
        assert_eq!(setup.blocks[0].joined_commands(), "quit");
    }

    #[test]
    fn round_trips_undecorated_documents() {
        let mut doc = CanonicalDocument::new();
        let transcript = doc.entry("setup");
        transcript.push_record(CommandRecord::bare("setup", "DUT1", "system-view"));
        transcript.push_record(CommandRecord::bare("setup", "DUT1", "quit"));
        transcript.push_record(CommandRecord::bare("setup", "DUT2", "display version"));
        let step = doc.entry("test_step_1");
        step.push_record(CommandRecord::bare("test_step_1", "DUT1", "display ip routing"));

        let reparsed = parse_document(&format_document(&doc));
        assert_eq!(reparsed, doc);
    }
}
