use std::collections::HashMap;

use anyhow::Result;
use cmdsync_canonical::FunctionTranscript;
use cmdsync_source_scan::check_call_index;

/// Produces replacement source for one function whose commands changed.
///
/// `old` and `new` are the function's canonical transcripts on either side of
/// the edit. Implementations may consult both; an external collaborator could
/// derive a minimal edit, while [`SpliceGenerator`] regenerates the body from
/// `new` alone.
pub trait FunctionGenerator {
    fn generate(
        &self,
        function: &str,
        old: &FunctionTranscript,
        new: &FunctionTranscript,
    ) -> Result<String>;
}

/// Default generator: splice the new command blocks into source text.
///
/// Commands starting `dis` become `CheckCommand` calls, reusing the full
/// call snippet from the target script when the command matches a known
/// check call site and a fill-in skeleton otherwise. Every other run of
/// commands becomes one triple-quoted `send` block per device.
pub struct SpliceGenerator {
    check_calls: HashMap<String, String>,
}

impl SpliceGenerator {
    /// Harvest the check-call snippets of the script being rewritten.
    #[must_use]
    pub fn from_script(source: &str) -> Self {
        Self {
            check_calls: check_call_index(source),
        }
    }
}

impl FunctionGenerator for SpliceGenerator {
    fn generate(
        &self,
        function: &str,
        _old: &FunctionTranscript,
        new: &FunctionTranscript,
    ) -> Result<String> {
        let mut lines = Vec::new();
        if function.contains("setup") || function.contains("teardown") {
            lines.push(format!("    def {function}(cls):"));
        } else {
            lines.push(format!("    def {function}(self):"));
        }

        for block in &new.blocks {
            // Synthetic failure blocks describe the run, not the script.
            let Some(device) = &block.device_name else {
                continue;
            };

            let mut send_open = false;
            for record in &block.records {
                let cmd = record.command_text.trim();
                if cmd.is_empty() {
                    continue;
                }
                if cmd.starts_with("dis") {
                    if send_open {
                        lines.push("          ''')".to_string());
                        send_open = false;
                    }
                    if let Some(snippet) = self.check_calls.get(cmd) {
                        lines.push(format!("        gl.{device}.{snippet}"));
                    } else {
                        lines.push(format!("        gl.{device}.CheckCommand('',"));
                        lines.push(format!("                             cmd=f'{cmd}'"));
                        lines.push("                             relationship = ".to_string());
                        lines.push("                             starts = ".to_string());
                        lines.push("                             stop_max_attempt = ".to_string());
                        lines.push("                             wait_fixed = ".to_string());
                        lines.push("                             )".to_string());
                    }
                } else {
                    if !send_open {
                        lines.push(format!("        gl.{device}.send(f'''"));
                        send_open = true;
                    }
                    lines.push(format!("          {cmd}"));
                }
            }
            if send_open {
                lines.push("          ''')".to_string());
            }
        }

        Ok(lines.join("\n"))
    }
}
