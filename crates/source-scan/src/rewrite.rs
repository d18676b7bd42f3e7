use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::locate::indent_span;

/// Replace whole functions in `script`, one at a time.
///
/// Each replacement re-reads the file, locates the function by indentation
/// and splices the new text over its span, so earlier replacements cannot
/// shift a later function's lines out from under us. Functions not found in
/// the file are logged and skipped. Returns the number of functions
/// actually replaced.
pub fn rewrite_functions(script: &Path, replacements: &[(String, String)]) -> Result<usize> {
    let mut updated = 0;

    for (function, new_text) in replacements {
        let source = fs::read_to_string(script)?;
        let Some(span) = indent_span(&source, function) else {
            log::warn!(
                "function {function} not found in {}, skipping",
                script.display()
            );
            continue;
        };

        let lines: Vec<String> = source
            .lines()
            .map(|line| line.replace('\t', "    "))
            .collect();

        let mut new_lines: Vec<&str> = new_text.lines().collect();
        while new_lines.last().is_some_and(|line| line.trim().is_empty()) {
            new_lines.pop();
        }

        let mut output = Vec::with_capacity(lines.len());
        output.extend(lines[..span.start_line - 1].iter().map(String::as_str));
        output.extend(new_lines);
        output.extend(lines[span.end_line..].iter().map(String::as_str));

        let mut text = output.join("\n");
        text.push('\n');
        fs::write(script, text)?;
        updated += 1;
        log::debug!("replaced {function} in {}", script.display());
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCRIPT: &str = "\
class TestClass:
    def setup(cls):
        gl.DUT1.send('system-view')

    def test_step_1_vlan(self):
        gl.DUT1.send('vlan 10')

    def teardown(cls):
        gl.DUT1.send('quit')
";

    fn temp_script(content: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), content).unwrap();
        file
    }

    #[test]
    fn rewrites_only_the_named_function() {
        let file = temp_script(SCRIPT);
        let replacement = (
            "test_step_1_vlan".to_string(),
            "    def test_step_1_vlan(self):\n        gl.DUT1.send('vlan 20')\n".to_string(),
        );
        let updated = rewrite_functions(file.path(), &[replacement]).unwrap();
        assert_eq!(updated, 1);

        let result = fs::read_to_string(file.path()).unwrap();
        assert!(result.contains("vlan 20"));
        assert!(!result.contains("vlan 10"));
        // Neighbours are untouched.
        assert!(result.contains("gl.DUT1.send('system-view')"));
        assert!(result.contains("def teardown(cls):"));
    }

    #[test]
    fn missing_function_is_skipped_not_fatal() {
        let file = temp_script(SCRIPT);
        let replacements = vec![
            ("no_such_func".to_string(), "def no_such_func():\n    pass\n".to_string()),
            (
                "teardown".to_string(),
                "    def teardown(cls):\n        gl.DUT1.send('return')\n".to_string(),
            ),
        ];
        let updated = rewrite_functions(file.path(), &replacements).unwrap();
        assert_eq!(updated, 1);

        let result = fs::read_to_string(file.path()).unwrap();
        assert!(result.contains("gl.DUT1.send('return')"));
        assert!(!result.contains("gl.DUT1.send('quit')"));
    }

    #[test]
    fn consecutive_rewrites_do_not_shift_each_other() {
        let file = temp_script(SCRIPT);
        let replacements = vec![
            (
                "setup".to_string(),
                "    def setup(cls):\n        gl.DUT1.send('sysname lab')\n        gl.DUT1.send('quit')\n".to_string(),
            ),
            (
                "teardown".to_string(),
                "    def teardown(cls):\n        gl.DUT2.send('reboot')\n".to_string(),
            ),
        ];
        let updated = rewrite_functions(file.path(), &replacements).unwrap();
        assert_eq!(updated, 2);

        let result = fs::read_to_string(file.path()).unwrap();
        assert!(result.contains("sysname lab"));
        assert!(result.contains("reboot"));
        assert!(result.contains("gl.DUT1.send('vlan 10')"));
    }
}
