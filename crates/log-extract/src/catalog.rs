use std::collections::HashMap;
use std::fs;
use std::path::Path;

use cmdsync_canonical::format_document;
use walkdir::WalkDir;

use crate::decode::decode_tree;
use crate::error::{ExtractError, Result};
use crate::walker::{self, extract_document, script_name};

const LOG_SUFFIX: &str = ".pytestlog.json";

/// Script-name → canonical-command-text index over a directory of execution
/// logs. Logs whose script name is `setup` or `teardown` are fixture logs
/// and merge into a single `conftest.py` entry.
#[derive(Debug, Default)]
pub struct CommandCatalog {
    entries: HashMap<String, String>,
}

impl CommandCatalog {
    /// Build the catalog by walking `log_dir` for `*.pytestlog.json` files.
    /// Individual unreadable or unparsable logs are skipped with a warning;
    /// only a missing directory is an error.
    pub fn refresh(log_dir: &Path) -> Result<Self> {
        if !log_dir.is_dir() {
            return Err(ExtractError::NotADirectory(log_dir.to_path_buf()));
        }

        let mut entries = HashMap::new();
        let mut setup_root = None;
        let mut teardown_root = None;

        for entry in WalkDir::new(log_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file()
                || !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(LOG_SUFFIX))
            {
                continue;
            }

            let mut root = match fs::read_to_string(path).map_err(ExtractError::from).and_then(
                |text| serde_json::from_str(&text).map_err(ExtractError::from),
            ) {
                Ok(root) => root,
                Err(err) => {
                    log::warn!("skipping unreadable log {}: {err}", path.display());
                    continue;
                }
            };
            decode_tree(&mut root);

            let name = script_name(&root).unwrap_or_else(|| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.trim_end_matches(LOG_SUFFIX))
                    .unwrap_or_default()
                    .to_string()
            });

            match name.as_str() {
                "setup" => setup_root = Some(root),
                "teardown" => teardown_root = Some(root),
                "" => log::warn!("log {} has no script name, skipping", path.display()),
                _ => {
                    let document = extract_document(&root);
                    entries.insert(name, format_document(&document));
                }
            }
        }

        if setup_root.is_some() || teardown_root.is_some() {
            let conftest = walker::conftest_document(setup_root.as_ref(), teardown_root.as_ref());
            if !conftest.is_empty() {
                entries.insert("conftest.py".to_string(), format_document(&conftest));
            }
        }

        log::info!("command catalog holds {} script(s)", entries.len());
        Ok(Self { entries })
    }

    /// Canonical command text for a script, by exact name, extension-blind
    /// name, or prefix similarity as a last resort. A fuzzy hit needs at
    /// least three matching characters.
    #[must_use]
    pub fn lookup(&self, script: &str) -> Option<&str> {
        if script.is_empty() {
            return None;
        }
        if let Some(text) = self.entries.get(script) {
            return Some(text);
        }

        let wanted = stem(script);
        for (key, text) in &self.entries {
            if stem(key) == wanted {
                return Some(text);
            }
        }

        let wanted = wanted.to_lowercase();
        let mut best: Option<(&str, f64)> = None;
        for key in self.entries.keys() {
            let core = stem(key).to_lowercase();
            let score = if core.starts_with(&wanted) {
                wanted.len() as f64
            } else if wanted.starts_with(&core) {
                core.len() as f64
            } else if wanted.contains(&core) || core.contains(&wanted) {
                // Mid-string overlap counts for half.
                wanted.len().max(core.len()) as f64 * 0.5
            } else {
                continue;
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((key, score));
            }
        }

        match best {
            Some((key, score)) if score >= 3.0 => {
                log::debug!("fuzzy catalog match: {script} -> {key} (score {score})");
                self.entries.get(key).map(String::as_str)
            }
            _ => {
                log::debug!("no catalog entry for {script}");
                None
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn scripts(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, text)| (name.as_str(), text.as_str()))
    }
}

fn stem(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    fn catalog_with(entries: &[(&str, &str)]) -> CommandCatalog {
        CommandCatalog {
            entries: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn lookup_prefers_exact_then_stem_then_fuzzy() {
        let catalog = catalog_with(&[
            ("test_bgp_addpath.py", "exact"),
            ("test_ospf_area", "stemmed"),
        ]);
        assert_eq!(catalog.lookup("test_bgp_addpath.py"), Some("exact"));
        assert_eq!(catalog.lookup("test_ospf_area.py"), Some("stemmed"));
        assert_eq!(catalog.lookup("test_bgp.py"), Some("exact"));
        assert_eq!(catalog.lookup("xy"), None);
        assert_eq!(catalog.lookup(""), None);
    }

    #[test]
    fn short_fuzzy_overlap_is_rejected() {
        let catalog = catalog_with(&[("test_case.py", "text")]);
        assert_eq!(catalog.lookup("tes.py"), Some("text"));
        assert_eq!(catalog.lookup("te.py"), None);
    }

    #[test]
    fn refresh_rejects_non_directory() {
        let err = CommandCatalog::refresh(Path::new("/no/such/dir")).unwrap_err();
        assert!(matches!(err, ExtractError::NotADirectory(_)));
    }

    #[test]
    fn refresh_indexes_logs_and_merges_fixtures() {
        let dir = tempfile::tempdir().unwrap();

        let case_log = json!({
            "Title": ["run", "test_vlan.py"],
            "case": {
                "steps": [{
                    "Title": ["steps", "test_step_1_vlan: create vlan"],
                    "stepLists": [{
                        "Title": ["x", "METHOD send (DUT1)"],
                        "layer": "class_layer=1 layer1=1",
                        "Parameter": "args: ('vlan 10',),{}",
                        "Result": "PASS",
                    }],
                }],
            },
        });
        let setup_log = json!({
            "Title": ["run", "setup"],
            "send_base": {
                "send_1": {
                    "Title": ["x", "send (DUT1)"],
                    "Parameter": "args: ('sysname lab',),{}",
                    "Result": "PASS",
                },
            },
        });

        for (name, value) in [("a.pytestlog.json", &case_log), ("b.pytestlog.json", &setup_log)] {
            let mut file = fs::File::create(dir.path().join(name)).unwrap();
            write!(file, "{value}").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = CommandCatalog::refresh(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);

        let case = catalog.lookup("test_vlan.py").unwrap();
        assert!(case.contains("!!!func test_step_1_vlan"));
        assert!(case.contains("vlan 10"));

        let conftest = catalog.lookup("conftest.py").unwrap();
        assert!(conftest.contains("!!!func setup"));
        assert!(conftest.contains("sysname lab"));
    }
}
