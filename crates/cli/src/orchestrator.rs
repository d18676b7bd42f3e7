use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cmdsync_canonical::{diff_documents, format_function, parse_document, FunctionTranscript};
use cmdsync_source_scan::rewrite_functions;
use tempfile::TempDir;

use crate::generate::{FunctionGenerator, SpliceGenerator};

/// Diff the two canonical documents and rewrite the changed functions of
/// `script`. Returns the number of functions replaced.
///
/// All edits happen on a copy inside a private temporary workspace; the real
/// script is only overwritten after every rewrite went through, so a failing
/// run never leaves it half-edited. Debug artifacts (the mapping file and one
/// before/after block pair per changed function) go to a `revert` directory
/// next to the script, where they outlive the run.
pub fn write_back(
    script: &Path,
    old_commands: &Path,
    new_commands: &Path,
    mapping: Option<&Path>,
) -> Result<usize> {
    let old_text = fs::read_to_string(old_commands)
        .with_context(|| format!("reading {}", old_commands.display()))?;
    let new_text = fs::read_to_string(new_commands)
        .with_context(|| format!("reading {}", new_commands.display()))?;
    let old_doc = parse_document(&old_text);
    let new_doc = parse_document(&new_text);

    let diff = diff_documents(&old_doc, &new_doc);
    if diff.is_empty() {
        return Ok(0);
    }
    log::info!("{} function(s) differ: {}", diff.len(), diff.join(", "));

    let workspace = TempDir::new().context("creating workspace")?;
    log::debug!("workspace at {}", workspace.path().display());

    let revert_dir = revert_dir_for(script);
    fs::create_dir_all(&revert_dir)
        .with_context(|| format!("creating {}", revert_dir.display()))?;
    log::debug!("debug artifacts in {}", revert_dir.display());

    let file_name = script
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("script.py"));
    let work_script = workspace.path().join(file_name);
    fs::copy(script, &work_script)
        .with_context(|| format!("copying {} into the workspace", script.display()))?;
    if let Some(mapping) = mapping.filter(|m| m.is_file()) {
        fs::copy(mapping, revert_dir.join("mapping.json"))
            .with_context(|| format!("copying {}", mapping.display()))?;
    }

    let source = fs::read_to_string(&work_script)?;
    let generator = SpliceGenerator::from_script(&source);

    let empty = FunctionTranscript::default();
    let mut replacements = Vec::new();
    for function in &diff {
        let old_fn = old_doc.get(function).unwrap_or(&empty);
        let new_fn = new_doc.get(function).unwrap_or(&empty);

        fs::write(
            revert_dir.join(format!("{function}_before_modification.md")),
            format_function(function, old_fn),
        )?;
        fs::write(
            revert_dir.join(format!("{function}_after_modification.md")),
            format_function(function, new_fn),
        )?;

        if !new_doc.contains(function) {
            log::warn!("{function} absent from the new document, leaving its source as is");
            continue;
        }
        let text = generator.generate(function, old_fn, new_fn)?;
        replacements.push((function.clone(), text));
    }

    let updated = rewrite_functions(&work_script, &replacements)?;
    if updated > 0 {
        fs::copy(&work_script, script)
            .with_context(|| format!("writing {} back", script.display()))?;
    }
    Ok(updated)
}

fn revert_dir_for(script: &Path) -> PathBuf {
    match script.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("revert"),
        _ => PathBuf::from("revert"),
    }
}
