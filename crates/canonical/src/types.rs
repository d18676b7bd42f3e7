use serde::{Deserialize, Serialize};

/// Whether a command was plainly sent or sent-and-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Send,
    Check,
}

/// Aggregate outcome reported by the execution framework for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecResult {
    Pass,
    Fail,
    Warning,
    Unknown,
}

impl ExecResult {
    /// Map a framework result label onto an outcome. The log schema drifts
    /// across framework versions, so anything unrecognized is `Unknown`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "PASS" => Self::Pass,
            "FAIL" => Self::Fail,
            "WARNING" => Self::Warning,
            _ => Self::Unknown,
        }
    }

    /// True for outcomes rendered with the failure marker.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Warning)
    }
}

/// Expectation polarity of a `CheckCommand` assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectKind {
    Include,
    Exclude,
}

/// One `expect`/`not_expect` entry attached to a check command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub kind: ExpectKind,
    pub content: String,
}

impl Expectation {
    pub fn include(content: impl Into<String>) -> Self {
        Self {
            kind: ExpectKind::Include,
            content: content.into(),
        }
    }

    pub fn exclude(content: impl Into<String>) -> Self {
        Self {
            kind: ExpectKind::Exclude,
            content: content.into(),
        }
    }
}

/// One device command (or check) plus its outcome and expectations.
///
/// `device_name` is `None` only for synthetic phase/step-level failure
/// records, where `raw_transcript` carries the error text instead of a
/// command echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub function_name: String,
    pub device_name: Option<String>,
    pub kind: CommandKind,
    pub command_text: String,
    #[serde(default)]
    pub layer_path: Vec<i64>,
    #[serde(default)]
    pub expectations: Vec<Expectation>,
    pub exec_result: ExecResult,
    #[serde(default)]
    pub raw_transcript: Option<String>,
}

impl CommandRecord {
    /// A bare command record with no outcome information yet, as produced by
    /// the canonical-text parser and the source scanner.
    pub fn bare(function: impl Into<String>, device: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            function_name: function.into(),
            device_name: Some(device.into()),
            kind: CommandKind::Send,
            command_text: command.into(),
            layer_path: Vec::new(),
            expectations: Vec::new(),
            exec_result: ExecResult::Unknown,
            raw_transcript: None,
        }
    }

    /// Synthetic failure record for a phase/step-level `Error_occurred`.
    pub fn synthetic_failure(function: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            function_name: function.into(),
            device_name: None,
            kind: CommandKind::Send,
            command_text: String::new(),
            layer_path: Vec::new(),
            expectations: Vec::new(),
            exec_result: ExecResult::Fail,
            raw_transcript: Some(error.into()),
        }
    }

    /// True for the synthetic phase/step-level failure shape.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        self.device_name.is_none()
    }
}

/// A maximal run of consecutive records against one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBlock {
    pub device_name: Option<String>,
    pub records: Vec<CommandRecord>,
}

impl DeviceBlock {
    #[must_use]
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            records: Vec::new(),
        }
    }

    /// The block's command text joined by newlines. This is the payload the
    /// diff engine compares; decoration never leaks into it.
    #[must_use]
    pub fn joined_commands(&self) -> String {
        let lines: Vec<&str> = self
            .records
            .iter()
            .map(|r| r.command_text.as_str())
            .collect();
        lines.join("\n")
    }
}

/// Ordered device blocks for one script function.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionTranscript {
    /// Phase/step description from the log, rendered as decoration only.
    #[serde(default)]
    pub description: Option<String>,
    pub blocks: Vec<DeviceBlock>,
}

impl FunctionTranscript {
    /// Append a record, opening a new device block when the device changes.
    /// Device blocks never interleave two devices.
    pub fn push_record(&mut self, record: CommandRecord) {
        let same_device = self
            .blocks
            .last()
            .is_some_and(|b| b.device_name == record.device_name);
        if !same_device {
            self.blocks.push(DeviceBlock::new(record.device_name.clone()));
        }
        self.blocks
            .last_mut()
            .expect("block pushed above")
            .records
            .push(record);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Full function → transcript mapping for one script version.
///
/// Key order is semantic (it drives diff output and formatting), so the map
/// is a plain insertion-ordered vector; documents hold a handful of
/// functions and linear lookup is fine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanonicalDocument {
    entries: Vec<(String, FunctionTranscript)>,
}

impl CanonicalDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, function: &str) -> Option<&FunctionTranscript> {
        self.entries
            .iter()
            .find(|(name, _)| name == function)
            .map(|(_, t)| t)
    }

    #[must_use]
    pub fn contains(&self, function: &str) -> bool {
        self.get(function).is_some()
    }

    /// Mutable access to a function's transcript, inserted empty on first use.
    pub fn entry(&mut self, function: &str) -> &mut FunctionTranscript {
        if let Some(idx) = self.entries.iter().position(|(name, _)| name == function) {
            return &mut self.entries[idx].1;
        }
        self.entries
            .push((function.to_string(), FunctionTranscript::default()));
        &mut self.entries.last_mut().expect("entry pushed above").1
    }

    pub fn insert(&mut self, function: impl Into<String>, transcript: FunctionTranscript) {
        let function = function.into();
        if let Some(idx) = self.entries.iter().position(|(name, _)| *name == function) {
            self.entries[idx].1 = transcript;
        } else {
            self.entries.push((function, transcript));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FunctionTranscript)> {
        self.entries.iter().map(|(name, t)| (name.as_str(), t))
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}
