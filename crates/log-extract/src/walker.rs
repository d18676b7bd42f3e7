use std::collections::HashMap;

use cmdsync_canonical::{
    CanonicalDocument, CommandKind, CommandRecord, ExecResult, Expectation,
};
use serde_json::Value;

/// One `send`/`CheckCommand` call (or synthetic failure) lifted out of the
/// log tree before arrangement into device blocks.
#[derive(Debug, Clone)]
struct RawCall {
    function: String,
    step_seq: Option<usize>,
    kind: CommandKind,
    layer_path: Vec<i64>,
    device: Option<String>,
    commands: Vec<String>,
    transcript: Option<String>,
    result: ExecResult,
    expectations: Vec<Expectation>,
    failure: Option<FailureKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    /// Whole phase or step failed (`Error_occurred` beside `stepLists`);
    /// sorts to the end of its phase.
    Function,
    /// A single CheckCommand failed at check level; keeps its position.
    Check,
}

impl RawCall {
    fn failure(function: &str, error: &Value, kind: FailureKind, step_seq: Option<usize>) -> Self {
        Self {
            function: function.to_string(),
            step_seq,
            kind: CommandKind::Send,
            layer_path: Vec::new(),
            device: None,
            commands: Vec::new(),
            transcript: Some(value_text(error)),
            result: ExecResult::Fail,
            expectations: Vec::new(),
            failure: Some(kind),
        }
    }
}

/// Script name carried in the log's top-level `Title` array (last element).
#[must_use]
pub fn script_name(root: &Value) -> Option<String> {
    let title = root.as_object()?.get("Title")?.as_array()?;
    title.last()?.as_str().map(str::to_string)
}

/// Walk one decoded log tree into a canonical document: setup block,
/// teardown block, then `step_1..step_N` buckets in position order.
#[must_use]
pub fn extract_document(root: &Value) -> CanonicalDocument {
    let calls = collect_calls(root);
    let descriptions = function_descriptions(root);
    arrange(&calls, &descriptions)
}

/// Canonical document for the shared `conftest.py` fixtures, built from the
/// dedicated `setup`/`teardown` logs. Those logs are flat: the root object
/// keys fixture actions directly instead of nesting them under a case node.
#[must_use]
pub(crate) fn conftest_document(
    setup: Option<&Value>,
    teardown: Option<&Value>,
) -> CanonicalDocument {
    let mut calls = Vec::new();
    if let Some(root) = setup {
        calls.extend(conftest_phase_calls(root, "setup"));
    }
    if let Some(root) = teardown {
        calls.extend(conftest_phase_calls(root, "teardown"));
    }

    let mut doc = CanonicalDocument::new();
    append_group(&mut doc, phase_ordered(&calls, "setup"), None);
    append_group(&mut doc, phase_ordered(&calls, "teardown"), None);
    doc
}

fn conftest_phase_calls(root: &Value, function: &str) -> Vec<RawCall> {
    let Value::Object(map) = root else {
        log::debug!("{function} fixture log root is not an object, skipping");
        return Vec::new();
    };

    let mut out = Vec::new();
    for (key, value) in map {
        match function {
            "setup" => {
                if ["create_interface", "atf_retry", "send", "CheckCommand"]
                    .iter()
                    .any(|action| key.contains(action))
                {
                    out.extend(conftest_style_calls(value, function));
                } else if key.contains("Error_occurred") {
                    out.push(RawCall::failure(function, value, FailureKind::Function, None));
                }
            }
            _ => {
                if key.contains("send") {
                    out.extend(send_call(value, function));
                } else if key.contains("delete_interface") {
                    out.extend(conftest_style_calls(value, function));
                } else if key.contains("Error_occurred") {
                    out.push(RawCall::failure(function, value, FailureKind::Function, None));
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// phase walk

fn collect_calls(root: &Value) -> Vec<RawCall> {
    let mut calls = Vec::new();
    let Value::Object(map) = root else {
        log::debug!("log root is not an object, nothing to extract");
        return calls;
    };

    for value in map.values() {
        let Value::Object(case) = value else { continue };

        if let Some(setup) = case.get("setup") {
            if let Some(lists) = setup.get("stepLists") {
                calls.extend(conftest_style_calls(lists, "setup"));
            }
            if let Some(error) = setup.get("Error_occurred") {
                calls.push(RawCall::failure("setup", error, FailureKind::Function, None));
            }
        }
        if let Some(steps) = case.get("steps") {
            calls.extend(step_calls(steps));
        }
        if let Some(teardown) = case.get("teardown") {
            if let Some(lists) = teardown.get("stepLists") {
                calls.extend(titled_item_calls(lists, "teardown"));
            }
            if let Some(error) = teardown.get("Error_occurred") {
                calls.push(RawCall::failure("teardown", error, FailureKind::Function, None));
            }
        }
    }
    calls
}

/// Setup `stepLists` nodes key their actions (`send`/`CheckCommand` named
/// keys); a dict node may additionally carry its own console response.
fn conftest_style_calls(lists: &Value, function: &str) -> Vec<RawCall> {
    match lists {
        Value::Object(item) => {
            let mut out = action_key_calls(item, function);
            if item.contains_key("all_cmds_response") {
                if let Some(call) = send_call(lists, function) {
                    out.push(call);
                }
            }
            out
        }
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|item| action_key_calls(item, function))
            .collect(),
        _ => {
            log::debug!("unrecognized stepLists shape for {function}, skipping");
            Vec::new()
        }
    }
}

fn action_key_calls(item: &serde_json::Map<String, Value>, function: &str) -> Vec<RawCall> {
    let mut out = Vec::new();
    for (key, value) in item {
        if key.contains("send") {
            if let Some(call) = send_call(value, function) {
                out.push(call);
            }
        } else if key.contains("CheckCommand") {
            if let Some(call) = check_call(value, function) {
                out.push(call);
            }
        }
    }
    out
}

/// Teardown/step `stepLists` items carry a `Title` naming the action instead
/// of action-named keys.
fn titled_item_calls(lists: &Value, function: &str) -> Vec<RawCall> {
    as_items(lists)
        .into_iter()
        .filter_map(|item| titled_call(item, function))
        .collect()
}

fn titled_call(item: &Value, function: &str) -> Option<RawCall> {
    let map = item.as_object()?;
    let title = map.get("Title")?;
    if title_mentions_method(title) {
        send_call(item, function)
    } else if let Some(check) = map.get("CheckCommand") {
        check_call(check, function)
    } else {
        None
    }
}

fn step_calls(steps: &Value) -> Vec<RawCall> {
    let mut out = Vec::new();
    for (idx, step) in as_items(steps).into_iter().enumerate() {
        out.extend(single_step_calls(step, idx + 1));
    }
    out
}

fn single_step_calls(step: &Value, seq: usize) -> Vec<RawCall> {
    let Some(map) = step.as_object() else {
        log::debug!("step {seq} is not an object, skipping");
        return Vec::new();
    };
    let function = step_function_name(map).unwrap_or_else(|| format!("step_{seq}"));
    let failure = map
        .get("Error_occurred")
        .map(|e| RawCall::failure(&function, e, FailureKind::Function, Some(seq)));

    let mut out = Vec::new();
    match map.get("stepLists") {
        None => out.extend(failure),
        Some(lists) => {
            for item in as_items(lists) {
                if let Some(mut call) = titled_call(item, &function) {
                    call.step_seq = Some(seq);
                    out.push(call);
                }
            }
            out.extend(failure);
        }
    }
    out
}

/// Function name = text before the first colon of the step's last title.
fn step_function_name(step: &serde_json::Map<String, Value>) -> Option<String> {
    let title = step.get("Title")?.as_array()?;
    let last = title.last()?.as_str()?;
    let name = last.split(':').next().unwrap_or(last).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

// ---------------------------------------------------------------------------
// call nodes

fn send_call(node: &Value, function: &str) -> Option<RawCall> {
    let map = node.as_object()?;
    let param = map.get("Parameter")?.as_str()?;

    Some(RawCall {
        function: function.to_string(),
        step_seq: None,
        kind: CommandKind::Send,
        layer_path: map
            .get("layer")
            .and_then(Value::as_str)
            .map(parse_layer_path)
            .unwrap_or_default(),
        device: map.get("Title").and_then(device_from_title),
        commands: split_send_parameter(param),
        transcript: map
            .get("all_cmds_response")
            .and_then(Value::as_str)
            .map(str::to_string),
        result: map
            .get("Result")
            .and_then(Value::as_str)
            .map(ExecResult::from_label)
            .unwrap_or(ExecResult::Unknown),
        expectations: Vec::new(),
        failure: None,
    })
}

/// A CheckCommand log node: the first nested `send` supplies the command and
/// transcript, a `Parameter` sibling supplies the expectation literal, the
/// node's own `Result` is the outcome. List-shaped nodes (retried checks)
/// use their last attempt.
fn check_call(node: &Value, function: &str) -> Option<RawCall> {
    let map = match node {
        Value::Object(m) => m,
        Value::Array(items) => items.last()?.as_object()?,
        _ => return None,
    };

    if let Some((_, error)) = map.iter().find(|(k, _)| k.contains("Error_occurred")) {
        let mut call = RawCall::failure(function, error, FailureKind::Check, None);
        call.kind = CommandKind::Check;
        return Some(call);
    }

    let mut base: Option<RawCall> = None;
    let mut expectations = Vec::new();
    for (key, value) in map {
        if base.is_none() && key.contains("send") {
            base = send_call(value, function);
        }
        if key.contains("Parameter") {
            if let Some(param) = value.as_str() {
                expectations = parse_check_expectations(param);
            }
        }
    }

    let mut call = base?;
    call.kind = CommandKind::Check;
    call.expectations = expectations;
    call.result = map
        .get("Result")
        .and_then(Value::as_str)
        .map(ExecResult::from_label)
        .unwrap_or(ExecResult::Unknown);
    Some(call)
}

// ---------------------------------------------------------------------------
// field extraction

/// `class_layer=1 step_layer=setup layer1=2 layer2=1` → `[1, MAX, 2, 1]`.
/// Non-numeric coordinates sort last.
fn parse_layer_path(layer: &str) -> Vec<i64> {
    layer
        .split_whitespace()
        .filter_map(|pair| pair.split_once('='))
        .map(|(_, value)| value.parse().unwrap_or(i64::MAX))
        .collect()
}

/// Device name = first parenthesised token of the title's second element.
fn device_from_title(title: &Value) -> Option<String> {
    let items = title.as_array()?;
    let text = items.get(1)?.as_str()?;
    let open = text.find('(')?;
    let close = text[open..].find(')')? + open;
    Some(text[open + 1..close].to_string())
}

fn title_mentions_method(title: &Value) -> bool {
    match title {
        Value::String(s) => s.contains("METHOD"),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| s.contains("METHOD")),
        _ => false,
    }
}

/// Extract the first balanced parenthesis group of a `Parameter` string,
/// strip the outer quote pair and trailing comma, and split into non-blank
/// command lines (per-line quote runs removed).
fn split_send_parameter(param: &str) -> Vec<String> {
    let Some(open) = param.find('(') else {
        return Vec::new();
    };
    let Some(close) = balanced_paren_end(&param[open + 1..]) else {
        log::debug!("unbalanced Parameter field, skipping");
        return Vec::new();
    };

    let mut content = param[open + 1..open + 1 + close].trim();
    for quote in ['\'', '"'] {
        if content.len() >= 2 && content.starts_with(quote) && content.ends_with(quote) {
            content = &content[1..content.len() - 1];
            break;
        }
    }
    let content = content.trim_end_matches(',').trim();

    content
        .split('\n')
        .map(|line| line.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Index of the closing paren matching an already-open one, quote-aware.
fn balanced_paren_end(s: &str) -> Option<usize> {
    let mut depth = 1usize;
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
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Pull `expect`/`not_expect` string lists out of the nested parameter
/// literal (`... {'cmd': ..., 'expect': ['a'], 'not_expect': []} ...`).
/// A quote-aware scan, never an eval of the literal.
fn parse_check_expectations(param: &str) -> Vec<Expectation> {
    let Some(start) = param.find("{'cmd'") else {
        return Vec::new();
    };
    let dict = &param[start..];

    let mut out = Vec::new();
    for content in quoted_list_values(dict, "'expect'") {
        out.push(Expectation::include(content));
    }
    for content in quoted_list_values(dict, "'not_expect'") {
        out.push(Expectation::exclude(content));
    }
    out
}

fn quoted_list_values(dict: &str, key: &str) -> Vec<String> {
    let Some(kpos) = dict.find(key) else {
        return Vec::new();
    };
    let after = &dict[kpos + key.len()..];
    let Some(bpos) = after.find('[') else {
        return Vec::new();
    };
    if !after[..bpos].chars().all(|c| c == ':' || c.is_whitespace()) {
        return Vec::new();
    }
    let list = &after[bpos + 1..];
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

// ---------------------------------------------------------------------------
// transcript matching

/// Echo lines of a console transcript and their outcome: a line opening with
/// `<` or `[` echoes the command between that bracket pair and the rest of
/// the line; the command failed iff the following physical line ends in `^`.
fn transcript_outcomes(transcript: &str) -> Vec<(String, ExecResult)> {
    let lines: Vec<&str> = transcript.split('\n').collect();
    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let close = match line.chars().next() {
            Some('<') => '>',
            Some('[') => ']',
            _ => continue,
        };
        let Some(end) = line[1..].find(close).map(|p| p + 1) else {
            continue;
        };
        let command = line[end + 1..].to_string();
        let result = match lines.get(i + 1) {
            Some(next) if next.ends_with('^') => ExecResult::Fail,
            _ => ExecResult::Pass,
        };
        out.push((command, result));
    }
    out
}

/// Expand one call into records, matching each command line against its own
/// transcript echo where possible; unmatched commands inherit the call's
/// aggregate result, except a leading `end`/`ctrl+z` with no echo, which the
/// console silently accepts.
fn call_records(call: &RawCall) -> Vec<CommandRecord> {
    if call.commands.is_empty() {
        return vec![CommandRecord {
            function_name: call.function.clone(),
            device_name: call.device.clone(),
            kind: call.kind,
            command_text: String::new(),
            layer_path: call.layer_path.clone(),
            expectations: call.expectations.clone(),
            exec_result: call.result,
            raw_transcript: call.transcript.clone(),
        }];
    }

    let outcomes = call
        .transcript
        .as_deref()
        .map(transcript_outcomes)
        .unwrap_or_default();

    let mut records = Vec::with_capacity(call.commands.len());
    let mut seq = 0usize;
    for command in &call.commands {
        let exec_result = if outcomes.is_empty() {
            call.result
        } else if seq < outcomes.len() && outcomes[seq].0 == *command {
            let matched = outcomes[seq].1;
            seq += 1;
            matched
        } else if seq != 0 && seq < outcomes.len() {
            seq += 1;
            call.result
        } else if seq == 0 {
            if command == "end" || command == "ctrl+z" {
                ExecResult::Pass
            } else {
                call.result
            }
        } else {
            seq += 1;
            call.result
        };

        records.push(CommandRecord {
            function_name: call.function.clone(),
            device_name: call.device.clone(),
            kind: call.kind,
            command_text: command.clone(),
            layer_path: call.layer_path.clone(),
            expectations: call.expectations.clone(),
            exec_result,
            raw_transcript: call.transcript.clone(),
        });
    }
    records
}

// ---------------------------------------------------------------------------
// arrangement

fn arrange(calls: &[RawCall], descriptions: &HashMap<String, String>) -> CanonicalDocument {
    let mut doc = CanonicalDocument::new();

    append_group(&mut doc, phase_ordered(calls, "setup"), descriptions.get("setup"));
    append_group(
        &mut doc,
        phase_ordered(calls, "teardown"),
        descriptions.get("teardown"),
    );

    let max_seq = calls.iter().filter_map(|c| c.step_seq).max().unwrap_or(0);
    for seq in 1..=max_seq {
        let bucket: Vec<&RawCall> = calls.iter().filter(|c| c.step_seq == Some(seq)).collect();
        if bucket.is_empty() {
            continue;
        }
        append_group(
            &mut doc,
            order_step_bucket(bucket),
            descriptions.get(&format!("step_{seq}")),
        );
    }
    doc
}

/// Phase calls in log order, function-level failures moved to the end.
fn phase_ordered<'a>(calls: &'a [RawCall], function: &str) -> Vec<&'a RawCall> {
    let mut ordered = Vec::new();
    let mut failures = Vec::new();
    for call in calls.iter().filter(|c| c.function == function && c.step_seq.is_none()) {
        if call.failure == Some(FailureKind::Function) {
            failures.push(call);
        } else {
            ordered.push(call);
        }
    }
    ordered.extend(failures);
    ordered
}

/// Within one step bucket, order by declared layer coordinates unless the
/// bucket carries a step-level failure (then the observed order stands).
fn order_step_bucket(bucket: Vec<&RawCall>) -> Vec<&RawCall> {
    if bucket.iter().any(|c| c.failure.is_some()) {
        return bucket;
    }
    let mut sorted = bucket;
    sorted.sort_by_key(|call| {
        (
            call.layer_path.get(1).copied().unwrap_or(i64::MAX),
            call.layer_path.get(2).copied().unwrap_or(i64::MAX),
            call.layer_path.len(),
        )
    });
    sorted
}

fn append_group(doc: &mut CanonicalDocument, calls: Vec<&RawCall>, description: Option<&String>) {
    for call in calls {
        let transcript = doc.entry(&call.function);
        if transcript.description.is_none() {
            transcript.description = description.cloned();
        }
        for record in call_records(call) {
            transcript.push_record(record);
        }
    }
}

/// Phase/step `Description` fields keyed `setup` / `step_N` / `teardown`.
fn function_descriptions(root: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Value::Object(map) = root else {
        return out;
    };
    for value in map.values() {
        let Value::Object(case) = value else { continue };
        for phase in ["setup", "teardown"] {
            if let Some(desc) = case
                .get(phase)
                .and_then(|p| p.get("Description"))
                .and_then(Value::as_str)
            {
                out.insert(phase.to_string(), desc.to_string());
            }
        }
        if let Some(steps) = case.get("steps") {
            for (idx, step) in as_items(steps).into_iter().enumerate() {
                if let Some(desc) = step.get("Description").and_then(Value::as_str) {
                    out.insert(format!("step_{}", idx + 1), desc.to_string());
                }
            }
        }
    }
    out
}

/// A node that is either one item or a list of items.
fn as_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
