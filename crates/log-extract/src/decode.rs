use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// `HTML:b'<base64>'` / `CMD:b'<base64>'`, with or without the leading
/// underscore older framework versions emit.
static TAGGED_LEAF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_?(HTML|CMD):b'(.*)'$").expect("valid tag pattern"));

/// Text encodings tried in order after a base64 decode. GB18030 is a
/// superset of GB2312; the final single-byte fallback never rejects input.
const ENCODINGS: [&encoding_rs::Encoding; 3] = [
    encoding_rs::GBK,
    encoding_rs::GB18030,
    encoding_rs::WINDOWS_1252,
];

/// Best-effort normalization of a raw log tree, in place.
///
/// Every string leaf matching the tagged-base64 pattern is decoded and
/// replaced; on total decode failure the leaf keeps a `TAG:<base64>` marker.
/// Afterwards literal two-character `\n` escapes become real newlines. Decode
/// failures are swallowed; this pass never fails.
pub fn decode_tree(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                decode_tree(child);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                decode_tree(child);
            }
        }
        Value::String(s) => {
            let decoded = decode_leaf(s);
            let replaced = decoded.replace("\\n", "\n");
            *s = replaced;
        }
        _ => {}
    }
}

fn decode_leaf(value: &str) -> String {
    let Some(caps) = TAGGED_LEAF.captures(value) else {
        return value.to_string();
    };
    let tag = &caps[1];
    let b64 = &caps[2];

    let Ok(bytes) = BASE64.decode(b64.as_bytes()) else {
        log::debug!("invalid base64 payload in {tag} leaf, keeping marker");
        return format!("{tag}:{b64}");
    };

    if let Ok(text) = std::str::from_utf8(&bytes) {
        return text.to_string();
    }
    for encoding in ENCODINGS {
        let (text, _, had_errors) = encoding.decode(&bytes);
        if !had_errors {
            return text.into_owned();
        }
    }

    log::debug!("no encoding accepted {tag} payload, keeping marker");
    format!("{tag}:{b64}")
}
