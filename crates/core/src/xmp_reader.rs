use crate::extractor::ExtractionError;
use std::collections::HashMap;

/// XMP Basic schema, home of `CreateDate`.
pub const XMP_BASIC_NS: &str = "http://ns.adobe.com/xap/1.0/";

/// Returns the `xmp:CreateDate` value of an XMP packet, if any.
pub fn read_xmp_create_date(packet: &[u8]) -> Result<Option<String>, ExtractionError> {
    let xml = std::str::from_utf8(packet).map_err(|_| ExtractionError::NonUtf8)?;
    find_namespaced_value(xml, XMP_BASIC_NS, "CreateDate")
}

/// Finds the first element text or attribute value named `local_name` in
/// `namespace`, in document order.
///
/// Prefix bindings are collected as they are seen and are not scoped to the
/// declaring element; XMP packets declare each prefix once.
pub fn find_namespaced_value(
    xml: &str,
    namespace: &str,
    local_name: &str,
) -> Result<Option<String>, ExtractionError> {
    let mut bindings = HashMap::<String, String>::new();
    let mut saw_element = false;
    let mut cursor = 0usize;

    while let Some(start) = xml[cursor..].find('<') {
        let start = cursor + start;
        let Some(raw_end) = xml[start..].find('>') else {
            return Err(ExtractionError::Xmp(format!(
                "unterminated tag at byte {start}"
            )));
        };
        let end = raw_end + start;
        let raw_tag = &xml[start + 1..end];
        cursor = end + 1;

        if raw_tag.starts_with('/') || raw_tag.starts_with('?') || raw_tag.starts_with('!') {
            continue;
        }
        saw_element = true;

        let raw_tag = raw_tag.trim_end_matches('/');
        let attributes = collect_attributes(raw_tag);
        for (name, value) in &attributes {
            if *name == "xmlns" {
                bindings.insert(String::new(), (*value).to_string());
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                bindings.insert(prefix.to_string(), (*value).to_string());
            }
        }

        for (name, value) in &attributes {
            if is_named(name, &bindings, namespace, local_name, false) {
                if let Some(value) = normalize(value) {
                    return Ok(Some(value));
                }
            }
        }

        let tag_name = raw_tag.split_whitespace().next().unwrap_or_default();
        if !is_named(tag_name, &bindings, namespace, local_name, true) {
            continue;
        }

        let close_tag = format!("</{}>", tag_name);
        if let Some(close_pos) = xml[end + 1..].find(&close_tag) {
            let content = &xml[end + 1..end + 1 + close_pos];
            if !content.contains('<') {
                if let Some(value) = normalize(content) {
                    return Ok(Some(value));
                }
            }
        }
    }

    if !saw_element {
        return Err(ExtractionError::Xmp("packet contains no elements".to_string()));
    }
    Ok(None)
}

/// Resolves `qualified` against the prefix bindings. Unprefixed attributes
/// never take the default namespace.
fn is_named(
    qualified: &str,
    bindings: &HashMap<String, String>,
    namespace: &str,
    local_name: &str,
    is_element: bool,
) -> bool {
    let (prefix, local) = match qualified.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None if is_element => ("", qualified),
        None => return false,
    };
    local == local_name
        && bindings
            .get(prefix)
            .is_some_and(|uri| uri.as_str() == namespace)
}

fn collect_attributes(raw_tag: &str) -> Vec<(&str, &str)> {
    let bytes = raw_tag.as_bytes();
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while cursor < bytes.len() && !bytes[cursor].is_ascii_whitespace() {
        cursor += 1;
    }

    while cursor < bytes.len() {
        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor >= bytes.len() {
            break;
        }

        let name_start = cursor;
        while cursor < bytes.len() && !bytes[cursor].is_ascii_whitespace() && bytes[cursor] != b'='
        {
            cursor += 1;
        }
        let name = &raw_tag[name_start..cursor];

        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor >= bytes.len() || bytes[cursor] != b'=' {
            continue;
        }
        cursor += 1;

        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor >= bytes.len() {
            break;
        }

        let (value_start, value_end) = if bytes[cursor] == b'"' || bytes[cursor] == b'\'' {
            let quote = bytes[cursor];
            cursor += 1;
            let value_start = cursor;
            while cursor < bytes.len() && bytes[cursor] != quote {
                cursor += 1;
            }
            if cursor >= bytes.len() {
                break;
            }
            let value_end = cursor;
            cursor += 1;
            (value_start, value_end)
        } else {
            let value_start = cursor;
            while cursor < bytes.len() && !bytes[cursor].is_ascii_whitespace() {
                cursor += 1;
            }
            (value_start, cursor)
        };

        if !name.is_empty() {
            out.push((name, &raw_tag[value_start..value_end]));
        }
    }

    out
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| html_unescape_basic(trimmed))
}

fn html_unescape_basic(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
