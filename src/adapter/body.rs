//! Normalization shared by both adapters: header casing, query decoding,
//! and content-type driven body decoding.

use std::collections::HashMap;

use hyper::body::Bytes;

use crate::error::AppError;
use crate::neutral::RequestBody;

/// Lower-case header names; repeated headers are joined with `", "`
pub fn normalize_headers<'a, I>(headers: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let mut normalized: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        normalized
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    normalized
}

/// Parse `a=1&b=two%20words`; the last occurrence of a key wins
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

/// Decode `%XX` escapes and `+` as space; malformed escapes are kept literally
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// `application/json` or any `+json` structured suffix
pub fn is_json_content_type(content_type: &str) -> bool {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    base == "application/json" || base.ends_with("+json")
}

/// Decode JSON only when declared as JSON; everything else stays raw.
/// Malformed JSON becomes a rejected body rather than a failed request.
pub fn decode_body(content_type: Option<&str>, raw: Bytes) -> RequestBody {
    if raw.is_empty() {
        return RequestBody::Empty;
    }
    if content_type.is_some_and(is_json_content_type) {
        return serde_json::from_slice(&raw).map_or_else(
            |e| RequestBody::Rejected(AppError::bad_body(format!("Invalid JSON: {e}"))),
            RequestBody::Json,
        );
    }
    RequestBody::Raw(raw)
}

/// Whether a declared `Content-Length` is already over the limit
pub fn declared_length_exceeds(content_length: Option<&str>, limit: u64) -> bool {
    content_length
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|size| size > limit)
}
