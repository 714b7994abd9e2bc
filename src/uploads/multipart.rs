//! multipart/form-data parsing over an already collected body
//!
//! Parts are returned in stream order and slice the original buffer without
//! copying.

use hyper::body::Bytes;

use crate::error::AppError;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    /// Present for file parts, even when empty
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Part {
    pub const fn is_file(&self) -> bool {
        self.filename.is_some()
    }
}

/// Extract the `boundary` parameter from a multipart content type
pub fn boundary(content_type: &str) -> Option<String> {
    split_params(content_type)
        .into_iter()
        .skip(1)
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| unquote(value.trim()).to_string())
        })
        .filter(|b| !b.is_empty())
}

pub fn parse(body: &Bytes, boundary: &str) -> Result<Vec<Part>, AppError> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut close = CRLF.to_vec();
    close.extend_from_slice(&delimiter);

    let first = find(body, &delimiter, 0)
        .ok_or_else(|| AppError::bad_body("multipart boundary not found in body"))?;
    let mut cursor = first + delimiter.len();
    let mut parts = Vec::new();

    loop {
        let rest = &body[cursor..];
        if rest.starts_with(b"--") {
            return Ok(parts);
        }

        // Transport padding may follow the delimiter before the line break
        let padding = rest
            .iter()
            .take_while(|b| **b == b' ' || **b == b'\t')
            .count();
        if !rest[padding..].starts_with(CRLF) {
            return Err(AppError::bad_body("malformed multipart delimiter line"));
        }
        cursor += padding + CRLF.len();

        let (header_block, content_start) = if body[cursor..].starts_with(CRLF) {
            // Part with no headers at all
            (&body[cursor..cursor], cursor + CRLF.len())
        } else {
            let end = find(body, HEADER_END, cursor)
                .ok_or_else(|| AppError::bad_body("unterminated multipart part headers"))?;
            (&body[cursor..end], end + HEADER_END.len())
        };

        let content_end = find(body, &close, content_start)
            .ok_or_else(|| AppError::bad_body("multipart body is not terminated"))?;

        parts.push(parse_part(header_block, body.slice(content_start..content_end))?);
        cursor = content_end + close.len();
    }
}

fn parse_part(header_block: &[u8], data: Bytes) -> Result<Part, AppError> {
    let text = String::from_utf8_lossy(header_block);
    let mut disposition = None;
    let mut content_type = None;

    for line in text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => disposition = Some(value.trim().to_string()),
            "content-type" => content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let disposition = disposition
        .ok_or_else(|| AppError::bad_body("multipart part without Content-Disposition"))?;

    let mut name = None;
    let mut filename = None;
    for param in split_params(&disposition).into_iter().skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(unquote(value.trim()).to_string()),
            "filename" => filename = Some(unquote(value.trim()).to_string()),
            _ => {}
        }
    }

    Ok(Part {
        name: name.ok_or_else(|| AppError::bad_body("multipart part without a name"))?,
        filename,
        content_type,
        data,
    })
}

/// Split on `;` outside double quotes
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Encode parts as a multipart body: `(field, filename, content type, data)`
#[cfg(test)]
pub fn build_body(boundary: &str, parts: &[(&str, Option<&str>, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, content_type, data) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{f}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(CRLF);
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
