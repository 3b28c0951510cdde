//! Message feature extraction.
//!
//! Turns a fetched message into the three features the classifier sees:
//! subject, sender and a bounded plain-text snippet. Extraction never
//! fails; any parse problem degrades to a placeholder snippet.

use tracing::debug;

use crate::encoding::{self, DecodeError};

/// Subject used when the envelope carries none.
pub const NO_SUBJECT: &str = "No Subject";

/// Snippet used when the body cannot be parsed.
pub const UNPARSEABLE_BODY: &str = "Could not parse body";

/// Nesting depth beyond which a multipart body is treated as malformed.
const MAX_DEPTH: usize = 16;

/// Classifier input derived from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFeatures {
    /// Decoded subject, or [`NO_SUBJECT`].
    pub subject: String,
    /// Sender as displayed by the mailbox client.
    pub sender: String,
    /// Plain-text excerpt of at most the configured number of characters.
    pub snippet: String,
}

/// Why a body could not be turned into text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Multipart entity without a boundary parameter.
    #[error("Missing boundary in multipart entity")]
    MissingBoundary,

    /// Multipart nesting exceeds [`MAX_DEPTH`].
    #[error("Multipart nesting too deep")]
    TooDeep,

    /// Transfer encoding could not be reversed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// HTML could not be converted to text.
    #[error("HTML conversion failed: {0}")]
    Html(String),
}

/// Extracts classifier features from envelope data and the raw message.
///
/// Multipart messages contribute their first `text/plain` part in
/// depth-first order, falling back to the first `text/html` part rendered
/// as text. Single-part messages contribute their whole body.
#[must_use]
pub fn extract_features(
    subject: Option<&str>,
    sender: &str,
    raw: &[u8],
    max_chars: usize,
) -> MessageFeatures {
    let subject = subject
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(
            || NO_SUBJECT.to_string(),
            |s| encoding::decode_rfc2047(s).unwrap_or_else(|_| s.to_string()),
        );

    let body = match body_text(raw) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "Falling back to placeholder snippet");
            UNPARSEABLE_BODY.to_string()
        }
    };

    MessageFeatures {
        subject,
        sender: sender.trim().to_string(),
        snippet: snippet(&body, max_chars),
    }
}

/// Collapses whitespace, drops control characters and truncates.
#[must_use]
pub fn snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text
        .split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    collapsed.chars().take(max_chars).collect()
}

/// Returns the text body of a raw message.
///
/// # Errors
///
/// Returns an error if the MIME structure or a transfer encoding is broken.
pub fn body_text(raw: &[u8]) -> Result<String, ExtractError> {
    let message = String::from_utf8_lossy(raw);
    let entity = Entity::parse(&message);

    if entity.content_type().starts_with("multipart/") {
        let mut html = None;
        let text = find_text(&entity, 0, &mut html)?;
        match (text, html) {
            (Some(text), _) => Ok(text),
            (None, Some(html)) => html_to_text(&html),
            (None, None) => Ok(String::new()),
        }
    } else if entity.content_type() == "text/html" {
        html_to_text(&entity.decoded_body()?)
    } else {
        entity.decoded_body()
    }
}

/// Depth-first search for the first `text/plain` part, remembering the
/// first `text/html` part on the way.
fn find_text(
    entity: &Entity<'_>,
    depth: usize,
    html: &mut Option<String>,
) -> Result<Option<String>, ExtractError> {
    if depth > MAX_DEPTH {
        return Err(ExtractError::TooDeep);
    }

    let content_type = entity.content_type();
    if content_type.starts_with("multipart/") {
        let boundary = entity.boundary().ok_or(ExtractError::MissingBoundary)?;
        for part in split_multipart(entity.body, &boundary) {
            if let Some(text) = find_text(&Entity::parse(part), depth + 1, html)? {
                return Ok(Some(text));
            }
        }
        return Ok(None);
    }

    if entity.is_attachment() {
        return Ok(None);
    }

    match content_type.as_str() {
        "text/plain" => entity.decoded_body().map(Some),
        "text/html" if html.is_none() => {
            *html = Some(entity.decoded_body()?);
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn html_to_text(html: &str) -> Result<String, ExtractError> {
    htmd::convert(html).map_err(|e| ExtractError::Html(e.to_string()))
}

/// One MIME entity: unfolded headers plus undecoded body.
struct Entity<'a> {
    headers: Vec<(String, String)>,
    body: &'a str,
}

impl<'a> Entity<'a> {
    fn parse(text: &'a str) -> Self {
        let (head, body) = split_headers_body(text);
        Self {
            headers: parse_headers(head),
            body,
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Lowercased `type/subtype`; RFC 2045 default is `text/plain`.
    fn content_type(&self) -> String {
        self.header("content-type")
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    fn boundary(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|v| parameter(v, "boundary"))
    }

    fn charset(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|v| parameter(v, "charset"))
            .map(|c| c.to_ascii_lowercase())
    }

    fn is_attachment(&self) -> bool {
        self.header("content-disposition")
            .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("attachment"))
    }

    /// Body with the transfer encoding reversed and the charset applied.
    fn decoded_body(&self) -> Result<String, ExtractError> {
        let encoding = self
            .header("content-transfer-encoding")
            .unwrap_or("7bit")
            .trim()
            .to_ascii_lowercase();

        let bytes = match encoding.as_str() {
            "base64" => encoding::decode_base64(self.body)?,
            "quoted-printable" => encoding::decode_quoted_printable(self.body)?,
            _ => return Ok(self.body.to_string()),
        };

        Ok(decode_charset(&bytes, self.charset().as_deref()))
    }
}

fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    match charset {
        Some("iso-8859-1" | "latin1" | "latin-1" | "windows-1252" | "cp1252") => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Split message into headers and body at the first blank line.
fn split_headers_body(message: &str) -> (&str, &str) {
    // Look for \r\n\r\n or \n\n separator, whichever comes first
    let crlf = message.find("\r\n\r\n").map(|idx| (idx, 4));
    let lf = message.find("\n\n").map(|idx| (idx, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match split {
        Some((idx, len)) => (&message[..idx], &message[idx + len..]),
        // No body found
        None => (message, ""),
    }
}

/// Parses header lines, joining folded continuation lines.
fn parse_headers(head: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in head.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    headers
}

/// Extracts a `name=value` or `name="value"` parameter from a header value.
fn parameter(header_value: &str, name: &str) -> Option<String> {
    header_value.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case(name) {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.split_once('"').map(|(inner, _)| inner))
            .unwrap_or(value);
        Some(value.to_string())
    })
}

/// Splits a multipart body into its parts using the boundary.
///
/// The preamble before the first delimiter and the epilogue after the
/// closing delimiter are discarded.
fn split_multipart<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();

    for (index, chunk) in body.split(delimiter.as_str()).enumerate() {
        if index == 0 {
            continue;
        }
        // Closing delimiter: everything after it is epilogue
        if chunk.starts_with("--") {
            break;
        }
        let chunk = chunk
            .strip_prefix("\r\n")
            .or_else(|| chunk.strip_prefix('\n'))
            .unwrap_or(chunk);
        let chunk = chunk
            .strip_suffix("\r\n")
            .or_else(|| chunk.strip_suffix('\n'))
            .unwrap_or(chunk);
        if !chunk.trim().is_empty() {
            parts.push(chunk);
        }
    }

    parts
}
