//! Transfer-encoding and header-encoding decoders.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 encoded words.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Errors raised while decoding encoded content.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Invalid Base64 payload.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Malformed escape or encoded word.
    #[error("Invalid encoding: {0}")]
    Invalid(String),
}

/// Decodes Base64 data, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, DecodeError> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045) into raw bytes.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'=' {
            result.push(bytes[i]);
            i += 1;
            continue;
        }

        // Soft line break
        match bytes.get(i + 1..) {
            Some([b'\r', b'\n', ..]) => {
                i += 3;
                continue;
            }
            Some([b'\n', ..]) => {
                i += 2;
                continue;
            }
            _ => {}
        }

        let hex = bytes
            .get(i + 1..i + 3)
            .ok_or_else(|| DecodeError::Invalid("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|_| DecodeError::Invalid("Non-ASCII escape sequence".to_string()))?;
        let byte = u8::from_str_radix(hex, 16)
            .map_err(|e| DecodeError::Invalid(format!("Invalid hex {hex:?}: {e}")))?;
        result.push(byte);
        i += 3;
    }

    Ok(result)
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Plain text between encoded words is kept; whitespace separating two
/// adjacent encoded words is dropped as the RFC requires. Only UTF-8 and
/// ASCII-compatible charsets are decoded faithfully; other charsets are
/// decoded lossily.
///
/// # Errors
///
/// Returns an error if an encoded word is malformed.
pub fn decode_rfc2047(text: &str) -> Result<String, DecodeError> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space = String::new();
    let mut previous_was_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        let Some((word, consumed)) = split_encoded_word(candidate) else {
            output.push_str(&pending_space);
            pending_space.clear();
            output.push_str(before);
            output.push_str("=?");
            rest = &candidate[2..];
            previous_was_word = false;
            continue;
        };

        if previous_was_word && before.chars().all(char::is_whitespace) {
            // whitespace between adjacent encoded words is not displayed
        } else {
            output.push_str(&pending_space);
            output.push_str(before);
        }
        pending_space.clear();

        output.push_str(&decode_word(word)?);
        rest = &candidate[consumed..];
        previous_was_word = true;

        let trailing = rest.len() - rest.trim_start().len();
        pending_space.push_str(&rest[..trailing]);
        rest = &rest[trailing..];
    }

    output.push_str(&pending_space);
    output.push_str(rest);
    Ok(output)
}

/// Splits `=?charset?enc?text?=` off the front of `s`.
fn split_encoded_word(s: &str) -> Option<(&str, usize)> {
    let inner = s.strip_prefix("=?")?;
    let charset_end = inner.find('?')?;
    let after_charset = &inner[charset_end + 1..];
    let encoding_end = after_charset.find('?')?;
    let after_encoding = &after_charset[encoding_end + 1..];
    let text_end = after_encoding.find("?=")?;
    let consumed = 2 + charset_end + 1 + encoding_end + 1 + text_end + 2;
    Some((&s[2..consumed - 2], consumed))
}

fn decode_word(word: &str) -> Result<String, DecodeError> {
    let parts: Vec<&str> = word.splitn(3, '?').collect();
    let [_charset, encoding, encoded_text] = parts.as_slice() else {
        return Err(DecodeError::Invalid("Invalid RFC 2047 format".to_string()));
    };

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(encoded_text)?,
        // Quoted-Printable with underscore for space
        "Q" => decode_quoted_printable(&encoded_text.replace('_', " "))?,
        other => {
            return Err(DecodeError::Invalid(format!("Unknown encoding: {other}")));
        }
    };

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
