use std::fmt;
use std::str::Utf8Error;

use serde::de::DeserializeOwned;

use crate::error::Result;

/// An immutable inbound or outbound payload. Carries no identity beyond
/// its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Vec<u8>);

impl Message {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Build a message from a raw inbound payload: surrounding whitespace is
    /// trimmed and embedded line breaks are collapsed to single spaces.
    pub(crate) fn normalized(mut raw: Vec<u8>) -> Self {
        for byte in raw.iter_mut() {
            if *byte == b'\n' {
                *byte = b' ';
            }
        }

        let first = raw.iter().position(|b| !b.is_ascii_whitespace());
        let last = raw.iter().rposition(|b| !b.is_ascii_whitespace());
        match (first, last) {
            (Some(first), Some(last)) => {
                raw.truncate(last + 1);
                raw.drain(..first);
            }
            _ => raw.clear(),
        }

        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn as_str(&self) -> std::result::Result<&str, Utf8Error> {
        std::str::from_utf8(&self.0)
    }

    /// Deserialize the payload as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.0)?)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_trims_whitespace() {
        let msg = Message::normalized(b"  hello  ".to_vec());
        assert_eq!(msg.as_bytes(), b"hello");
    }

    #[test]
    fn test_normalized_collapses_line_breaks() {
        let msg = Message::normalized(b"hello\nworld".to_vec());
        assert_eq!(msg.as_bytes(), b"hello world");
    }

    #[test]
    fn test_normalized_trailing_newline_is_trimmed() {
        let msg = Message::normalized(b"ping\n".to_vec());
        assert_eq!(msg.as_bytes(), b"ping");
    }

    #[test]
    fn test_normalized_all_whitespace_becomes_empty() {
        let msg = Message::normalized(b" \n\t \n ".to_vec());
        assert!(msg.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let msg = Message::from(r#"{"nickname":"ferris","content":"hi"}"#);
        let value: serde_json::Value = msg.json().unwrap();
        assert_eq!(value["nickname"], "ferris");
    }
}
