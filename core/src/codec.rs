//! Document decoders: raw response bytes in, structured value out.
//!
//! # Design
//! A decoder is a pure function of its input. Operations hold one behind an
//! `Arc`, so a single decoder value may be shared by any number of
//! operations running on different threads.

use bson::Document;

use crate::error::DecodeError;

/// Turns a fully received response body into a document.
pub trait DocumentDecoder: Send + Sync {
    /// The decoded value handed to callbacks.
    type Document: Send + 'static;

    /// Decode `bytes`. Must be deterministic and free of I/O.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Document, DecodeError>;

    /// Media types this decoder understands, used for the `Accept` header and
    /// optional content-type enforcement.
    fn content_types(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Decodes BSON bodies into [`bson::Document`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonDecoder;

impl BsonDecoder {
    /// Smallest valid document: a 4-byte length and the terminating NUL.
    const MIN_LEN: usize = 5;

    /// Check the outer frame so truncated or padded bodies get a precise
    /// offset before the element parser runs.
    fn check_envelope(bytes: &[u8]) -> Result<(), DecodeError> {
        if bytes.len() < Self::MIN_LEN {
            return Err(DecodeError::at(
                bytes.len(),
                format!("document too short: {} bytes", bytes.len()),
            ));
        }
        let declared = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if declared < Self::MIN_LEN as i32 {
            return Err(DecodeError::at(0, format!("invalid document length {declared}")));
        }
        let declared = declared as usize;
        if declared != bytes.len() {
            return Err(DecodeError::at(
                0,
                format!("length prefix {declared} does not match body length {}", bytes.len()),
            ));
        }
        if bytes[declared - 1] != 0 {
            return Err(DecodeError::at(declared - 1, "missing document terminator"));
        }
        Ok(())
    }
}

impl DocumentDecoder for BsonDecoder {
    type Document = Document;

    fn decode(&self, bytes: &[u8]) -> Result<Document, DecodeError> {
        Self::check_envelope(bytes)?;
        Document::from_reader(bytes).map_err(|e| DecodeError::new(e.to_string()))
    }

    fn content_types(&self) -> &'static [&'static str] {
        &["application/bson"]
    }
}

/// Decodes JSON bodies into [`serde_json::Value`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl DocumentDecoder for JsonDecoder {
    type Document = serde_json::Value;

    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| {
            DecodeError::new(format!("{e} (line {}, column {})", e.line(), e.column()))
        })
    }

    fn content_types(&self) -> &'static [&'static str] {
        &["application/json", "text/json"]
    }
}

/// Adapts a plain function or closure into a decoder.
pub struct FnDecoder<F> {
    decode: F,
    content_types: &'static [&'static str],
}

impl<F> FnDecoder<F> {
    pub fn new(decode: F) -> Self {
        Self {
            decode,
            content_types: &[],
        }
    }

    pub fn with_content_types(mut self, content_types: &'static [&'static str]) -> Self {
        self.content_types = content_types;
        self
    }
}

impl<F, T> DocumentDecoder for FnDecoder<F>
where
    F: Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync,
    T: Send + 'static,
{
    type Document = T;

    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        (self.decode)(bytes)
    }

    fn content_types(&self) -> &'static [&'static str] {
        self.content_types
    }
}
