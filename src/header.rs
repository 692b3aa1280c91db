//! Header field lists and the reserved trailer key of the header-list
//! encoding.

use crate::error::StreamError;

/// Reserved trailer key carrying the total body length (header-list encoding
/// only). Parsed and stripped before trailers reach the application; appended
/// to outgoing trailers.
pub const FINAL_OFFSET_KEY: &[u8] = b":final-offset";

/// Per-field size accounting overhead, matching the HTTP/2 header list size
/// rule (RFC 9113 Section 6.5.2).
const FIELD_OVERHEAD: usize = 32;

/// A single header name-value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl HeaderField {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Uncompressed size of this field for limit accounting.
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + FIELD_OVERHEAD
    }
}

/// An ordered list of header fields.
///
/// Duplicate names are preserved in arrival order; the one exception is
/// repeated `cookie` fragments, which [`coalesce_cookies`](Self::coalesce_cookies)
/// joins with `"; "` because the consuming layer expects a single crumb.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    fields: Vec<HeaderField>,
}

impl HeaderBlock {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn from_fields(fields: Vec<HeaderField>) -> Self {
        Self { fields }
    }

    pub fn push(&mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.fields.push(HeaderField::new(name, value));
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<HeaderField> {
        self.fields
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_slice())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Uncompressed size of the whole set for limit accounting.
    pub fn uncompressed_size(&self) -> usize {
        self.fields.iter().map(HeaderField::size).sum()
    }

    /// Join repeated `cookie` fragments into one field with `"; "`.
    ///
    /// The compression layer keeps cookie crumbs separate for better
    /// compression; the consuming layer wants one header.
    pub fn coalesce_cookies(&mut self) {
        let count = self.fields.iter().filter(|f| f.name == b"cookie").count();
        if count < 2 {
            return;
        }
        let mut joined: Vec<u8> = Vec::new();
        for f in self.fields.iter().filter(|f| f.name == b"cookie") {
            if !joined.is_empty() {
                joined.extend_from_slice(b"; ");
            }
            joined.extend_from_slice(&f.value);
        }
        let first = self
            .fields
            .iter()
            .position(|f| f.name == b"cookie")
            .unwrap();
        self.fields[first].value = joined;
        let mut seen = 0;
        self.fields.retain(|f| {
            if f.name != b"cookie" {
                return true;
            }
            seen += 1;
            seen == 1
        });
    }

    /// Remove the `:final-offset` field and return its parsed value.
    ///
    /// Returns `Ok(None)` when absent, `Err` when present but not a decimal
    /// byte count.
    pub(crate) fn take_final_offset(&mut self) -> Result<Option<u64>, StreamError> {
        let Some(pos) = self.fields.iter().position(|f| f.name == FINAL_OFFSET_KEY) else {
            return Ok(None);
        };
        let field = self.fields.remove(pos);
        let text = std::str::from_utf8(&field.value)
            .map_err(|_| StreamError::MalformedFrame("non-ascii :final-offset"))?;
        let value = text
            .parse::<u64>()
            .map_err(|_| StreamError::MalformedFrame("unparsable :final-offset"))?;
        Ok(Some(value))
    }

    /// Append a `:final-offset` field for outgoing trailers.
    pub(crate) fn push_final_offset(&mut self, total_body_bytes: u64) {
        self.push(FINAL_OFFSET_KEY, total_body_bytes.to_string().into_bytes());
    }
}

/// One normalized header delivery: a complete header or trailer set, however
/// it arrived on the wire.
#[derive(Debug)]
pub struct HeaderEvent {
    pub block: HeaderBlock,
    /// End of input on this stream accompanies the set.
    pub fin: bool,
    /// Uncompressed-size accounting value for limit enforcement.
    pub uncompressed_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_preserved_in_order() {
        let mut block = HeaderBlock::new();
        block.push("accept", "text/html");
        block.push("accept", "*/*");
        assert_eq!(block.get(b"accept"), Some(b"text/html".as_slice()));
        assert_eq!(block.len(), 2);
    }

    #[test]
    fn cookie_fragments_coalesced() {
        let mut block = HeaderBlock::new();
        block.push(":method", "GET");
        block.push("cookie", "a=b");
        block.push("x-other", "1");
        block.push("cookie", "c=d");
        block.coalesce_cookies();
        assert_eq!(block.len(), 3);
        assert_eq!(block.get(b"cookie"), Some(b"a=b; c=d".as_slice()));
        // Position of the first fragment is kept.
        assert_eq!(block.fields()[1].name, b"cookie");
    }

    #[test]
    fn single_cookie_untouched() {
        let mut block = HeaderBlock::new();
        block.push("cookie", "a=b");
        block.coalesce_cookies();
        assert_eq!(block.get(b"cookie"), Some(b"a=b".as_slice()));
    }

    #[test]
    fn final_offset_taken_and_stripped() {
        let mut block = HeaderBlock::new();
        block.push("key1", "value1");
        block.push(FINAL_OFFSET_KEY, "11");
        assert_eq!(block.take_final_offset(), Ok(Some(11)));
        assert_eq!(block.get(FINAL_OFFSET_KEY), None);
        assert_eq!(block.len(), 1);
        // Second take finds nothing.
        assert_eq!(block.take_final_offset(), Ok(None));
    }

    #[test]
    fn bad_final_offset_rejected() {
        let mut block = HeaderBlock::new();
        block.push(FINAL_OFFSET_KEY, "eleven");
        assert!(block.take_final_offset().is_err());
    }

    #[test]
    fn size_accounting_includes_overhead() {
        let mut block = HeaderBlock::new();
        block.push("a", "b");
        assert_eq!(block.uncompressed_size(), 1 + 1 + 32);
    }
}
