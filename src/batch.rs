//! Per-worker batch accumulation.
//!
//! A [`BatchBuffer`] always begins with the `before` marker. Each record is
//! appended followed by the `between` marker; sealing the batch swaps the
//! trailing `between` for the `after` marker so the body reads
//! `before record (between record)* after`.

use std::sync::Arc;

/// Byte markers framing a batch body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Markers {
    pub before: Vec<u8>,
    pub between: Vec<u8>,
    pub after: Vec<u8>,
}

impl Markers {
    pub fn new(
        before: impl Into<Vec<u8>>,
        between: impl Into<Vec<u8>>,
        after: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            before: before.into(),
            between: between.into(),
            after: after.into(),
        }
    }

    /// `[a,b,c]`, for endpoints expecting a JSON array of encoded objects.
    pub fn json_array() -> Self {
        Self::new("[", ",", "]")
    }

    /// One record per line with a trailing newline.
    pub fn newline_delimited() -> Self {
        Self::new("", "\n", "\n")
    }
}

impl Default for Markers {
    fn default() -> Self {
        Self::newline_delimited()
    }
}

/// Growable byte buffer owned by exactly one worker.
#[derive(Debug)]
pub struct BatchBuffer {
    bytes: Vec<u8>,
    records: usize,
    capacity: usize,
    sealed: bool,
    markers: Arc<Markers>,
}

impl BatchBuffer {
    /// Create an empty buffer holding up to `capacity` records.
    pub fn new(capacity: usize, markers: Arc<Markers>) -> Self {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&markers.before);
        Self {
            bytes,
            records: 0,
            capacity: capacity.max(1),
            sealed: false,
            markers,
        }
    }

    /// Append a record. Returns `true` once the buffer is full and should be
    /// flushed.
    pub fn push(&mut self, record: &[u8]) -> bool {
        debug_assert!(!self.sealed, "push after seal without reset");
        self.bytes.extend_from_slice(record);
        self.bytes.extend_from_slice(&self.markers.between);
        self.records += 1;
        self.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn is_full(&self) -> bool {
        self.records >= self.capacity
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records
    }

    /// Replace the trailing `between` marker with `after`.
    ///
    /// Returns the number of records sealed, or `None` if the buffer was
    /// empty and there is nothing to send.
    pub fn seal(&mut self) -> Option<usize> {
        if self.records == 0 {
            return None;
        }
        if !self.sealed {
            let trimmed = self.bytes.len() - self.markers.between.len();
            self.bytes.truncate(trimmed);
            self.bytes.extend_from_slice(&self.markers.after);
            self.sealed = true;
        }
        Some(self.records)
    }

    /// Bytes accumulated so far. After [`seal`](Self::seal) this is the
    /// complete request body.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Discard the contents, keeping the allocation, and start a new batch.
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.bytes.extend_from_slice(&self.markers.before);
        self.records = 0;
        self.sealed = false;
    }
}

/// Body of an empty batch, used by connectivity probes.
pub fn empty_body(markers: &Markers) -> Vec<u8> {
    let mut body = Vec::with_capacity(markers.before.len() + markers.after.len());
    body.extend_from_slice(&markers.before);
    body.extend_from_slice(&markers.after);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn json_buffer(#[default(4)] capacity: usize) -> BatchBuffer {
        BatchBuffer::new(capacity, Arc::new(Markers::json_array()))
    }

    #[rstest]
    fn seals_records_between_markers(mut json_buffer: BatchBuffer) {
        json_buffer.push(b"a");
        json_buffer.push(b"b");
        assert_eq!(json_buffer.seal(), Some(2));
        assert_eq!(json_buffer.as_bytes(), b"[a,b]");
    }

    #[rstest]
    fn single_record_has_no_separator(mut json_buffer: BatchBuffer) {
        json_buffer.push(br#"{"k":1}"#);
        json_buffer.seal();
        assert_eq!(json_buffer.as_bytes(), br#"[{"k":1}]"#);
    }

    #[rstest]
    fn empty_buffer_does_not_seal(mut json_buffer: BatchBuffer) {
        assert_eq!(json_buffer.seal(), None);
        assert_eq!(json_buffer.as_bytes(), b"[");
    }

    #[rstest]
    fn reports_full_at_capacity(#[with(2)] mut json_buffer: BatchBuffer) {
        assert!(!json_buffer.push(b"a"));
        assert!(json_buffer.push(b"b"));
        assert!(json_buffer.is_full());
    }

    #[rstest]
    fn reset_returns_to_before_marker(mut json_buffer: BatchBuffer) {
        json_buffer.push(b"a");
        json_buffer.seal();
        json_buffer.reset();
        assert!(json_buffer.is_empty());
        assert_eq!(json_buffer.as_bytes(), b"[");
        json_buffer.push(b"c");
        json_buffer.seal();
        assert_eq!(json_buffer.as_bytes(), b"[c]");
    }

    #[rstest]
    fn sealing_twice_is_stable(mut json_buffer: BatchBuffer) {
        json_buffer.push(b"a");
        json_buffer.seal();
        json_buffer.seal();
        assert_eq!(json_buffer.as_bytes(), b"[a]");
    }

    #[rstest]
    #[case(Markers::newline_delimited(), b"a\nb\n".as_slice())]
    #[case(Markers::new("", "", ""), b"ab".as_slice())]
    #[case(Markers::new("<<", "||", ">>"), b"<<a||b>>".as_slice())]
    fn multi_byte_markers(#[case] markers: Markers, #[case] expected: &[u8]) {
        let mut buffer = BatchBuffer::new(8, Arc::new(markers));
        buffer.push(b"a");
        buffer.push(b"b");
        buffer.seal();
        assert_eq!(buffer.as_bytes(), expected);
    }

    #[rstest]
    fn empty_body_joins_outer_markers() {
        assert_eq!(empty_body(&Markers::json_array()), b"[]");
    }
}
