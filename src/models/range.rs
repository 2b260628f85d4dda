//! Byte range types shared by the range negotiator and the object store.

/// A client-requested span in object-store-native form.
///
/// `length == None` means "from `offset` to the end of the object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    /// Build a range from inclusive `start..=end` bounds.
    ///
    /// Returns `None` when `start > end`.
    pub fn inclusive(start: u64, end: u64) -> Option<Self> {
        if start > end {
            return None;
        }
        Some(Self {
            offset: start,
            length: Some(end - start + 1),
        })
    }

    pub fn open_ended(offset: u64) -> Self {
        Self {
            offset,
            length: None,
        }
    }
}

/// The span the store actually returned, in one of the shapes a store may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedRange {
    /// `length` bytes starting at `offset`.
    Bounded { offset: u64, length: u64 },
    /// Everything from `offset` to the end of the object.
    From { offset: u64 },
    /// The last `length` bytes of the object.
    Suffix { length: u64 },
}

/// Inclusive `[start, end]` framing of a partial body within `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    /// Value for the `Content-Range` response header.
    pub fn header_value(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}
