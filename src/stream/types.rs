use std::fmt;

/// Opaque, service-issued token identifying where to read next within a shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single ordered partition of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub shard_id: String,
}

impl Shard {
    pub fn new(shard_id: impl Into<String>) -> Self {
        Self {
            shard_id: shard_id.into(),
        }
    }
}

/// Where a freshly acquired cursor is positioned inside its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Oldest record still retained by the service.
    TrimHorizon,
}

impl StartPosition {
    pub fn as_iterator_type(&self) -> &'static str {
        match self {
            StartPosition::TrimHorizon => "TRIM_HORIZON",
        }
    }
}

/// One record as returned by the service, payload still undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub sequence_number: String,
    pub partition_key: String,
    pub data: Vec<u8>,
}

impl RawRecord {
    pub fn new(
        sequence_number: impl Into<String>,
        partition_key: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            sequence_number: sequence_number.into(),
            partition_key: partition_key.into(),
            data: data.into(),
        }
    }
}

/// Result of one bounded fetch against a cursor.
///
/// `next_cursor` is `None` once the service reports the shard as closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub records: Vec<RawRecord>,
    pub next_cursor: Option<Cursor>,
}

impl FetchResult {
    pub fn new(records: Vec<RawRecord>, next_cursor: Option<Cursor>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    pub fn empty(next_cursor: Option<Cursor>) -> Self {
        Self::new(Vec::new(), next_cursor)
    }
}
