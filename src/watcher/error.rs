use anyhow::Error as AnyError;
use std::fmt;

/// One failure absorbed during a poll cycle.
#[derive(Debug)]
pub enum CycleFailure {
    /// The service rejected or could not answer the fetch for `stream`.
    Fetch { stream: String, source: AnyError },
    /// A record payload of `stream` is not valid JSON.
    Decode {
        stream: String,
        sequence_number: String,
        source: serde_json::Error,
    },
    /// A consumer of `stream` reported failure or panicked.
    Consumer {
        stream: String,
        function: String,
        source: AnyError,
    },
}

impl CycleFailure {
    pub fn stream(&self) -> &str {
        match self {
            CycleFailure::Fetch { stream, .. }
            | CycleFailure::Decode { stream, .. }
            | CycleFailure::Consumer { stream, .. } => stream,
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, CycleFailure::Fetch { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, CycleFailure::Decode { .. })
    }

    pub fn is_consumer(&self) -> bool {
        matches!(self, CycleFailure::Consumer { .. })
    }
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleFailure::Fetch { stream, source } => {
                write!(f, "fetch from stream {stream} failed: {source:#}")
            }
            CycleFailure::Decode {
                stream,
                sequence_number,
                source,
            } => write!(
                f,
                "record {sequence_number} of stream {stream} is not valid JSON: {source}"
            ),
            CycleFailure::Consumer {
                stream,
                function,
                source,
            } => write!(
                f,
                "consumer {function} failed on stream {stream}: {source:#}"
            ),
        }
    }
}

impl std::error::Error for CycleFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CycleFailure::Fetch { source, .. } | CycleFailure::Consumer { source, .. } => {
                Some(source.as_ref())
            }
            CycleFailure::Decode { source, .. } => Some(source),
        }
    }
}

/// Every failure recorded by one cycle. Never empty.
#[derive(Debug)]
pub struct CycleError {
    failures: Vec<CycleFailure>,
}

impl CycleError {
    pub(crate) fn new(failures: Vec<CycleFailure>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    pub fn failures(&self) -> &[CycleFailure] {
        &self.failures
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll cycle failed with {} error(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| failure as &(dyn std::error::Error + 'static))
    }
}

/// Errors that stop the watcher.
#[derive(Debug)]
pub enum WatchError {
    /// Registry or initial cursor acquisition failed; polling never started.
    Startup(AnyError),
    /// More than the tolerated number of consecutive cycles failed.
    ThresholdExceeded { consecutive: usize, last: CycleError },
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchError::Startup(source) => write!(f, "watcher startup failed: {source:#}"),
            WatchError::ThresholdExceeded { consecutive, last } => write!(
                f,
                "exceeded maximum number of consecutive errors ({consecutive} failed cycles): {last}"
            ),
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchError::Startup(source) => Some(source.as_ref()),
            WatchError::ThresholdExceeded { last, .. } => Some(last),
        }
    }
}
