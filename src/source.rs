use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::domain::Source;
use crate::error::KiraError;

pub trait MetadataSource {
    fn source(&self) -> Source;

    /// Raw output of the pre-flight count call, or `None` when the source
    /// has no such call.
    fn count(&self, query: &str) -> Option<Result<String, KiraError>>;

    /// Writes the raw tabular response for `query` to `destination`,
    /// truncating whatever is already there.
    fn fetch(&self, query: &str, destination: &Path) -> Result<(), KiraError>;
}

impl<T: MetadataSource + ?Sized> MetadataSource for &T {
    fn source(&self) -> Source {
        (**self).source()
    }

    fn count(&self, query: &str) -> Option<Result<String, KiraError>> {
        (**self).count(query)
    }

    fn fetch(&self, query: &str, destination: &Path) -> Result<(), KiraError> {
        (**self).fetch(query, destination)
    }
}

/// First non-blank line parsed as a non-negative integer.
pub fn parse_hit_count(raw: &str) -> Option<u64> {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<u64>().ok())
}

/// Fixed-backoff retry: `retries` extra attempts after the first one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn run<T, F>(&self, mut op: F) -> Result<T, KiraError>
    where
        F: FnMut(u32) -> Result<T, KiraError>,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt < self.retries {
                        debug!(attempt = attempt + 1, error = %err, "attempt failed, backing off");
                        if !self.backoff.is_zero() {
                            thread::sleep(self.backoff);
                        }
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}
