//! where successful attempts end up
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{error, instrument};

use crate::error::SiegelineError;
use crate::payload::Payload;

/// serializes a [`Duration`] as fractional seconds, the shape operators and
/// downstream tooling expect for the `time` field
fn serialize_secs<S>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// one successful attempt, as recorded for the operator
///
/// serializes to `{"payload": {...}, "status": .., "time": .., "length": ..}`
#[derive(Serialize, Clone, Debug)]
pub struct SuccessRecord {
    /// the winning field-name-to-value mapping
    pub payload: Payload,

    /// the response status code
    pub status: u16,

    /// wall time of the winning request, in seconds
    #[serde(rename = "time", serialize_with = "serialize_secs")]
    pub elapsed: Duration,

    /// response body length in bytes
    #[serde(rename = "length")]
    pub body_length: usize,
}

/// receives successful attempts as they are confirmed
///
/// the scheduler's completion handler is the only caller, so writes arrive
/// one at a time; implementors don't need their own locking
pub trait ResultSink: Send {
    /// persist one success
    ///
    /// # Errors
    ///
    /// implementors may fail on I/O problems; the scheduler logs the failure
    /// and keeps the record in its in-memory result list
    fn record(&mut self, record: &SuccessRecord) -> Result<(), SiegelineError>;
}

/// a sink that drops everything; used when no output destination is configured
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn record(&mut self, _record: &SuccessRecord) -> Result<(), SiegelineError> {
        Ok(())
    }
}

/// appends one JSON object per success to a file, newline-delimited
///
/// each record is flushed as it's written, so partial runs still leave
/// usable output behind
///
/// # Examples
///
/// ```no_run
/// # use siegeline::sink::JsonLinesSink;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sink = JsonLinesSink::append("findings.jsonl")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// open (or create) the given file for appending
    ///
    /// # Errors
    ///
    /// returns an error when the file can't be opened for appending
    #[instrument(level = "trace")]
    pub fn append<P>(path: P) -> Result<Self, SiegelineError>
    where
        P: AsRef<Path> + std::fmt::Debug,
    {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| {
                error!(
                    path = path.as_ref().to_string_lossy().to_string(),
                    "could not open the output file: {}", source
                );

                SiegelineError::IOError { source }
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl ResultSink for JsonLinesSink {
    fn record(&mut self, record: &SuccessRecord) -> Result<(), SiegelineError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        Ok(())
    }
}
