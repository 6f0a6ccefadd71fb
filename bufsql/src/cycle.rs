//! One drain → decode → upload → re-append → commit pass.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, error, warn};

use crate::buffer::{BufferStore, HistoryLog};
use crate::codec::{DecodeError, LineCodec};
use crate::error::{IngestError, Result};
use crate::record::Record;
use crate::retry::RetryTracker;
use crate::store::{Statement, Store};
use crate::upload::Uploader;

pub const COUNTRY_FIELD: &str = "country";

/// What happens to a line that is already a tracked decode failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KnownFailurePolicy {
    /// Drop it from the buffer for good.
    #[default]
    Drop,
    /// Put it back untouched, without decoding or logging it again.
    Retain,
}

/// What happens to a line whose insert was rejected by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteFailurePolicy {
    /// Log and discard the record.
    #[default]
    Drop,
    /// Put the line back in the buffer for the next cycle.
    Requeue,
}

impl FromStr for KnownFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "drop" => Ok(Self::Drop),
            "retain" => Ok(Self::Retain),
            other => Err(format!("unknown known-failure policy '{other}' (expected drop or retain)")),
        }
    }
}

impl FromStr for WriteFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "drop" => Ok(Self::Drop),
            "requeue" => Ok(Self::Requeue),
            other => Err(format!("unknown write-failure policy '{other}' (expected drop or requeue)")),
        }
    }
}

/// Classification of one raw buffer line. Borrowed lines are trimmed.
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome<'a> {
    Blank,
    KnownFailure(&'a [u8]),
    Decoded(Record),
    DecodeFailed { line: &'a [u8], error: DecodeError },
}

/// Trim surrounding whitespace. Lines that are not UTF-8 only lose ASCII
/// whitespace.
fn trim_line(raw: &[u8]) -> &[u8] {
    match std::str::from_utf8(raw) {
        Ok(text) => text.trim().as_bytes(),
        Err(_) => raw.trim_ascii(),
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records inserted and committed.
    pub committed: usize,
    pub decode_failures: usize,
    pub duplicates_dropped: usize,
    pub write_failures: usize,
    /// Lines written back to the buffer.
    pub requeued: usize,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "committed={} decode_failures={} duplicates_dropped={} write_failures={} requeued={}",
            self.committed,
            self.decode_failures,
            self.duplicates_dropped,
            self.write_failures,
            self.requeued
        )
    }
}

/// Look up the numeric id for `code` in the `countrycodes` table.
///
/// An unknown code is fatal: every row needs a country.
pub fn resolve_country_code<S: Store + ?Sized>(store: &mut S, code: &str) -> Result<i64> {
    let statement = Statement::new("SELECT id FROM `countrycodes` WHERE code = ? LIMIT 1").bind(code);
    store
        .query_scalar(&statement)?
        .ok_or_else(|| IngestError::country_code_missing(code))
}

/// Ingestion cycle runner. Owns the failure tracker and the store
/// connection, which are the only state carried between cycles.
pub struct IngestionCycle<S: Store> {
    buffer: BufferStore,
    history: Option<HistoryLog>,
    store: S,
    uploader: Uploader,
    tracker: RetryTracker,
    country_code: i64,
    known_failures: KnownFailurePolicy,
    write_failures: WriteFailurePolicy,
}

impl<S: Store> IngestionCycle<S> {
    pub fn new(buffer: BufferStore, store: S, uploader: Uploader, country_code: i64) -> Self {
        Self {
            buffer,
            history: None,
            store,
            uploader,
            tracker: RetryTracker::default(),
            country_code,
            known_failures: KnownFailurePolicy::default(),
            write_failures: WriteFailurePolicy::default(),
        }
    }

    pub fn with_history(mut self, history: HistoryLog) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_tracker(mut self, tracker: RetryTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_known_failure_policy(mut self, policy: KnownFailurePolicy) -> Self {
        self.known_failures = policy;
        self
    }

    pub fn with_write_failure_policy(mut self, policy: WriteFailurePolicy) -> Self {
        self.write_failures = policy;
        self
    }

    pub fn buffer(&self) -> &BufferStore {
        &self.buffer
    }

    pub fn tracker(&self) -> &RetryTracker {
        &self.tracker
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn classify<'a>(&self, raw: &'a [u8]) -> LineOutcome<'a> {
        let line = trim_line(raw);
        if line.is_empty() {
            return LineOutcome::Blank;
        }
        if self.tracker.is_known_failure(line) {
            return LineOutcome::KnownFailure(line);
        }
        match LineCodec::decode_bytes(line) {
            Ok(record) => LineOutcome::Decoded(record),
            Err(error) => LineOutcome::DecodeFailed { line, error },
        }
    }

    /// Run one cycle. `committed` in the report is the number of records
    /// durably written.
    ///
    /// Statement rejections are handled per line, and a rejected commit puts
    /// the cycle's lines back for the next one. A lost connection aborts the
    /// cycle: every line not yet committed goes back to the buffer and the
    /// error is returned.
    pub fn run(&mut self) -> Result<CycleReport> {
        let lines = self.buffer.drain()?;
        let mut report = CycleReport::default();
        let mut requeue: Vec<Vec<u8>> = Vec::new();
        let mut sent: Vec<&[u8]> = Vec::new();

        for (index, raw) in lines.iter().enumerate() {
            let fields = match self.classify(raw) {
                LineOutcome::Blank => continue,
                LineOutcome::KnownFailure(line) => {
                    match self.known_failures {
                        KnownFailurePolicy::Drop => {
                            debug!(line = %String::from_utf8_lossy(line), "dropping repeat of a known bad line");
                            report.duplicates_dropped += 1;
                        }
                        KnownFailurePolicy::Retain => requeue.push(line.to_vec()),
                    }
                    continue;
                }
                LineOutcome::DecodeFailed { line, error } => {
                    warn!(line = %String::from_utf8_lossy(line), %error, "could not parse line, leaving it in the buffer");
                    self.tracker.record_failure(line);
                    requeue.push(line.to_vec());
                    report.decode_failures += 1;
                    continue;
                }
                LineOutcome::Decoded(fields) => fields,
            };

            let mut record = Record::new();
            record.insert(COUNTRY_FIELD, self.country_code.to_string());
            record.extend(fields);

            match self.uploader.upload(&mut self.store, &mut record) {
                Ok(statement) => {
                    debug!(%statement, "sent");
                    sent.push(raw.as_slice());
                }
                Err(e) if e.is_fatal() => {
                    let unsent = lines[index..]
                        .iter()
                        .map(|l| trim_line(l))
                        .filter(|l| !l.is_empty())
                        .map(<[u8]>::to_vec);
                    requeue.extend(sent.iter().map(|l| trim_line(l).to_vec()));
                    requeue.extend(unsent);
                    self.buffer.reappend(&requeue)?;
                    error!(error = %e, requeued = requeue.len(), "store connection lost mid-cycle");
                    return Err(e.into());
                }
                Err(e) => {
                    error!(error = %e, ?record, "insert failed");
                    report.write_failures += 1;
                    if self.write_failures == WriteFailurePolicy::Requeue {
                        requeue.push(trim_line(raw).to_vec());
                    }
                }
            }
        }

        self.buffer.reappend(&requeue)?;
        report.requeued = requeue.len();

        if let Err(e) = self.store.commit() {
            let uncommitted: Vec<&[u8]> = sent.iter().map(|l| trim_line(*l)).collect();
            self.buffer.reappend(&uncommitted)?;
            if e.is_fatal() {
                error!(error = %e, requeued = uncommitted.len(), "commit failed, connection lost");
                return Err(e.into());
            }
            warn!(error = %e, requeued = uncommitted.len(), "commit rejected, lines kept for the next cycle");
            if let Err(e) = self.store.rollback() {
                if e.is_fatal() {
                    return Err(e.into());
                }
                warn!(error = %e, "rollback failed");
            }
            report.requeued += uncommitted.len();
            return Ok(report);
        }

        report.committed = sent.len();
        if let Some(history) = &self.history {
            if let Err(e) = history.append(&sent) {
                error!(path = %history.path().display(), error = %e, "could not write history");
            }
        }
        Ok(report)
    }
}
