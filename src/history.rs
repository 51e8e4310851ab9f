//! Per-channel segmented history log.
//!
//! Layout: `<root>/box_<ch>_<seg>.log`, segments numbered from 0, ten lines
//! each.  Every line is `YYYY-MM-DD HH:MM:SS,<4-char text>\n`.
//!
//! One writer per channel (the channel's producer task).  Readers may run
//! concurrently with a write; a torn last line fails to parse and is
//! dropped.  No fsync between writes.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{debug, warn};

use crate::adapters::time::wall_clock_stamp;
use crate::channel::display::{SegmentText, DIGITS};
use crate::error::HistoryError;
use crate::events::ChannelIndex;

/// `chrono` format of the timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lines per segment file.
pub const SEGMENT_CAPACITY: usize = 10;

const TIMESTAMP_LEN: usize = 19;

/// One history line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub ts: String,
    pub text: String,
}

impl HistoryEntry {
    /// Parse one line (without its newline).  Malformed lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (ts, text) = line.split_once(',')?;
        if ts.len() != TIMESTAMP_LEN || text.chars().count() != DIGITS {
            return None;
        }
        NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            ts: ts.to_owned(),
            text: text.to_owned(),
        })
    }

    fn to_line(&self) -> String {
        format!("{},{}\n", self.ts, self.text)
    }
}

/// Segment files under one root directory.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    root: PathBuf,
}

impl HistoryLog {
    /// Open (creating if needed) the log directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn segment_path(&self, ch: ChannelIndex, seg: u32) -> PathBuf {
        self.root.join(format!("box_{ch}_{seg}.log"))
    }

    /// Existing segment numbers for `ch`, ascending.
    pub fn list_segments(&self, ch: ChannelIndex) -> Result<Vec<u32>, HistoryError> {
        let prefix = format!("box_{ch}_");
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut segs = Vec::new();
        for entry in dir {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let seg = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".log"))
                .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(seg) = seg {
                segs.push(seg);
            }
        }
        segs.sort_unstable();
        Ok(segs)
    }

    /// Entries of one segment.  A missing segment reads as empty.
    pub fn read_segment(&self, ch: ChannelIndex, seg: u32) -> Result<Vec<HistoryEntry>, HistoryError> {
        let content = match fs::read(self.segment_path(ch, seg)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(String::from_utf8_lossy(&content)
            .lines()
            .filter_map(HistoryEntry::parse_line)
            .collect())
    }

    /// Every entry of `ch`, oldest first.
    pub fn read_all(&self, ch: ChannelIndex) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut all = Vec::new();
        for seg in self.list_segments(ch)? {
            all.extend(self.read_segment(ch, seg)?);
        }
        Ok(all)
    }

    /// Most recent entry of `ch`, if any.
    pub fn last_entry(&self, ch: ChannelIndex) -> Result<Option<HistoryEntry>, HistoryError> {
        for seg in self.list_segments(ch)?.into_iter().rev() {
            if let Some(last) = self.read_segment(ch, seg)?.pop() {
                return Ok(Some(last));
            }
        }
        Ok(None)
    }

    /// Append `text` stamped with the local wall clock.
    pub fn append(&self, ch: ChannelIndex, text: &str) -> Result<(), HistoryError> {
        self.append_at(ch, &wall_clock_stamp(), text)
    }

    /// Append with an explicit timestamp.  Picks the largest segment and
    /// rolls over to the next one once it holds [`SEGMENT_CAPACITY`] lines.
    pub fn append_at(&self, ch: ChannelIndex, ts: &str, text: &str) -> Result<(), HistoryError> {
        let mut seg = self.list_segments(ch)?.last().copied().unwrap_or(0);
        let mut path = self.segment_path(ch, seg);

        let (entries, torn) = match fs::read(&path) {
            Ok(bytes) => segment_stats(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => (0, false),
            Err(e) => return Err(e.into()),
        };

        let mut terminate_torn = torn;
        if entries >= SEGMENT_CAPACITY {
            seg += 1;
            path = self.segment_path(ch, seg);
            terminate_torn = false;
            debug!("history: box {ch} rolling to segment {seg}");
        }

        let entry = HistoryEntry {
            ts: ts.to_owned(),
            text: text.to_owned(),
        };
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if terminate_torn {
            file.write_all(b"\n")?;
        }
        file.write_all(entry.to_line().as_bytes())?;
        Ok(())
    }
}

/// Readable entries in a segment, and whether its last line lacks its
/// newline.  Torn or malformed lines do not count toward capacity.
fn segment_stats(bytes: &[u8]) -> (usize, bool) {
    let torn = bytes.last().is_some_and(|&b| b != b'\n');
    let entries = String::from_utf8_lossy(bytes)
        .lines()
        .filter(|line| HistoryEntry::parse_line(line).is_some())
        .count();
    (entries, torn)
}

/// Write-side recorder for one channel: deduplicates against the last
/// written text and never records a blank display.
#[derive(Debug)]
pub struct ChannelHistory {
    log: HistoryLog,
    ch: ChannelIndex,
    last_written: Option<String>,
}

impl ChannelHistory {
    /// Seeds the dedup state from the newest entry already on disk.
    pub fn new(log: HistoryLog, ch: ChannelIndex) -> Self {
        let last_written = match log.last_entry(ch) {
            Ok(entry) => entry.map(|e| e.text),
            Err(e) => {
                warn!("history: box {ch} could not read last entry: {e}");
                None
            }
        };
        Self {
            log,
            ch,
            last_written,
        }
    }

    pub fn last_written(&self) -> Option<&str> {
        self.last_written.as_deref()
    }

    /// Append `text` if it differs from the last written text and is not
    /// blank.  I/O failures are logged and the entry dropped; the same text
    /// is retried on the next sample.  Returns whether a line was written.
    pub fn record(&mut self, text: &SegmentText) -> bool {
        if text.is_blank() || self.last_written.as_deref() == Some(text.as_str()) {
            return false;
        }
        match self.log.append(self.ch, text.as_str()) {
            Ok(()) => {
                self.last_written = Some(text.as_str().to_owned());
                true
            }
            Err(e) => {
                warn!("history: box {} append dropped: {e}", self.ch);
                false
            }
        }
    }
}
