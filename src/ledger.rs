//! Version ledger for schema archives
//!
//! The schema index lists several revisions of the same schedule, e.g.
//! `990EZ-2020v4.0.zip` and `990EZ-2020v4.1.zip`. The ledger keys each link by
//! (year, form category) and keeps only the highest (major, minor) version,
//! independent of the order links arrive in.
//!
//! Parsing is isolated in [`parse_schema_link`], which never fails: a label it
//! cannot decode degrades to version 0.0 and says so through [`ParseOutcome`].

use crate::config::LedgerConfig;
use crate::types::RemoteLink;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{debug, warn};

/// Category used when the label is too short to carry one
pub const UNKNOWN_CATEGORY: char = '_';

/// Logical key: one winner per (year, category)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionKey {
    /// Calendar year taken from the label
    pub year: String,
    /// Form category discriminant
    pub category: char,
}

impl std::fmt::Display for VersionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.year, self.category)
    }
}

/// A schedule revision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Schedule label (the link segment the version was read from)
    pub schedule: String,
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Character between major and minor, if a version token was present
    pub separator: Option<char>,
    /// Link the revision was discovered at
    pub url: String,
}

impl VersionRecord {
    /// Whether `self` strictly outranks `other` (major first, then minor)
    pub fn is_newer_than(&self, other: &VersionRecord) -> bool {
        (self.major, self.minor) > (other.major, other.minor)
    }
}

/// How a label was decoded
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Every field came from the label
    Parsed,
    /// Some field fell back to its default; the reason says which
    Defaulted(String),
}

/// Result of decoding one schema link
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedSchema {
    /// Ledger key
    pub key: VersionKey,
    /// Version carried by the link
    pub record: VersionRecord,
    /// Whether any field was defaulted
    pub outcome: ParseOutcome,
}

/// Decode a schema link into its ledger key and version
///
/// The label is the slash-delimited segment at `config.schedule_segment`
/// (the final segment when the link is shorter). A version token is the text
/// after the first `v` that is followed by a digit; its first three
/// characters are major digit, separator, minor digit.
pub fn parse_schema_link(link: &str, config: &LedgerConfig) -> ParsedSchema {
    let segments: Vec<&str> = link.split('/').collect();
    let schedule = segments
        .get(config.schedule_segment)
        .or_else(|| segments.iter().rev().find(|s| !s.is_empty()))
        .copied()
        .unwrap_or_default();

    let mut problems = Vec::new();
    let (base, major, minor, separator) = match version_split(schedule) {
        Some((base, token)) => {
            let mut chars = token.chars();
            let major = decode_digit(chars.next(), "major", &mut problems);
            let separator = chars.next();
            let minor = decode_digit(chars.next(), "minor", &mut problems);
            (base, major, minor, separator)
        }
        None => {
            problems.push("no version token".to_string());
            let base = schedule
                .rsplit_once('.')
                .map(|(stem, _)| stem)
                .unwrap_or(schedule);
            (base, 0, 0, None)
        }
    };

    let year = base.rsplit('-').next().unwrap_or_default().to_string();
    let category = base
        .split('-')
        .next()
        .and_then(|form| form.chars().nth(config.category_offset))
        .unwrap_or_else(|| {
            problems.push("no category discriminant".to_string());
            UNKNOWN_CATEGORY
        });

    let outcome = if problems.is_empty() {
        ParseOutcome::Parsed
    } else {
        ParseOutcome::Defaulted(problems.join(", "))
    };

    ParsedSchema {
        key: VersionKey { year, category },
        record: VersionRecord {
            schedule: schedule.to_string(),
            major,
            minor,
            separator,
            url: link.to_string(),
        },
        outcome,
    }
}

fn version_split(label: &str) -> Option<(&str, &str)> {
    let bytes = label.as_bytes();
    (0..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'v' && bytes[i + 1].is_ascii_digit())
        .map(|i| (&label[..i], &label[i + 1..]))
}

fn decode_digit(c: Option<char>, field: &str, problems: &mut Vec<String>) -> u32 {
    match c.and_then(|c| c.to_digit(10)) {
        Some(d) => d,
        None => {
            problems.push(format!("{} not numeric ({:?})", field, c));
            0
        }
    }
}

/// What [`VersionLedger::ingest`] did with a link
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First sighting of the key
    Inserted,
    /// Displaced a lower version
    Replaced {
        /// The record that lost
        previous: VersionRecord,
    },
    /// An equal or higher version was already ledgered
    Kept,
}

/// One ledger entry, as exposed in reports
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Ledger key
    pub key: VersionKey,
    /// Winning version
    pub record: VersionRecord,
}

/// Highest version seen per (year, category)
///
/// Owned by the caller and passed by reference; nothing here is global.
/// Ingestion is a read-modify-write, so concurrent writers must wrap the
/// ledger in a mutex.
#[derive(Clone, Debug, Default)]
pub struct VersionLedger {
    config: LedgerConfig,
    entries: BTreeMap<VersionKey, VersionRecord>,
}

impl VersionLedger {
    /// Create an empty ledger with the given filename layout
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
        }
    }

    /// Record a link, keeping it only if it outranks the current entry for its key
    pub fn ingest(&mut self, link: &str) -> IngestOutcome {
        let parsed = parse_schema_link(link, &self.config);
        if let ParseOutcome::Defaulted(reason) = &parsed.outcome {
            warn!(link, %reason, "schema label only partially parsed, using defaults");
        }

        let key = parsed.key;
        let outcome = match self.entries.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(parsed.record);
                IngestOutcome::Inserted
            }
            Entry::Occupied(mut slot) if parsed.record.is_newer_than(slot.get()) => {
                let previous = slot.insert(parsed.record);
                IngestOutcome::Replaced { previous }
            }
            Entry::Occupied(_) => IngestOutcome::Kept,
        };

        debug!(%key, ?outcome, "ledger ingest");
        outcome
    }

    /// Copy of the current ledger
    pub fn snapshot(&self) -> BTreeMap<VersionKey, VersionRecord> {
        self.entries.clone()
    }

    /// Winning entries in key order
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .map(|(key, record)| LedgerEntry {
                key: key.clone(),
                record: record.clone(),
            })
            .collect()
    }

    /// Links of the winning revisions, in key order
    pub fn download_links(&self) -> Vec<RemoteLink> {
        self.entries
            .values()
            .map(|record| RemoteLink::new(record.url.clone()))
            .collect()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been ingested
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
