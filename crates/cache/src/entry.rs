//! Library entry models.

use crate::error::{Error, ErrorKind};
use derive_more::Display;
use songbook_storage::Fingerprint;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::UtcDateTime;

/// Database identity of an entry. Survives moves, renames and content
/// changes; only a brand-new file gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct EntryId(i64);
impl EntryId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

/// How much an entry's metadata can be trusted.
///
/// Variants are declared in ascending order of trust, so `Ord` compares
/// trust. [`Failed`](Self::Failed) sorts lowest: automation gave up on it.
/// [`Manual`](Self::Manual) sorts highest and is never overwritten by
/// anything automated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Failed,
    Fallback,
    ParsedWeak,
    ParsedStrong,
    ApiEnriched,
    ApiVerified,
    Manual,
}
impl Status {
    /// Statuses an entry can be queued for enrichment in.
    pub const QUEUEABLE: [Status; 3] = [Status::Fallback, Status::ParsedWeak, Status::ParsedStrong];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Fallback => "fallback",
            Self::ParsedWeak => "parsed-weak",
            Self::ParsedStrong => "parsed-strong",
            Self::ApiEnriched => "api-enriched",
            Self::ApiVerified => "api-verified",
            Self::Manual => "manual",
        }
    }

    pub fn is_queueable(self) -> bool {
        Self::QUEUEABLE.contains(&self)
    }

    /// Metadata came from an external service or a person.
    pub fn is_complete(self) -> bool {
        self >= Self::ApiEnriched
    }

    /// Enrichment has given up; only a content change or a manual edit moves
    /// the entry on.
    pub fn is_terminal(self) -> bool {
        self == Self::Failed
    }
}
impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for Status {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "failed" => Self::Failed,
            "fallback" => Self::Fallback,
            "parsed-weak" => Self::ParsedWeak,
            "parsed-strong" => Self::ParsedStrong,
            "api-enriched" => Self::ApiEnriched,
            "api-verified" => Self::ApiVerified,
            "manual" => Self::Manual,
            _ => exn::bail!(ErrorKind::InvalidData("status")),
        })
    }
}

/// What kind of media an entry is. Paired formats are stored as one entry
/// keyed on the primary file; the sidecar is never an entry of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// MP3 audio with a CD+G graphics sidecar (`.cdg`) of the same name.
    Cdg,
    /// Zipped MP3+CDG pair.
    Zip,
    /// Video with burned-in lyrics.
    Video,
    /// Video with an `.ass` subtitle sidecar of the same name.
    VideoAss,
}
impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cdg => "cdg",
            Self::Zip => "zip",
            Self::Video => "video",
            Self::VideoAss => "video+ass",
        }
    }

    /// Extension of the companion file this format depends on, if any.
    pub fn sidecar_extension(self) -> Option<&'static str> {
        match self {
            Self::Cdg => Some("cdg"),
            Self::VideoAss => Some("ass"),
            Self::Zip | Self::Video => None,
        }
    }
}
impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for Format {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "cdg" => Self::Cdg,
            "zip" => Self::Zip,
            "video" => Self::Video,
            "video+ass" => Self::VideoAss,
            _ => exn::bail!(ErrorKind::InvalidData("format")),
        })
    }
}

/// Descriptive fields, filled in progressively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub artist: Option<String>,
    pub title: Option<String>,
    /// Free-form version label ("Live", "Duet", "Key of G").
    pub variant: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    /// Identifier of the song at whichever external service matched it.
    pub external_id: Option<String>,
}
impl Metadata {
    /// Overwrite fields with those present in `other`, keeping the rest.
    pub fn merge(&mut self, other: Metadata) {
        fn take<T>(field: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *field = value;
            }
        }
        take(&mut self.artist, other.artist);
        take(&mut self.title, other.title);
        take(&mut self.variant, other.variant);
        take(&mut self.year, other.year);
        take(&mut self.genre, other.genre);
        take(&mut self.external_id, other.external_id);
    }
}

/// One indexed song as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub id: EntryId,
    /// Location relative to the library root.
    pub path: PathBuf,
    /// `None` when the file couldn't be read; such entries can't be tracked
    /// across moves.
    pub fingerprint: Option<Fingerprint>,
    pub display_name: String,
    pub format: Format,
    pub metadata: Metadata,
    pub status: Status,
    pub enrichment_attempts: u32,
    pub queued: bool,
    pub priority: i64,
    pub last_enrichment_attempt: Option<UtcDateTime>,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
    /// Cleared when the file disappears from disk.
    pub visible: bool,
}

/// A song discovered for the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub path: PathBuf,
    pub fingerprint: Option<Fingerprint>,
    pub display_name: String,
    pub format: Format,
    pub metadata: Metadata,
    pub status: Status,
    /// Queue priority, used if `status` is queueable.
    pub priority: i64,
}
impl NewEntry {
    pub fn new(path: impl AsRef<Path>, display_name: impl Into<String>, format: Format) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fingerprint: None,
            display_name: display_name.into(),
            format,
            metadata: Metadata::default(),
            status: Status::Fallback,
            priority: 0,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Option<Fingerprint>) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata, status: Status) -> Self {
        self.metadata = metadata;
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}
