use crate::entry::{EntryId, LibraryEntry, Metadata};
use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use songbook_storage::Fingerprint;
use std::path::PathBuf;
use time::UtcDateTime;

/// Timestamps are stored as Unix milliseconds, so that queue order among
/// entries touched within the same second is still by age.
pub(crate) fn millis(at: UtcDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(millis: i64) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).or_raise(|| ErrorKind::InvalidData("timestamp"))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) id: i64,
    pub(crate) path: String,
    pub(crate) fingerprint: Option<String>,
    pub(crate) display_name: String,
    pub(crate) format: String,
    pub(crate) artist: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) variant: Option<String>,
    pub(crate) year: Option<i64>,
    pub(crate) genre: Option<String>,
    pub(crate) external_id: Option<String>,
    pub(crate) status: String,
    pub(crate) enrichment_attempts: i64,
    pub(crate) queued: bool,
    pub(crate) priority: i64,
    pub(crate) last_enrichment_attempt: Option<i64>,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
    pub(crate) visible: bool,
}
impl TryFrom<EntryRow> for LibraryEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self> {
        let year = row
            .year
            .map(i32::try_from)
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("year"))?;
        Ok(Self {
            id: EntryId::new(row.id),
            path: PathBuf::from(row.path),
            fingerprint: row.fingerprint.map(Fingerprint::from_hex),
            display_name: row.display_name,
            format: row.format.parse()?,
            metadata: Metadata {
                artist: row.artist,
                title: row.title,
                variant: row.variant,
                year,
                genre: row.genre,
                external_id: row.external_id,
            },
            status: row.status.parse()?,
            enrichment_attempts: u32::try_from(row.enrichment_attempts)
                .or_raise(|| ErrorKind::InvalidData("enrichment attempts"))?,
            queued: row.queued,
            priority: row.priority,
            last_enrichment_attempt: row.last_enrichment_attempt.map(from_millis).transpose()?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            visible: row.visible,
        })
    }
}
