use crate::classify::{Candidate, classify};
use crate::sync::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::StreamExt;
use songbook_storage::error::ErrorKind as StorageErrorKind;
use songbook_storage::{Fingerprint, Fingerprinter, StorageBackend};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Files fingerprinted at once. Reads are small, the latency is in seeking.
const FINGERPRINT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub(crate) struct Discovered {
    pub(crate) candidate: Candidate,
    /// `None` when the file couldn't be read.
    pub(crate) fingerprint: Option<Fingerprint>,
}

/// What the walk found.
#[derive(Debug, Default)]
pub(crate) struct Discovery {
    pub(crate) files: BTreeMap<PathBuf, Discovered>,
    /// Directories that couldn't be listed. Their contents are unknown, not
    /// gone.
    pub(crate) unlistable: Vec<PathBuf>,
}

/// Walk the library, classify what's there and fingerprint every song.
///
/// Fails with [`ScanFailed`](ErrorKind::ScanFailed) only if the root itself
/// is unavailable; everything below the root is best effort.
pub(crate) async fn discover(
    backend: &dyn StorageBackend,
    fingerprinter: Fingerprinter,
    include_hidden: bool,
) -> Result<Discovery> {
    backend.probe().await.or_raise(|| ErrorKind::ScanFailed)?;

    let mut listing = Vec::new();
    let mut unlistable = Vec::new();
    let mut stream = backend.list_stream();
    while let Some(item) = stream.next().await {
        match item {
            // The index stores paths as text.
            Ok(meta) if meta.path.to_str().is_none() => {
                tracing::warn!(path = %meta.path.display(), "skipping file whose name is not valid UTF-8");
            },
            Ok(meta) => listing.push(meta),
            Err(err) => match &*err {
                StorageErrorKind::Unlistable(dir) => {
                    tracing::warn!(dir = %dir.display(), "directory could not be listed, keeping its entries");
                    unlistable.push(dir.clone());
                },
                kind => tracing::warn!(error = %kind, "skipping file that could not be listed"),
            },
        }
    }
    drop(stream);

    let candidates = classify(&listing, include_hidden);
    tracing::debug!(files = listing.len(), songs = candidates.len(), "library walk complete");
    let files = futures::stream::iter(candidates)
        .map(|candidate| async move {
            let fingerprint = match fingerprinter.fingerprint(backend, &candidate.path).await {
                Ok(fingerprint) => Some(fingerprint),
                Err(err) => {
                    tracing::warn!(
                        path = %candidate.path.display(),
                        error = ?err,
                        "could not fingerprint file, it won't be tracked across moves"
                    );
                    None
                },
            };
            (candidate.path.clone(), Discovered { candidate, fingerprint })
        })
        .buffered(FINGERPRINT_CONCURRENCY)
        .collect::<BTreeMap<_, _>>()
        .await;
    Ok(Discovery { files, unlistable })
}
