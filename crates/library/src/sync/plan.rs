//! Reconciliation: what has to change in the store to match the disk.
//!
//! Planning is pure, so every rule here is tested without a database or a
//! filesystem. Given the same inputs it always produces the same plan: paths
//! new on disk are handled in sorted order and missing entries by ascending
//! id, which decides who wins when fingerprints collide.

use crate::label::LabelParser;
use crate::sync::ReconciliationReport;
use crate::sync::discover::Discovered;
use songbook_cache::{Change, EntryId, LibraryEntry, NewEntry};
use songbook_storage::Fingerprint;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub(crate) changes: Vec<Change>,
    pub(crate) report: ReconciliationReport,
}

pub(crate) struct Inputs<'a> {
    pub(crate) disk: &'a BTreeMap<PathBuf, Discovered>,
    /// Live entries, by ascending id.
    pub(crate) live: &'a [LibraryEntry],
    /// Soft-deleted entries that could be brought back, preferred first.
    pub(crate) hidden: &'a [(EntryId, Fingerprint)],
    /// Directories whose contents are unknown this time round.
    pub(crate) unlistable: &'a [PathBuf],
    pub(crate) parser: &'a dyn LabelParser,
    pub(crate) default_priority: i64,
}

pub(crate) fn plan(inputs: Inputs<'_>) -> Plan {
    let Inputs { disk, live, hidden, unlistable, parser, default_priority } = inputs;
    let mut plan = Plan::default();
    let live_by_path: HashMap<&Path, &LibraryEntry> = live.iter().map(|e| (e.path.as_path(), e)).collect();

    // Same path: has the file changed underneath us?
    for (path, found) in disk {
        let Some(entry) = live_by_path.get(path.as_path()) else { continue };
        // An unreadable file can't be compared; keep what we knew.
        let content_changed = found.fingerprint.is_some() && found.fingerprint != entry.fingerprint;
        if content_changed || found.candidate.format != entry.format {
            plan.changes.push(Change::Refresh {
                id: entry.id,
                fingerprint: found.fingerprint.clone().or_else(|| entry.fingerprint.clone()),
                format: found.candidate.format,
                display_name: found.candidate.display_name.clone(),
                label_status: parser.parse(&found.candidate.stem).status,
                priority: default_priority,
            });
            plan.report.updated += 1;
        }
    }

    let is_protected = |path: &Path| unlistable.iter().any(|dir| path.starts_with(dir));
    let missing: Vec<&LibraryEntry> = live
        .iter()
        .filter(|e| !disk.contains_key(&e.path) && !is_protected(&e.path))
        .collect();
    let mut missing_by_fingerprint: HashMap<&Fingerprint, EntryId> = HashMap::new();
    for entry in &missing {
        if let Some(fingerprint) = &entry.fingerprint {
            missing_by_fingerprint.entry(fingerprint).or_insert(entry.id);
        }
    }
    let mut hidden_by_fingerprint: HashMap<&Fingerprint, EntryId> = HashMap::new();
    for (id, fingerprint) in hidden {
        hidden_by_fingerprint.entry(fingerprint).or_insert(*id);
    }

    let mut moved: HashSet<EntryId> = HashSet::new();
    for (path, found) in disk.iter().filter(|(path, _)| !live_by_path.contains_key(path.as_path())) {
        let candidate = &found.candidate;
        if let Some(fingerprint) = &found.fingerprint {
            if let Some(id) = missing_by_fingerprint.remove(fingerprint) {
                plan.changes.push(Change::Move {
                    id,
                    path: path.clone(),
                    display_name: candidate.display_name.clone(),
                    format: candidate.format,
                });
                moved.insert(id);
                plan.report.moved += 1;
                continue;
            }
            if let Some(id) = hidden_by_fingerprint.remove(fingerprint) {
                plan.changes.push(Change::Restore {
                    id,
                    path: path.clone(),
                    display_name: candidate.display_name.clone(),
                    format: candidate.format,
                });
                plan.report.added += 1;
                continue;
            }
        }
        let label = parser.parse(&candidate.stem);
        let entry = NewEntry::new(path, candidate.display_name.clone(), candidate.format)
            .with_fingerprint(found.fingerprint.clone())
            .with_metadata(label.metadata, label.status)
            .with_priority(default_priority);
        plan.changes.push(Change::Insert(entry));
        plan.report.added += 1;
    }

    for entry in missing.into_iter().filter(|e| !moved.contains(&e.id)) {
        plan.changes.push(Change::Hide { id: entry.id });
        plan.report.deleted += 1;
    }
    plan
}
