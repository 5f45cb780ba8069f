//! Deciding which files are songs, and what kind.
//!
//! A song is either a single file (a zipped MP3+CDG pair, or a video) or a
//! primary file plus a sidecar with the same base name in the same directory
//! (`song.mp3` + `song.cdg`, `song.mp4` + `song.ass`). Sidecars are folded into
//! their primary's entry and never become entries of their own. Base name and
//! extension comparisons ignore case.

use songbook_cache::Format;
use songbook_storage::FileMeta;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "avi", "webm"];

/// A file that will be indexed as a song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Primary file, relative to the library root.
    pub path: PathBuf,
    pub format: Format,
    /// File name of the primary file.
    pub display_name: String,
    /// File name without its extension, the input to label parsing.
    pub stem: String,
}

fn is_hidden(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Pick out the songs from a listing. Output is sorted by path.
///
/// Files inside hidden directories, and hidden files themselves, are ignored
/// unless `include_hidden` is set.
pub fn classify(files: &[FileMeta], include_hidden: bool) -> Vec<Candidate> {
    let files: Vec<&FileMeta> = files.iter().filter(|f| include_hidden || !is_hidden(&f.path)).collect();
    // (directory, lower-cased file name) of everything present.
    let present: HashSet<(&Path, String)> = files
        .iter()
        .filter_map(|f| Some((f.path.parent()?, f.file_name().to_lowercase())))
        .collect();
    let has_sidecar = |path: &Path, stem: &str, extension: &str| {
        let dir = path.parent().unwrap_or(Path::new(""));
        present.contains(&(dir, format!("{}.{extension}", stem.to_lowercase())))
    };

    let mut candidates: Vec<Candidate> = files
        .iter()
        .filter_map(|file| {
            let path = &file.path;
            let extension = lowercase_extension(path)?;
            let stem = path.file_stem()?.to_string_lossy().to_string();
            let format = match extension.as_str() {
                "mp3" if has_sidecar(path, &stem, "cdg") => Format::Cdg,
                "zip" => Format::Zip,
                ext if VIDEO_EXTENSIONS.contains(&ext) => match has_sidecar(path, &stem, "ass") {
                    true => Format::VideoAss,
                    false => Format::Video,
                },
                // Sidecars, lone MP3s and anything else.
                _ => return None,
            };
            Some(Candidate {
                path: path.clone(),
                format,
                display_name: file.file_name(),
                stem,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    candidates
}
