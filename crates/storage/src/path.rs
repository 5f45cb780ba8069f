//! Library-relative path validation.
//!
//! Every path stored in the index is relative to the library root. These
//! helpers make sure a path can't climb out of that root and that two
//! spellings of the same location compare equal.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a library-relative path.
///
/// `.` components and repeated or trailing separators are dropped, `..` is
/// resolved lexically and rejected if it would leave the library root. Null
/// bytes and Windows prefixes are rejected outright.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use songbook_storage::validate_path;
/// assert!(validate_path("Queen/Bohemian Rhapsody.mp3").is_ok());
/// assert!(validate_path("../outside.mp3").is_err());
/// assert_eq!(
///     validate_path("Queen/./Live//../Bohemian Rhapsody.mp4").unwrap(),
///     Path::new("Queen/Bohemian Rhapsody.mp4")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Components keep interior nulls on Unix; the syscalls don't.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}
