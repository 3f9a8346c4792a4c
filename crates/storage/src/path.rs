//! Path validation.
//!
//! Every path handed to a backend is relative to the library root. This
//! module makes sure it stays that way.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalises a storage path so that it cannot escape the
/// storage root (no `..` traversal past the top, no absolute prefixes).
///
/// Leading `/` and `.` components are dropped, `..` is resolved lexically,
/// and null bytes are rejected. An empty result is an error.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use booksing_storage::validate_path;
/// assert!(validate_path("Herbert, Frank/Dune.epub").is_ok());
/// assert!(validate_path("scifi/../fantasy/earthsea.epub").is_ok());
/// assert!(validate_path("../outside.epub").is_err());
/// assert!(validate_path("scifi/../../outside.epub").is_err());
/// assert_eq!(
///     validate_path("./scifi//old/../dune.epub").unwrap(),
///     Path::new("scifi/dune.epub")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Path::components() lets null bytes through on Unix.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
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
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.into_iter().collect()),
    }
}
