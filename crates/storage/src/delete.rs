//! Recursive, identity-scoped delete (§4.3 "Delete semantics").

use once_cell::sync::Lazy;
use regex::Regex;

use stc_core::{CoordinatorError, FilesystemDriver, Result};

static DELTA_DIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(delete_)?delta_\d+_\d+_\d+$").expect("static delta-directory regex is valid")
});

/// Whether `name` (a single path component, not a full path) is a
/// transactional delta or delete-delta directory name.
pub fn is_delta_directory_name(name: &str) -> bool {
    DELTA_DIR_RE.is_match(name)
}

/// Whether `name` is one this coordinator never touches during a scoped
/// cleanup pass — a hidden file or one carrying the coordinator's own
/// staging prefix.
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn io_err(e: std::io::Error) -> CoordinatorError {
    CoordinatorError::FilesystemError(e.to_string())
}

/// Delete everything under `path` that belongs to `query_id`, leaving
/// reserved entries and other queries' files untouched; now-empty
/// subdirectories are removed along the way, unless `delete_empty_directories`
/// is `false` and the directory's name doesn't look like a transactional
/// delta directory — those are always pruned once empty regardless of the
/// flag, since a dangling `delta_.../` left over from a finished write is
/// never meaningful on its own (§4.3).
///
/// `query_id` of `None` means "everything" — the whole subtree, including
/// `path` itself, is removed; this is the cleanup-on-abort case for a
/// query's own staging root, where scoping is pointless because nothing
/// else could legitimately be there.
pub fn delete_recursive_scoped(
    fs: &dyn FilesystemDriver,
    path: &str,
    query_id: Option<&str>,
    delete_empty_directories: bool,
) -> Result<()> {
    let Some(query_id) = query_id else {
        if fs.exists(path).map_err(io_err)? {
            fs.delete(path, true).map_err(io_err)?;
        }
        return Ok(());
    };

    delete_scoped_inner(fs, path, query_id, true, delete_empty_directories)
}

fn delete_scoped_inner(
    fs: &dyn FilesystemDriver,
    path: &str,
    query_id: &str,
    is_root: bool,
    delete_empty_directories: bool,
) -> Result<()> {
    if !fs.exists(path).map_err(io_err)? {
        return Ok(());
    }
    if !fs.is_dir(path).map_err(io_err)? {
        if file_name(path).contains(query_id) {
            fs.delete(path, false).map_err(io_err)?;
        }
        return Ok(());
    }

    let entries = fs.list(path).map_err(io_err)?;
    let mut remaining = 0usize;
    for entry in entries {
        let name = file_name(&entry.path);
        if is_reserved_name(name) {
            remaining += 1;
            continue;
        }
        if entry.is_dir {
            delete_scoped_inner(fs, &entry.path, query_id, false, delete_empty_directories)?;
            if fs.exists(&entry.path).map_err(io_err)? {
                remaining += 1;
            }
        } else if name.contains(query_id) {
            fs.delete(&entry.path, false).map_err(io_err)?;
        } else {
            remaining += 1;
        }
    }

    if !is_root && remaining == 0 && (delete_empty_directories || is_delta_directory_name(file_name(path))) {
        fs.delete(path, false).map_err(io_err)?;
    }
    Ok(())
}
