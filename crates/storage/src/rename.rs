//! Directory rename semantics (§4.3 "Rename semantics").

use stc_core::{CoordinatorError, FilesystemDriver, Result};

/// Rename directory `src` to `dst`.
///
/// Fails with [`CoordinatorError::PathAlreadyExists`] if `dst` already
/// exists; creates `dst`'s parent directory first if it is missing. A
/// successful rename is reversible only by renaming back — there is no
/// copy fallback.
pub fn rename_directory(fs: &dyn FilesystemDriver, src: &str, dst: &str) -> Result<()> {
    if fs
        .exists(dst)
        .map_err(|e| CoordinatorError::FilesystemError(e.to_string()))?
    {
        return Err(CoordinatorError::PathAlreadyExists(dst.to_string()));
    }

    if let Some(parent) = dst.rsplit_once('/').map(|(p, _)| p) {
        if !parent.is_empty()
            && !fs
                .exists(parent)
                .map_err(|e| CoordinatorError::FilesystemError(e.to_string()))?
        {
            fs.mkdirs(parent)
                .map_err(|e| CoordinatorError::FilesystemError(e.to_string()))?;
        }
    }

    let renamed = fs
        .rename(src, dst)
        .map_err(map_rename_io_error)?;
    if !renamed {
        return Err(CoordinatorError::FilesystemError(format!(
            "rename of {src} to {dst} was declined by the filesystem driver"
        )));
    }
    Ok(())
}

fn map_rename_io_error(e: std::io::Error) -> CoordinatorError {
    match e.kind() {
        std::io::ErrorKind::AlreadyExists => CoordinatorError::PathAlreadyExists(e.to_string()),
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionAborted => {
            CoordinatorError::FilesystemClosed(e.to_string())
        }
        _ => CoordinatorError::FilesystemError(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stc_core::testing::InMemoryFilesystem;

    #[test]
    fn rename_fails_when_target_exists() {
        let fs = InMemoryFilesystem::default();
        fs.seed_dir("/src");
        fs.seed_dir("/dst");

        let err = rename_directory(&fs, "/src", "/dst").unwrap_err();
        assert!(matches!(err, CoordinatorError::PathAlreadyExists(_)));
        // Source must remain intact.
        assert!(fs.exists("/src").unwrap());
    }

    #[test]
    fn rename_creates_missing_parent() {
        let fs = InMemoryFilesystem::default();
        fs.seed_dir("/src");
        rename_directory(&fs, "/src", "/new_parent/dst").unwrap();
        assert!(fs.exists("/new_parent").unwrap());
        assert!(fs.exists("/new_parent/dst").unwrap());
        assert!(!fs.exists("/src").unwrap());
    }
}
