use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Moves `from` to `to`, creating parent directories. Tries an atomic
/// rename first; if that fails (e.g. across volumes) copies then deletes
/// the source. Never overwrites an existing target.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if to.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        ));
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(from = %from.display(), error = %e, "rename failed, copying instead");
            fs::copy(from, to)?;
            if let Err(e) = fs::remove_file(from) {
                // leave exactly one copy behind
                let _ = fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_into_new_directories() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        fs::write(&from, b"hello").unwrap();
        let to = dir.path().join("x").join("y").join("a.txt");

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"hello");
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        let err = move_file(&from, &to).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"old");
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_file(&dir.path().join("nope"), &dir.path().join("out").join("nope"));
        assert!(err.is_err());
    }
}
