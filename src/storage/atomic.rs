use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::common::error::{FaceAuthError, Result};

/// Replace `path` with `bytes` in one rename, so readers see either the old
/// file or the new one and never a partial write. The file ends up 0600.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| {
        FaceAuthError::Storage(format!("Failed to create temp file in {}: {}", parent.display(), e))
    })?;

    {
        let file = tmp.as_file_mut();
        let mut writer = BufWriter::new(&mut *file);
        writer.write_all(bytes)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tmp.as_file().metadata()?.permissions();
        perms.set_mode(0o600);
        tmp.as_file().set_permissions(perms)?;
    }

    tmp.persist(path).map_err(|e| {
        FaceAuthError::Storage(format!("Failed to persist {}: {}", path.display(), e.error))
    })?;

    Ok(())
}

/// Exclusive `flock` on a sibling `<name>.lock` file. Held until dropped;
/// closing the descriptor releases it, so it also serializes separate
/// processes and separate handles within one process.
pub struct FileLock {
    _file: File,
}

impl FileLock {
    pub fn acquire(target: &Path) -> Result<Self> {
        let lock_path = lock_path_for(target);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                FaceAuthError::Storage(format!("Failed to open lock {}: {}", lock_path.display(), e))
            })?;

        loop {
            // SAFETY: the descriptor is owned by `file` and stays open for the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(FaceAuthError::Storage(format!(
                    "Failed to lock {}: {}",
                    lock_path.display(),
                    err
                )));
            }
        }

        Ok(Self { _file: file })
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replaces_existing_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/record.bin");
        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[cfg(unix)]
    #[test]
    fn written_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("secret.bin");
        write_atomically(&path, b"x").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn lock_file_sits_next_to_target() {
        assert_eq!(
            lock_path_for(Path::new("/var/lib/facegate/accounts.json")),
            PathBuf::from("/var/lib/facegate/accounts.json.lock")
        );
    }

    #[test]
    fn second_lock_waits_for_first() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("accounts.json");
        let released = Arc::new(AtomicBool::new(false));

        let first = FileLock::acquire(&target).unwrap();
        let waiter = {
            let target = target.clone();
            let released = Arc::clone(&released);
            std::thread::spawn(move || {
                let _second = FileLock::acquire(&target).unwrap();
                released.load(Ordering::SeqCst)
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        released.store(true, Ordering::SeqCst);
        drop(first);

        assert!(waiter.join().unwrap());
    }
}
