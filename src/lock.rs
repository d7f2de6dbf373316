//! The cluster-wide recovery lock (§3, §6). The collaborator itself is
//! external (typically a shared-filesystem lock file); this module only
//! pins the trait boundary plus a `cfg(unix)` `flock(2)` implementation.

use crate::error::Result;

/// Acquire / probe / release the recovery-master lock.
///
/// `probe` issues a `read()` on the held descriptor to detect an external
/// unlock - a dropped lock looks like end-of-file or an I/O error, both of
/// which `probe` folds into `false`.
pub trait RecoveryLock: Send {
    fn acquire(&mut self, blocking: bool) -> Result<()>;
    fn probe(&mut self) -> bool;
    fn release(&mut self);
}

#[cfg(unix)]
pub mod unix {
    use std::fs::{File, OpenOptions};
    use std::io::Read;
    use std::os::unix::io::AsRawFd;
    use std::path::PathBuf;

    use super::RecoveryLock;
    use crate::error::{RecoveryError, Result};

    /// `flock(2)`-based lock over a path shared by every node in the
    /// cluster (e.g. a shared filesystem).
    pub struct FlockRecoveryLock {
        path: PathBuf,
        file: Option<File>,
    }

    impl FlockRecoveryLock {
        pub fn new(path: PathBuf) -> Self { FlockRecoveryLock { path, file: None } }
    }

    impl RecoveryLock for FlockRecoveryLock {
        fn acquire(&mut self, blocking: bool) -> Result<()> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&self.path)
                .map_err(|e| RecoveryError::LockLost(format!("opening lock file {:?}: {}", self.path, e)))?;

            let op = if blocking { libc::LOCK_EX } else { libc::LOCK_EX | libc::LOCK_NB };
            let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
            if rc != 0 {
                return Err(RecoveryError::LockLost(format!(
                    "flock({:?}) failed: {}",
                    self.path,
                    std::io::Error::last_os_error()
                )));
            }
            self.file = Some(file);
            Ok(())
        }

        fn probe(&mut self) -> bool {
            match &mut self.file {
                None => false,
                Some(file) => {
                    let mut buf = [0u8; 1];
                    // A held flock still permits reads; failure or EOF means
                    // the descriptor (and thus the lock) is gone.
                    file.read(&mut buf).is_ok()
                }
            }
        }

        fn release(&mut self) {
            if let Some(file) = self.file.take() {
                let _ = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
            }
        }
    }

    impl Drop for FlockRecoveryLock {
        fn drop(&mut self) { self.release(); }
    }
}
