//! Inter-process writer lock: an advisory `flock` on a `<dataset>.lock`
//! sidecar. The kernel drops the lock when the holder exits, so a writer
//! killed mid-append never leaves the report locked.

use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Pause between two attempts while another writer holds the lock
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct DatasetLock {
    path: PathBuf,
    file: File,
}

impl DatasetLock {
    pub fn lock_path(dataset: &Path) -> PathBuf {
        let mut name = dataset.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the exclusive lock, retrying for up to `wait` while another
    /// writer holds it. The sidecar file itself is never removed.
    pub fn acquire(dataset: &Path, wait: Duration) -> io::Result<Self> {
        let path = Self::lock_path(dataset);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        loop {
            match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
                Ok(()) => {
                    debug!("Acquired dataset lock {}", path.display());
                    return Ok(Self { path, file });
                }
                Err(errno) if errno == Errno::EWOULDBLOCK => {
                    if start.elapsed() >= wait {
                        return Err(io::Error::new(
                            io::ErrorKind::WouldBlock,
                            format!("dataset is locked by another writer ({})", path.display()),
                        ));
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(io::Error::from(errno)),
            }
        }
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well
        if let Err(e) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            warn!("Failed to release dataset lock {}: {}", self.path.display(), e);
        } else {
            debug!("Released dataset lock {}", self.path.display());
        }
    }
}
