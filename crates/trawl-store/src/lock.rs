use crate::paths::OutputPaths;
use fs2::FileExt;
use std::fs::{File, OpenOptions};

/// Exclusive lock on an output directory, backed by `.trawl.lock`.
/// Keeps two runs from writing the same record set. Released on drop.
pub struct OutputLock {
    _file: File,
}

impl OutputLock {
    /// Try to acquire the lock (non-blocking).
    pub fn acquire(paths: &OutputPaths) -> anyhow::Result<Self> {
        paths.ensure_layout()?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&paths.lock_file)
            .map_err(|e| {
                anyhow::anyhow!("cannot open lock file {}: {}", paths.lock_file.display(), e)
            })?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "output directory is in use by another run ({})",
                paths.lock_file.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}
