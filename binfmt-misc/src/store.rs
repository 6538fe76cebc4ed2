use crate::{is_entry_name, is_reserved, read_file, write_file, wrap_io_error, BinfmtError, BinfmtResult, DEFAULT_MOUNT_POINT};

use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Access to the files under a binfmt_misc mount point.
///
/// Names are file names directly under the mount point: either a registered entry, or one of the
/// control files [`REGISTER`](crate::REGISTER) and [`STATUS`](crate::STATUS).
pub trait EntryStore {
    /// Names of the registered entries, without the control files, sorted.
    fn entries(&self) -> BinfmtResult<Vec<String>>;

    /// Returns true if a file called `name` exists.
    fn exists(&self, name: &str) -> bool;

    /// Reads the whole file called `name`.
    fn read(&self, name: &str) -> BinfmtResult<String>;

    /// Writes `value` to the file called `name`, in a single write.
    ///
    /// A failure the kernel reports is returned as [`BinfmtError::KernelRejected`].
    fn write(&mut self, name: &str, value: &str) -> BinfmtResult<()>;
}

/// The binfmt_misc filesystem, as mounted at some path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinfmtFs {
    root: PathBuf,
}

impl BinfmtFs {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        BinfmtFs { root: root.into() }
    }

    /// The mount point
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file for `name`, which must name something directly under the mount point.
    fn path(&self, name: &str) -> BinfmtResult<PathBuf> {
        if is_entry_name(name) {
            Ok(self.root.join(name))
        } else {
            Err(BinfmtError::NotFound(Some(PathBuf::from(name))))
        }
    }
}

impl Default for BinfmtFs {
    fn default() -> Self {
        BinfmtFs::new(DEFAULT_MOUNT_POINT)
    }
}

impl EntryStore for BinfmtFs {
    fn entries(&self) -> BinfmtResult<Vec<String>> {
        let dir = fs::read_dir(&self.root).map_err(|e| wrap_io_error(&self.root, e))?;
        let mut names = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| wrap_io_error(&self.root, e))?;
            if let Ok(name) = entry.file_name().into_string() {
                if !is_reserved(&name) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).map_or(false, |p| p.exists())
    }

    fn read(&self, name: &str) -> BinfmtResult<String> {
        read_file(self.path(name)?)
    }

    fn write(&mut self, name: &str, value: &str) -> BinfmtResult<()> {
        let path = self.path(name)?;
        debug!("writing {:?} to {}", value, path.display());
        write_file(&path, value).map_err(|e| match e {
            BinfmtError::Io(source, _) => BinfmtError::KernelRejected { path, source },
            e => e,
        })
    }
}
