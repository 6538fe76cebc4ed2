#![deny(rustdoc::broken_intra_doc_links, rustdoc::invalid_html_tags)]
//! This crate provides an interface to the linux `binfmt_misc` pseudo-filesystem, usually mounted
//! at `/proc/sys/fs/binfmt_misc`.
//!
//! `binfmt_misc` lets the kernel hand binaries that match a magic byte pattern (or a file name
//! extension) to a userspace interpreter.  Each registration shows up as a file under the mount
//! point, next to two control files: `register`, which accepts new registrations, and `status`,
//! whose presence means the facility is active.
//!
//! All state lives in the kernel.  This crate loads definition files from a configuration
//! directory (see [`Definition`]), writes them to the kernel, and reads the entries back.
//!
//! # Examples
//!
//! List registered entries:
//!
//! ```no_run
//! for entry in binfmt_misc::entries().unwrap() {
//!     println!("{} {} {}", entry.name, entry.status.state(), entry.status.interpreter);
//! }
//! ```
//!
//! Register everything in a directory, replacing what was there:
//!
//! ```no_run
//! use binfmt_misc::{BinfmtFs, Dispatcher};
//!
//! binfmt_misc::mount::prepare("/proc/sys/fs/binfmt_misc").unwrap();
//! let mut dispatcher = Dispatcher::new(BinfmtFs::default(), "/etc/binfmt-misc.d");
//! dispatcher.reload().unwrap();
//! ```
//!
//! # Cargo features
//!
//! * `serde1` -- Default.  Derives `Serialize` for the listing types.
//! * `backtrace` -- Optional.  Captures a stack trace whenever an `InternalError` is raised.

pub use binfmt_misc_core::*;

use lazy_static::lazy_static;

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where the kernel's binfmt_misc filesystem is mounted.
pub const DEFAULT_MOUNT_POINT: &str = "/proc/sys/fs/binfmt_misc";

/// Where definition files are read from.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/binfmt-misc.d";

/// Setting this variable (to anything) turns on debug output.
pub const DEBUG_ENV: &str = "BINFMT_DEBUG";

lazy_static! {
    static ref DEBUG: bool = std::env::var_os(DEBUG_ENV).is_some();
}

/// Returns true if debug output was requested through the environment.
pub fn debug_enabled() -> bool {
    *DEBUG
}

pub(crate) fn read_file<P: AsRef<Path>>(path: P) -> BinfmtResult<String> {
    let path = path.as_ref();
    Ok(fs::read_to_string(path).map_err(|e| wrap_io_error(path, e))?)
}

/// Writes `buf` to an existing file.
///
/// Opening keeps the usual `NotFound`/`PermissionDenied` mapping; once the file is open, any
/// failure of the write itself is the kernel refusing the value and becomes
/// [`BinfmtError::KernelRejected`].
pub(crate) fn write_file<P: AsRef<Path>, T: AsRef<[u8]>>(path: P, buf: T) -> BinfmtResult<()> {
    let path = path.as_ref();
    let mut f = OpenOptions::new()
        .read(false)
        .write(true)
        .open(path)
        .map_err(|e| wrap_io_error(path, e))?;
    f.write_all(buf.as_ref())
        .map_err(|source| BinfmtError::KernelRejected {
            path: path.to_owned(),
            source,
        })?;
    Ok(())
}

pub(crate) fn read_value<P, T, E>(path: P) -> BinfmtResult<T>
where
    P: AsRef<Path>,
    T: FromStr<Err = E>,
    E: fmt::Display,
{
    let path = path.as_ref();
    let val = read_file(path)?;
    <T as FromStr>::from_str(val.trim()).map_err(|e| {
        let e = std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string());
        BinfmtError::Io(e, Some(path.to_owned()))
    })
}

/// Paths and behaviour for one run of the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// The binfmt_misc mount point
    pub root: PathBuf,
    /// The directory holding definition files
    pub config_dir: PathBuf,
    pub policy: FailurePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            root: PathBuf::from(DEFAULT_MOUNT_POINT),
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            policy: FailurePolicy::default(),
        }
    }
}

mod store;
pub use crate::store::*;

pub mod mount;

mod commands;
pub use crate::commands::*;

pub mod list;
pub use crate::list::Entry;

#[cfg(test)]
mod testing;

/// Returns true if the miscellaneous Binary Formats system is enabled.
///
/// This reads the `status` file at the default mount point.
pub fn enabled() -> BinfmtResult<bool> {
    let val: String = read_value(Path::new(DEFAULT_MOUNT_POINT).join(STATUS))?;
    Ok(val == "enabled")
}

/// Returns every registered entry, with its parsed status.
///
/// If binfmt_misc is not mounted, an empty list is returned.
pub fn entries() -> BinfmtResult<Vec<Entry>> {
    Ok(list::collect(&BinfmtFs::default())?.unwrap_or_default())
}
