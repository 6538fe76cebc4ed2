//! Getting binfmt_misc ready before changing it
//!
//! Registering, toggling or removing entries needs root, a kernel with binfmt_misc support
//! (built in, or the `binfmt_misc` module), and the filesystem mounted.

use crate::{read_file, BinfmtError, BinfmtResult, STATUS};

use log::{debug, info};
use rustix::mount::MountFlags;
use std::path::Path;
use std::process::Command;

/// Name of the filesystem type, and of the kernel module providing it.
pub const FS_TYPE: &str = "binfmt_misc";

const PROC_FILESYSTEMS: &str = "/proc/filesystems";

/// Fails with [`BinfmtError::PermissionDenied`] unless the effective user is root.
pub fn require_root() -> BinfmtResult<()> {
    if rustix::process::geteuid().is_root() {
        Ok(())
    } else {
        Err(BinfmtError::PermissionDenied(None))
    }
}

/// Returns true if `fs_type` appears in the contents of `/proc/filesystems`.
pub fn filesystem_listed(filesystems: &str, fs_type: &str) -> bool {
    filesystems
        .lines()
        .any(|line| line.split_whitespace().last() == Some(fs_type))
}

/// Returns true if the running kernel knows the binfmt_misc filesystem type.
///
/// This is taken from `/proc/filesystems`.
pub fn supported() -> BinfmtResult<bool> {
    Ok(filesystem_listed(&read_file(PROC_FILESYSTEMS)?, FS_TYPE))
}

/// Loads the binfmt_misc kernel module with `modprobe`.
pub fn load_module() -> BinfmtResult<()> {
    info!("loading the {} kernel module", FS_TYPE);
    let status = Command::new("modprobe")
        .arg(FS_TYPE)
        .status()
        .map_err(|e| BinfmtError::Mount(format!("unable to run modprobe: {}", e)))?;
    if status.success() {
        Ok(())
    } else {
        Err(BinfmtError::Mount(format!("modprobe {} failed ({})", FS_TYPE, status)))
    }
}

/// Returns true if a binfmt_misc filesystem appears to be mounted at `root`.
pub fn is_mounted<P: AsRef<Path>>(root: P) -> bool {
    root.as_ref().join(STATUS).exists()
}

/// Mounts the binfmt_misc filesystem at `root`.
pub fn mount<P: AsRef<Path>>(root: P) -> BinfmtResult<()> {
    let root = root.as_ref();
    info!("mounting {} at {}", FS_TYPE, root.display());
    rustix::mount::mount(FS_TYPE, root, FS_TYPE, MountFlags::empty(), "")
        .map_err(|e| BinfmtError::Mount(format!("mounting {} at {} failed: {}", FS_TYPE, root.display(), e)))
}

/// Loads the module and mounts the filesystem at `root`, each only if needed.
pub fn ensure_mounted<P: AsRef<Path>>(root: P) -> BinfmtResult<()> {
    let root = root.as_ref();
    if !supported()? {
        load_module()?;
    }
    if is_mounted(root) {
        debug!("{} already mounted at {}", FS_TYPE, root.display());
        Ok(())
    } else {
        mount(root)
    }
}

/// Everything a command that changes entries needs, checked in order: root, then the mount.
pub fn prepare<P: AsRef<Path>>(root: P) -> BinfmtResult<()> {
    require_root()?;
    ensure_mounted(root)
}
