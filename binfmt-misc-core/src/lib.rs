#![deny(rustdoc::broken_intra_doc_links, rustdoc::invalid_html_tags)]
//! Data structures and parsing for the linux `binfmt_misc` pseudo-filesystem, usually mounted at
//! `/proc/sys/fs/binfmt_misc`.
//!
//! This crate does not touch the pseudo-filesystem itself.  It knows how to:
//!
//! * load a [`Definition`] from a `key: value` definition file,
//! * encode a definition into the line the kernel's `register` file accepts,
//! * parse the contents of a registered entry's file into an [`EntryStatus`],
//! * name the values ([`Sentinel`]) that enable, disable or remove an entry.
//!
//! The `binfmt-misc` crate builds on top of this one to actually read and write the kernel's
//! control files.
//!
//! # Cargo features
//!
//! * `serde1` -- Optional.  Derives `Serialize` and `Deserialize` for the data types.
//! * `backtrace` -- Optional.  Captures a stack trace whenever an [`InternalError`] is raised.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

macro_rules! build_internal_error {
    ($err: expr) => {
        crate::BinfmtError::InternalError(crate::InternalError {
            msg: format!("Internal Unwrap Error: {}", $err),
            file: file!(),
            line: line!(),
            #[cfg(feature = "backtrace")]
            backtrace: backtrace::Backtrace::new(),
        })
    };
    ($err: expr, $msg: expr) => {
        crate::BinfmtError::InternalError(crate::InternalError {
            msg: format!("Internal Unwrap Error: {}: {}", $msg, $err),
            file: file!(),
            line: line!(),
            #[cfg(feature = "backtrace")]
            backtrace: backtrace::Backtrace::new(),
        })
    };
}

macro_rules! expect {
    ($e:expr) => {
        match crate::IntoResult::into($e) {
            Ok(v) => v,
            Err(e) => return Err(build_internal_error!(e)),
        }
    };
    ($e:expr, $msg:expr) => {
        match crate::IntoResult::into($e) {
            Ok(v) => v,
            Err(e) => return Err(build_internal_error!(e, $msg)),
        }
    };
}

macro_rules! from_str {
    ($t:tt, $e:expr) => {{
        let e = $e;
        expect!(
            $t::from_str_radix(e, 10),
            format!("Failed to parse {} ({:?}) as a {}", stringify!($e), e, stringify!($t),)
        )
    }};
}

mod definition;
pub use definition::*;

mod encode;
pub use encode::*;

mod entry;
pub use entry::*;

/// Name of the write-only file that accepts new registrations.
pub const REGISTER: &str = "register";

/// Name of the file that reports (and controls) the state of the whole facility.
pub const STATUS: &str = "status";

/// Returns true if `name` is one of the two control files every binfmt_misc mount contains.
///
/// These are never registered entries.
pub fn is_reserved(name: &str) -> bool {
    name == REGISTER || name == STATUS
}

/// Returns true if `name` can be a file directly under the mount point.
///
/// Empty names, `.`, `..` and anything containing a `/` would resolve to some other path.
pub fn is_entry_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}

#[doc(hidden)]
pub trait IntoResult<T, E> {
    fn into(t: Self) -> Result<T, E>;
}

/// Error returned by `expect!` when unwrapping a `None`.
#[doc(hidden)]
#[derive(Debug)]
pub struct NoneError;

impl fmt::Display for NoneError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NoneError")
    }
}

impl<T> IntoResult<T, NoneError> for Option<T> {
    fn into(t: Option<T>) -> Result<T, NoneError> {
        t.ok_or(NoneError)
    }
}

impl<T, E> IntoResult<T, E> for Result<T, E> {
    fn into(t: Result<T, E>) -> Result<T, E> {
        t
    }
}

/// A type that can be parsed from the contents of a binfmt_misc related file.
pub trait FromBufRead: Sized {
    fn from_buf_read<R: BufRead>(r: R) -> BinfmtResult<Self>;

    /// Parse the file at `path`.
    fn from_file<P: AsRef<Path>>(path: P) -> BinfmtResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| wrap_io_error(path, e))?;
        Self::from_buf_read(BufReader::new(file))
    }
}

/// Attach `path` to an io error, so that the resulting [`BinfmtError`] can report it.
#[doc(hidden)]
pub fn wrap_io_error<P: AsRef<Path>>(path: P, e: io::Error) -> io::Error {
    let kind = e.kind();
    io::Error::new(
        kind,
        IoErrorWrapper {
            path: path.as_ref().to_owned(),
            inner: e,
        },
    )
}

/// An io error that remembers which file it came from.
#[doc(hidden)]
#[derive(Debug)]
pub struct IoErrorWrapper {
    pub path: PathBuf,
    pub inner: io::Error,
}

impl std::error::Error for IoErrorWrapper {}

impl fmt::Display for IoErrorWrapper {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IoErrorWrapper({}): {}", self.path.display(), self.inner)
    }
}

/// The result type for any function that can return a [`BinfmtError`].
pub type BinfmtResult<T> = Result<T, BinfmtError>;

/// The various error conditions in the binfmt-misc crates.
#[derive(Debug)]
pub enum BinfmtError {
    /// The caller lacks the privilege needed for an operation.
    ///
    /// When the path is `None`, the process is not running as root.
    PermissionDenied(Option<PathBuf>),
    /// Loading the kernel module or mounting the pseudo-filesystem failed.
    Mount(String),
    /// A required command line argument was not given.
    MissingArgument(&'static str),
    /// A definition file or a registered entry does not exist.
    NotFound(Option<PathBuf>),
    /// A definition file has no value (or an empty value) for a required field.
    MissingField {
        field: &'static str,
        path: Option<PathBuf>,
    },
    /// An entry with this name is already registered.
    Duplicate(String),
    /// The kernel refused a write to one of its control files.
    KernelRejected { path: PathBuf, source: io::Error },
    /// Any other io error.
    Io(io::Error, Option<PathBuf>),
    /// Several items of a batch operation failed.
    ///
    /// Each element is the item (an entry name or a definition file) paired with its error.
    Batch(Vec<(String, BinfmtError)>),
    /// This is a bug in the binfmt-misc crates.  Please report it.
    InternalError(InternalError),
}

/// An internal error in the binfmt-misc crates
///
/// If you encounter this error, consider it a bug and please report it.
pub struct InternalError {
    pub msg: String,
    pub file: &'static str,
    pub line: u32,
    #[cfg(feature = "backtrace")]
    pub backtrace: backtrace::Backtrace,
}

impl fmt::Debug for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "bug at {}:{} (please report this binfmt-misc bug)\n{}",
            self.file, self.line, self.msg
        )
    }
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "BUG at {}:{} (please report this binfmt-misc bug): {}",
            self.file, self.line, self.msg
        )
    }
}

impl From<io::Error> for BinfmtError {
    fn from(io: io::Error) -> Self {
        use io::ErrorKind;
        let kind = io.kind();
        let path = io
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<IoErrorWrapper>())
            .map(|wrapper| wrapper.path.clone());
        match (kind, path) {
            (ErrorKind::PermissionDenied, path) => BinfmtError::PermissionDenied(path),
            (ErrorKind::NotFound, path) => BinfmtError::NotFound(path),
            (_, None) => BinfmtError::Io(io, None),
            (_, Some(path)) => match io.into_inner().map(|inner| inner.downcast::<IoErrorWrapper>()) {
                Some(Ok(wrapper)) => BinfmtError::Io(wrapper.inner, Some(path)),
                Some(Err(other)) => BinfmtError::Io(io::Error::new(kind, other), Some(path)),
                None => BinfmtError::Io(io::Error::from(kind), Some(path)),
            },
        }
    }
}

impl fmt::Display for BinfmtError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BinfmtError::PermissionDenied(Some(p)) => write!(f, "Permission denied: {}", p.display()),
            BinfmtError::PermissionDenied(None) => write!(f, "Permission denied: this command must be run as root"),
            BinfmtError::Mount(msg) => write!(f, "Unable to set up binfmt_misc: {}", msg),
            BinfmtError::MissingArgument(what) => write!(f, "Missing argument: <{}>", what),
            BinfmtError::NotFound(Some(p)) => write!(f, "No such file or entry: {}", p.display()),
            BinfmtError::NotFound(None) => write!(f, "No such file or entry"),
            BinfmtError::MissingField { field, path: Some(p) } => {
                write!(f, "Missing or empty field `{}` in {}", field, p.display())
            }
            BinfmtError::MissingField { field, path: None } => write!(f, "Missing or empty field `{}`", field),
            BinfmtError::Duplicate(name) => write!(f, "An entry named `{}` is already registered", name),
            BinfmtError::KernelRejected { path, source } => {
                write!(f, "The kernel rejected the write to {}: {}", path.display(), source)
            }
            BinfmtError::Io(inner, Some(p)) => write!(f, "Unexpected IO error({}): {}", p.display(), inner),
            BinfmtError::Io(inner, None) => write!(f, "Unexpected IO error: {}", inner),
            BinfmtError::Batch(failures) => {
                write!(f, "{} item(s) failed", failures.len())?;
                for (i, (item, e)) in failures.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{}{} ({})", sep, item, e)?;
                }
                Ok(())
            }
            BinfmtError::InternalError(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for BinfmtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BinfmtError::KernelRejected { source, .. } => Some(source),
            BinfmtError::Io(inner, _) => Some(inner),
            _ => None,
        }
    }
}
