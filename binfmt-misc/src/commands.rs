use crate::{
    is_entry_name, is_reserved, BinfmtError, BinfmtResult, Definition, EntryStore, Flags, FromBufRead, Sentinel, REGISTER,
};

use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// What [`Dispatcher::unregister_all`] and [`Dispatcher::reload`] do when one item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure and return it.
    #[default]
    Abort,
    /// Carry on with the remaining items, then return a [`BinfmtError::Batch`] listing every
    /// failure.
    KeepGoing,
}

/// Runs commands against the entries of an [`EntryStore`].
///
/// The dispatcher does not check privileges or mount anything; see [`mount::prepare`](crate::mount::prepare)
/// for that.
#[derive(Debug)]
pub struct Dispatcher<S> {
    store: S,
    config_dir: PathBuf,
    policy: FailurePolicy,
}

impl<S: EntryStore> Dispatcher<S> {
    /// Creates a dispatcher that resolves definition names inside `config_dir`.
    pub fn new<P: Into<PathBuf>>(store: S, config_dir: P) -> Self {
        Dispatcher {
            store,
            config_dir: config_dir.into(),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Finds the definition file for `arg`.
    ///
    /// An existing regular file is used as is.  Anything else is looked up as a file name in the
    /// configuration directory.
    pub fn resolve(&self, arg: &str) -> BinfmtResult<PathBuf> {
        let direct = Path::new(arg);
        if direct.is_file() {
            return Ok(direct.to_owned());
        }
        let path = self.config_dir.join(arg);
        if path.is_file() {
            Ok(path)
        } else {
            Err(BinfmtError::NotFound(Some(path)))
        }
    }

    /// Registers the definition named (or pointed to) by `arg`.
    pub fn register(&mut self, arg: &str) -> BinfmtResult<Definition> {
        let path = self.resolve(arg)?;
        self.register_file(&path)
    }

    /// Registers the definition file at `path`.
    pub fn register_file(&mut self, path: &Path) -> BinfmtResult<Definition> {
        let def = Definition::from_file(path)?;
        self.register_definition(&def)?;
        Ok(def)
    }

    /// Registers an already loaded definition.
    ///
    /// Fails with [`BinfmtError::Duplicate`] without writing anything if an entry with the same
    /// name exists, and with [`BinfmtError::NotFound`] if the name is not a plain file name.
    pub fn register_definition(&mut self, def: &Definition) -> BinfmtResult<()> {
        if !is_entry_name(&def.name) {
            return Err(BinfmtError::NotFound(Some(PathBuf::from(&def.name))));
        }
        if self.store.exists(&def.name) {
            return Err(BinfmtError::Duplicate(def.name.clone()));
        }

        let (flags, unknown) = Flags::parse(&def.flags);
        if !unknown.is_empty() {
            warn!("{}: unknown flags {:?}, the kernel may refuse them", def.name, unknown);
        }

        let line = def.register_line();
        debug!("registering {} (flags {:?}): {}", def.name, flags.to_string(), line);
        self.store.write(REGISTER, &line)?;
        info!("registered {}", def.name);
        Ok(())
    }

    /// Disables and removes the entry `name`.
    pub fn unregister(&mut self, name: &str) -> BinfmtResult<()> {
        self.control(name, Sentinel::Remove)
    }

    pub fn enable(&mut self, name: &str) -> BinfmtResult<()> {
        self.control(name, Sentinel::Enable)
    }

    pub fn disable(&mut self, name: &str) -> BinfmtResult<()> {
        self.control(name, Sentinel::Disable)
    }

    fn control(&mut self, name: &str, sentinel: Sentinel) -> BinfmtResult<()> {
        // writing to `status` would act on every entry at once
        if is_reserved(name) || !is_entry_name(name) || !self.store.exists(name) {
            return Err(BinfmtError::NotFound(Some(PathBuf::from(name))));
        }
        self.store.write(name, &sentinel.to_string())
    }

    /// Removes every registered entry.
    pub fn unregister_all(&mut self) -> BinfmtResult<()> {
        let mut failures = Vec::new();
        self.unregister_each(&mut failures)?;
        finish(failures)
    }

    /// Removes every registered entry, then registers every definition in the configuration
    /// directory.
    ///
    /// A missing configuration directory just means there is nothing to register.
    pub fn reload(&mut self) -> BinfmtResult<()> {
        let mut failures = Vec::new();
        self.unregister_each(&mut failures)?;

        for path in self.definition_files()? {
            debug!("registering definition file {}", path.display());
            if let Err(e) = self.register_file(&path) {
                self.failed(path.display().to_string(), e, &mut failures)?;
            }
        }

        finish(failures)
    }

    /// The regular files in the configuration directory, sorted by name.
    pub fn definition_files(&self) -> BinfmtResult<Vec<PathBuf>> {
        let dir = match fs::read_dir(&self.config_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} does not exist, nothing to load", self.config_dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(crate::wrap_io_error(&self.config_dir, e).into()),
        };

        let mut files = Vec::new();
        for entry in dir {
            let path = entry.map_err(|e| crate::wrap_io_error(&self.config_dir, e))?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn unregister_each(&mut self, failures: &mut Vec<(String, BinfmtError)>) -> BinfmtResult<()> {
        for name in self.store.entries()? {
            if let Err(e) = self.unregister(&name) {
                self.failed(name, e, failures)?;
            }
        }
        Ok(())
    }

    /// Applies the failure policy to the failure of `item`.
    fn failed(&self, item: String, e: BinfmtError, failures: &mut Vec<(String, BinfmtError)>) -> BinfmtResult<()> {
        match self.policy {
            FailurePolicy::Abort => Err(e),
            FailurePolicy::KeepGoing => {
                warn!("{}: {}", item, e);
                failures.push((item, e));
                Ok(())
            }
        }
    }
}

fn finish(failures: Vec<(String, BinfmtError)>) -> BinfmtResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(BinfmtError::Batch(failures))
    }
}
