//! An in-memory stand-in for the kernel side of binfmt_misc.

use crate::{is_reserved, BinfmtError, BinfmtResult, EntryStore, Sentinel, REGISTER, STATUS};

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub(crate) struct FakeEntry {
    enabled: bool,
    interpreter: String,
    flags: String,
    offset: String,
    magic: String,
    mask: String,
}

/// Behaves like a mounted binfmt_misc: `register` creates entries, entry files accept sentinels.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    pub mounted: bool,
    pub entries: BTreeMap<String, FakeEntry>,
    /// Every accepted write, as (file name, value)
    pub writes: Vec<(String, String)>,
}

fn rejected(name: &str, msg: &str) -> BinfmtError {
    BinfmtError::KernelRejected {
        path: PathBuf::from(name),
        source: io::Error::new(io::ErrorKind::InvalidInput, msg.to_string()),
    }
}

/// Turns `\xca\xfe` back into `cafe`, or `None` if it is not a sequence of escaped bytes.
fn unescape(escaped: &str) -> Option<String> {
    let mut hex = String::new();
    for token in escaped.split("\\x").skip(1) {
        if token.len() != 2 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        hex.push_str(&token.to_ascii_lowercase());
    }
    if escaped.starts_with("\\x") {
        Some(hex)
    } else {
        None
    }
}

impl MemoryStore {
    pub fn mounted() -> Self {
        MemoryStore {
            mounted: true,
            ..Default::default()
        }
    }

    /// Adds an entry directly, as if something else had registered it.
    pub fn add(&mut self, name: &str, enabled: bool) {
        self.entries.insert(
            name.to_string(),
            FakeEntry {
                enabled,
                interpreter: format!("/usr/bin/{}", name),
                flags: String::new(),
                offset: "0".to_string(),
                magic: "00".to_string(),
                mask: "ff".to_string(),
            },
        );
    }

    fn register_line(&mut self, line: &str) -> BinfmtResult<()> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() != 8 || !fields[0].is_empty() {
            return Err(rejected(REGISTER, "malformed registration"));
        }
        let name = fields[1];
        if name.is_empty() || is_reserved(name) || name.contains('/') {
            return Err(rejected(REGISTER, "bad name"));
        }
        if self.entries.contains_key(name) {
            return Err(BinfmtError::KernelRejected {
                path: PathBuf::from(REGISTER),
                source: io::Error::from(io::ErrorKind::AlreadyExists),
            });
        }
        if fields[2] != "M" && fields[2] != "E" {
            return Err(rejected(REGISTER, "bad type"));
        }
        let magic = unescape(fields[4]).ok_or_else(|| rejected(REGISTER, "bad magic"))?;
        let mask = unescape(fields[5]).ok_or_else(|| rejected(REGISTER, "bad mask"))?;
        if !fields[6].starts_with('/') {
            return Err(rejected(REGISTER, "bad interpreter"));
        }

        self.entries.insert(
            name.to_string(),
            FakeEntry {
                enabled: true,
                interpreter: fields[6].to_string(),
                flags: fields[7].to_string(),
                offset: fields[3].to_string(),
                magic,
                mask,
            },
        );
        Ok(())
    }
}

impl EntryStore for MemoryStore {
    fn entries(&self) -> BinfmtResult<Vec<String>> {
        if !self.mounted {
            return Err(BinfmtError::NotFound(None));
        }
        Ok(self.entries.keys().cloned().collect())
    }

    fn exists(&self, name: &str) -> bool {
        self.mounted && (is_reserved(name) || self.entries.contains_key(name))
    }

    fn read(&self, name: &str) -> BinfmtResult<String> {
        if self.mounted && name == STATUS {
            return Ok("enabled\n".to_string());
        }
        let e = self
            .entries
            .get(name)
            .filter(|_| self.mounted)
            .ok_or_else(|| BinfmtError::NotFound(Some(PathBuf::from(name))))?;
        Ok(format!(
            "{}\ninterpreter {}\nflags: {}\noffset {}\nmagic {}\nmask {}\n",
            if e.enabled { "enabled" } else { "disabled" },
            e.interpreter,
            e.flags,
            e.offset,
            e.magic,
            e.mask
        ))
    }

    fn write(&mut self, name: &str, value: &str) -> BinfmtResult<()> {
        if !self.exists(name) {
            return Err(BinfmtError::NotFound(Some(PathBuf::from(name))));
        }
        if name == REGISTER {
            self.register_line(value)?;
        } else if name == STATUS {
            return Err(rejected(STATUS, "not emulated"));
        } else {
            match value.parse::<Sentinel>() {
                Ok(Sentinel::Remove) => {
                    self.entries.remove(name);
                }
                Ok(sentinel) => {
                    if let Some(e) = self.entries.get_mut(name) {
                        e.enabled = sentinel == Sentinel::Enable;
                    }
                }
                Err(msg) => return Err(rejected(name, msg)),
            }
        }
        self.writes.push((name.to_string(), value.to_string()));
        Ok(())
    }
}

/// Writes a magic definition file named `file` into `dir`, with a mask as long as `magic`.
pub(crate) fn write_definition(dir: &Path, file: &str, name: &str, magic: &str) -> PathBuf {
    let path = dir.join(file);
    let text = format!(
        "name: {}\ntype: M\noffset: 0\nmagic: {}\nmask: {}\ninterpreter: /usr/bin/run-jar\nflags: P\n",
        name,
        magic,
        "f".repeat(magic.len())
    );
    fs::write(&path, text).unwrap();
    path
}
