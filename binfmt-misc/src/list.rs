//! Reporting registered entries

use crate::{BinfmtError, BinfmtResult, EntryStatus, EntryStore, FromBufRead, STATUS};

use log::debug;
#[cfg(feature = "serde1")]
use serde::Serialize;
use std::io::Write;

/// A registered entry and its current status.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(Serialize))]
pub struct Entry {
    pub name: String,
    #[cfg_attr(feature = "serde1", serde(flatten))]
    pub status: EntryStatus,
}

/// Line printed instead of a listing when binfmt_misc is not active.
pub const NOT_ACTIVE: &str = "binfmt_misc is not enabled: its status file was not found";

/// Reads every registered entry.
///
/// Returns `None` if binfmt_misc is not active (no `status` file).  Entries that disappear while
/// being read are skipped.
pub fn collect<S: EntryStore>(store: &S) -> BinfmtResult<Option<Vec<Entry>>> {
    if !store.exists(STATUS) {
        return Ok(None);
    }

    let mut entries = Vec::new();
    for name in store.entries()? {
        let data = match store.read(&name) {
            Ok(data) => data,
            Err(BinfmtError::NotFound(_)) => {
                debug!("{} was removed while listing", name);
                continue;
            }
            Err(e) => return Err(e),
        };
        let status = EntryStatus::from_buf_read(data.as_bytes())?;
        entries.push(Entry { name, status });
    }
    Ok(Some(entries))
}

/// Writes `entries` as a table with a name, status, interpreter and flags column.
pub fn render<W: Write>(entries: &[Entry], mut out: W) -> std::io::Result<()> {
    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0).max("Name".len());
    let interp_width = entries
        .iter()
        .map(|e| e.status.interpreter.len())
        .max()
        .unwrap_or(0)
        .max("Interpreter".len());

    writeln!(
        out,
        "{:<width$}  {:<8}  {:<interp_width$}  {}",
        "Name", "Status", "Interpreter", "Flags"
    )?;
    for e in entries {
        writeln!(
            out,
            "{:<width$}  {:<8}  {:<interp_width$}  {}",
            e.name,
            e.status.state(),
            e.status.interpreter,
            e.status.flags
        )?;
    }
    Ok(())
}

/// Prints the entries of `store` to `out`, or a single informational line if binfmt_misc is not
/// active.
pub fn list<S: EntryStore, W: Write>(store: &S, mut out: W) -> BinfmtResult<()> {
    match collect(store)? {
        Some(entries) => render(&entries, out)?,
        None => writeln!(out, "{}", NOT_ACTIVE)?,
    }
    Ok(())
}

/// Like [`list`], but prints a JSON array.  When binfmt_misc is not active the array is empty.
#[cfg(feature = "serde1")]
pub fn list_json<S: EntryStore, W: Write>(store: &S, mut out: W) -> BinfmtResult<()> {
    let entries = collect(store)?.unwrap_or_default();
    serde_json::to_writer_pretty(&mut out, &entries).map_err(std::io::Error::from)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_definition, MemoryStore};
    use crate::{BinfmtFs, Dispatcher};

    fn listing(store: &MemoryStore) -> String {
        let mut out = Vec::new();
        list(store, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_not_active() {
        let store = MemoryStore::default();
        assert_eq!(collect(&store).unwrap(), None);
        assert_eq!(listing(&store), format!("{}\n", NOT_ACTIVE));
    }

    #[test]
    fn test_list() {
        let mut store = MemoryStore::mounted();
        store.add("qemu-arm", true);
        store.add("qemu-mips", false);

        let entries = collect(&store).unwrap().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "qemu-arm");
        assert!(entries[0].status.enabled);
        assert!(!entries[1].status.enabled);

        let text = listing(&store);
        println!("{}", text);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Name"));
        let cols: Vec<&str> = lines[2].split_whitespace().collect();
        assert_eq!(cols, vec!["qemu-mips", "disabled", "/usr/bin/qemu-mips"]);
    }

    #[test]
    fn test_empty_after_unregister_all() {
        let config = tempfile::tempdir().unwrap();
        write_definition(config.path(), "a", "A", "00");
        let mut d = Dispatcher::new(MemoryStore::mounted(), config.path());
        d.reload().unwrap();
        assert_eq!(collect(d.store()).unwrap().unwrap().len(), 1);

        d.unregister_all().unwrap();
        assert_eq!(collect(d.store()).unwrap(), Some(vec![]));
        assert_eq!(listing(d.store()).lines().count(), 1);
    }

    #[test]
    fn test_list_fs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("register"), "").unwrap();
        std::fs::write(dir.path().join("status"), "enabled\n").unwrap();
        std::fs::write(
            dir.path().join("jar"),
            "enabled\ninterpreter /usr/bin/run-jar\nflags: \nextension .jar\n",
        )
        .unwrap();

        let entries = collect(&BinfmtFs::new(dir.path())).unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "jar");
        assert_eq!(entries[0].status.extension.as_deref(), Some(".jar"));

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(collect(&BinfmtFs::new(empty.path())).unwrap(), None);
    }

    #[cfg(feature = "serde1")]
    #[test]
    fn test_list_json() {
        let mut store = MemoryStore::mounted();
        store.add("qemu-arm", true);
        let mut out = Vec::new();
        list_json(&store, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["name"], "qemu-arm");
        assert_eq!(value[0]["enabled"], true);
        assert_eq!(value[0]["interpreter"], "/usr/bin/qemu-arm");

        let mut out = Vec::new();
        list_json(&MemoryStore::default(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().trim(), "[]");
    }

    #[test]
    fn test_entries() {
        for entry in crate::entries().unwrap() {
            println!("{:?}", entry);
        }
    }
}
