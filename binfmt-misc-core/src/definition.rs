use crate::{escape_hex, BinfmtError, BinfmtResult, FromBufRead};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;

/// The keys a definition file must provide, in the order they are checked.
pub const FIELDS: [&str; 7] = ["name", "type", "offset", "magic", "mask", "interpreter", "flags"];

/// A binary format definition, as loaded from a definition file.
///
/// A definition file is a plain text file with one `key: value` pair per line, for example:
///
/// ```text
/// name: java_app
/// type: M
/// offset: 0
/// magic: cafebabe
/// mask: ffffffff
/// interpreter: /usr/bin/run-jar
/// flags: P
/// ```
///
/// Values are kept exactly as written (minus surrounding whitespace).  The kernel is the only
/// validator of their contents, so a non-hex `magic` or a non-numeric `offset` will load fine
/// and then be rejected when registering.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct Definition {
    /// Name of the entry.  This is also the name of its file under the binfmt_misc mount point.
    pub name: String,
    /// `M` to match on magic bytes, `E` to match on a file extension
    #[cfg_attr(feature = "serde1", serde(rename = "type"))]
    pub kind: String,
    /// Byte offset of the magic in the file
    pub offset: String,
    /// The bytes to match, written as hex digits
    pub magic: String,
    /// Bitmask applied before matching, written as hex digits
    pub mask: String,
    /// Absolute path of the program that runs matching binaries
    pub interpreter: String,
    /// Flag characters, see [`Flags`](crate::Flags)
    pub flags: String,
}

/// Returns the value of `field` in the definition text `text`.
///
/// Looks for lines starting with `<field>:`.  If several lines match, the last one wins.  The
/// returned value has the `<field>:` prefix and any surrounding whitespace removed.  An empty
/// string is returned if no line matches.
pub fn field_value(text: &str, field: &str) -> String {
    text.lines()
        .rev()
        .find_map(|line| line.strip_prefix(field)?.strip_prefix(':'))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

impl Definition {
    /// Parses a definition from its text, without attaching a file path to errors.
    pub fn parse(text: &str) -> BinfmtResult<Self> {
        let required = |field: &'static str| {
            let value = field_value(text, field);
            if value.is_empty() {
                Err(BinfmtError::MissingField { field, path: None })
            } else {
                Ok(value)
            }
        };

        // fields are checked in declaration order, matching FIELDS
        Ok(Definition {
            name: required("name")?,
            kind: required("type")?,
            offset: required("offset")?,
            magic: required("magic")?,
            mask: required("mask")?,
            interpreter: required("interpreter")?,
            flags: required("flags")?,
        })
    }

    /// The line to write to the kernel's `register` file to create this entry.
    ///
    /// The fields are joined by colons behind an empty leading field, with `magic` and `mask`
    /// hex escaped.  There is no trailing newline.
    ///
    /// # Example
    ///
    /// ```
    /// # use binfmt_misc_core::Definition;
    /// let def = Definition::parse(
    ///     "name: java_app\ntype: M\noffset: 0\nmagic: cafebabe\nmask: ffffffff\n\
    ///      interpreter: /usr/bin/run-jar\nflags: P\n",
    /// )
    /// .unwrap();
    /// assert_eq!(
    ///     def.register_line(),
    ///     r":java_app:M:0:\xca\xfe\xba\xbe:\xff\xff\xff\xff:/usr/bin/run-jar:P"
    /// );
    /// ```
    pub fn register_line(&self) -> String {
        format!(
            ":{}:{}:{}:{}:{}:{}:{}",
            self.name,
            self.kind,
            self.offset,
            escape_hex(&self.magic),
            escape_hex(&self.mask),
            self.interpreter,
            self.flags
        )
    }
}

impl FromBufRead for Definition {
    fn from_buf_read<R: BufRead>(mut r: R) -> BinfmtResult<Self> {
        let mut text = String::new();
        r.read_to_string(&mut text)?;
        Definition::parse(&text)
    }

    fn from_file<P: AsRef<Path>>(path: P) -> BinfmtResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| crate::wrap_io_error(path, e))?;
        Definition::parse(&text).map_err(|e| match e {
            BinfmtError::MissingField { field, path: None } => BinfmtError::MissingField {
                field,
                path: Some(path.to_owned()),
            },
            e => e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAVA: &str = "name: java_app
type: M
offset: 0
magic: cafebabe
mask: ffffffff
interpreter: /usr/bin/run-jar
flags: P
";

    #[test]
    fn test_field_value() {
        assert_eq!(field_value(JAVA, "name"), "java_app");
        assert_eq!(field_value(JAVA, "interpreter"), "/usr/bin/run-jar");
        assert_eq!(field_value(JAVA, "missing"), "");

        // last one wins, whitespace is trimmed
        let text = "name: first\nname:   second  \n";
        assert_eq!(field_value(text, "name"), "second");

        // keys must start the line and be followed directly by a colon
        let text = "  name: indented\nnames: plural\nname : spaced\n";
        assert_eq!(field_value(text, "name"), "");
    }

    #[test]
    fn test_parse() {
        let def = Definition::parse(JAVA).unwrap();
        assert_eq!(def.name, "java_app");
        assert_eq!(def.kind, "M");
        assert_eq!(def.offset, "0");
        assert_eq!(def.magic, "cafebabe");
        assert_eq!(def.mask, "ffffffff");
        assert_eq!(def.interpreter, "/usr/bin/run-jar");
        assert_eq!(def.flags, "P");

        assert_eq!(
            def.register_line(),
            r":java_app:M:0:\xca\xfe\xba\xbe:\xff\xff\xff\xff:/usr/bin/run-jar:P"
        );
    }

    #[test]
    fn test_values_pass_through() {
        let text = JAVA
            .replace("offset: 0", "offset: twelve")
            .replace("magic: cafebabe", "magic: zz");
        let def = Definition::parse(&text).unwrap();
        assert_eq!(def.offset, "twelve");
        assert_eq!(def.register_line(), r":java_app:M:twelve:\xzz:\xff\xff\xff\xff:/usr/bin/run-jar:P");
    }

    #[test]
    fn test_missing_fields() {
        for field in FIELDS {
            let text: String = JAVA
                .lines()
                .filter(|line| !line.starts_with(&format!("{}:", field)))
                .map(|line| format!("{}\n", line))
                .collect();
            match Definition::parse(&text) {
                Err(BinfmtError::MissingField { field: f, path: None }) => assert_eq!(f, field),
                x => panic!("Unexpected return value for {}: {:?}", field, x),
            }

            // present but empty is just as bad
            let text = JAVA.replace(&format!("{}: {}", field, field_value(JAVA, field)), &format!("{}:   ", field));
            match Definition::parse(&text) {
                Err(BinfmtError::MissingField { field: f, .. }) => assert_eq!(f, field),
                x => panic!("Unexpected return value for {}: {:?}", field, x),
            }
        }
    }

    #[test]
    fn test_from_buf_read() {
        let def = Definition::from_buf_read(JAVA.as_bytes()).unwrap();
        assert_eq!(def, Definition::parse(JAVA).unwrap());
    }

    #[cfg(feature = "serde1")]
    #[test]
    fn test_serde() {
        let def = Definition::parse(JAVA).unwrap();
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "M");
        let back: Definition = serde_json::from_value(json).unwrap();
        assert_eq!(back, def);
    }
}
