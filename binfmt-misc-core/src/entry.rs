use crate::{BinfmtResult, FromBufRead};

use bitflags::bitflags;
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

/// The state of a registered entry, as reported by its file under the binfmt_misc mount point.
///
/// The kernel writes these files as:
///
/// ```text
/// enabled
/// interpreter /usr/bin/qemu-arm-static
/// flags: OCF
/// offset 0
/// magic 7f454c4601010100000000000000000002002800
/// mask ffffffffffffff00fffffffffffffffffeffffff
/// ```
///
/// Extension based entries have an `extension` line instead of `offset`, `magic` and `mask`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct EntryStatus {
    pub enabled: bool,
    pub interpreter: String,
    /// Flag characters, exactly as the kernel printed them
    pub flags: String,
    pub offset: Option<u64>,
    pub magic: Option<Vec<u8>>,
    pub mask: Option<Vec<u8>>,
    pub extension: Option<String>,
}

impl EntryStatus {
    /// `enabled` or `disabled`
    pub fn state(&self) -> &'static str {
        if self.enabled {
            "enabled"
        } else {
            "disabled"
        }
    }
}

/// The second whitespace separated token of `line`, or an empty string.
fn second_token(line: Option<&String>) -> String {
    line.and_then(|l| l.split_whitespace().nth(1)).unwrap_or_default().to_string()
}

impl FromBufRead for EntryStatus {
    fn from_buf_read<R: BufRead>(r: R) -> BinfmtResult<Self> {
        let lines: Vec<String> = r.lines().flatten().collect();

        let enabled = match expect!(lines.first(), "entry file is empty").trim() {
            "enabled" => true,
            "disabled" => false,
            other => {
                return Err(build_internal_error!(format!(
                    "Could not recognise entry state {:?}",
                    other
                )))
            }
        };
        let interpreter = second_token(lines.get(1));
        let flags = second_token(lines.get(2));

        let mut status = EntryStatus {
            enabled,
            interpreter,
            flags,
            offset: None,
            magic: None,
            mask: None,
            extension: None,
        };

        for line in lines.iter().skip(3) {
            let mut s = line.split_whitespace();
            let key = match s.next() {
                Some(key) => key,
                None => continue,
            };
            let value = s.next().unwrap_or_default();
            match key {
                "offset" => status.offset = Some(from_str!(u64, value)),
                "magic" => status.magic = Some(expect!(hex::decode(value), "magic is not hex")),
                "mask" => status.mask = Some(expect!(hex::decode(value), "mask is not hex")),
                "extension" => status.extension = Some(value.to_string()),
                // newer kernels may add more lines
                _ => {}
            }
        }

        Ok(status)
    }
}

bitflags! {
    /// The flags understood by the kernel, one character each.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        /// `P`: keep the original `argv[0]` of the binary
        const PRESERVE_ARGV0 = 1 << 0;
        /// `O`: open the binary and pass the interpreter a file descriptor
        const OPEN_BINARY = 1 << 1;
        /// `C`: compute credentials from the binary, not the interpreter (implies `O`)
        const CREDENTIALS = 1 << 2;
        /// `F`: open the interpreter when registering, not when running
        const FIX_BINARY = 1 << 3;
    }
}

impl Flags {
    fn from_char(c: char) -> Option<Flags> {
        match c {
            'P' => Some(Flags::PRESERVE_ARGV0),
            'O' => Some(Flags::OPEN_BINARY),
            'C' => Some(Flags::CREDENTIALS),
            'F' => Some(Flags::FIX_BINARY),
            _ => None,
        }
    }

    /// Parses flag characters, also returning the characters that are not known flags.
    ///
    /// Unknown characters are not an error here; whether they are accepted is up to the kernel.
    pub fn parse(s: &str) -> (Flags, Vec<char>) {
        let mut flags = Flags::empty();
        let mut unknown = Vec::new();
        for c in s.chars() {
            match Flags::from_char(c) {
                Some(f) => flags |= f,
                None => unknown.push(c),
            }
        }
        (flags, unknown)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (flag, c) in [
            (Flags::PRESERVE_ARGV0, 'P'),
            (Flags::OPEN_BINARY, 'O'),
            (Flags::CREDENTIALS, 'C'),
            (Flags::FIX_BINARY, 'F'),
        ] {
            if self.contains(flag) {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

/// Values written to an entry's file to change it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sentinel {
    /// disable the entry
    Disable = 0,
    /// enable the entry
    Enable = 1,
    /// disable and remove the entry
    Remove = -1,
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Sentinel::Disable => 0,
                Sentinel::Enable => 1,
                Sentinel::Remove => -1,
            }
        )
    }
}

impl FromStr for Sentinel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i8>()
            .map_err(|_| "Fail to parse entry sentinel")
            .and_then(|n| match n {
                0 => Ok(Sentinel::Disable),
                1 => Ok(Sentinel::Enable),
                -1 => Ok(Sentinel::Remove),
                _ => Err("Unknown entry sentinel value"),
            })
    }
}
