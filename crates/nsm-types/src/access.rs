use std::fmt;
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::enum_set::EnumSet;
use crate::status::Status;

/// A single access right a request may demand on an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessMask {
    ReadData = 0,
    ListDirectory = 1,
    WriteData = 2,
    AddFile = 3,
    AppendData = 4,
    AddSubdirectory = 5,
    ReadNamedAttrs = 6,
    WriteNamedAttrs = 7,
    Execute = 8,
    DeleteChild = 9,
    ReadAttributes = 10,
    WriteAttributes = 11,
    Delete = 12,
    ReadAcl = 13,
    WriteAcl = 14,
    WriteOwner = 15,
    Synchronize = 16,
}

pub type AccessMasks = EnumSet<AccessMask>;

impl AccessMask {
    pub const ALL: [AccessMask; 17] = [
        AccessMask::ReadData,
        AccessMask::ListDirectory,
        AccessMask::WriteData,
        AccessMask::AddFile,
        AccessMask::AppendData,
        AccessMask::AddSubdirectory,
        AccessMask::ReadNamedAttrs,
        AccessMask::WriteNamedAttrs,
        AccessMask::Execute,
        AccessMask::DeleteChild,
        AccessMask::ReadAttributes,
        AccessMask::WriteAttributes,
        AccessMask::Delete,
        AccessMask::ReadAcl,
        AccessMask::WriteAcl,
        AccessMask::WriteOwner,
        AccessMask::Synchronize,
    ];

    /// One-letter abbreviation used in textual ACL entries.
    pub fn abbreviation(&self) -> char {
        match self {
            AccessMask::ReadData => 'r',
            AccessMask::ListDirectory => 'l',
            AccessMask::WriteData => 'w',
            AccessMask::AddFile => 'f',
            AccessMask::AppendData => 'a',
            AccessMask::AddSubdirectory => 's',
            AccessMask::ReadNamedAttrs => 'n',
            AccessMask::WriteNamedAttrs => 'N',
            AccessMask::Execute => 'x',
            AccessMask::DeleteChild => 'D',
            AccessMask::ReadAttributes => 't',
            AccessMask::WriteAttributes => 'T',
            AccessMask::Delete => 'd',
            AccessMask::ReadAcl => 'c',
            AccessMask::WriteAcl => 'C',
            AccessMask::WriteOwner => 'o',
            AccessMask::Synchronize => 'y',
        }
    }

    pub fn from_abbreviation(c: char) -> Option<AccessMask> {
        AccessMask::ALL.into_iter().find(|m| m.abbreviation() == c)
    }
}

impl fmt::Display for AccessMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Parses a mask string such as `"rlx"`.
pub fn parse_masks(s: &str) -> Result<AccessMasks, Status> {
    s.chars()
        .map(|c| {
            AccessMask::from_abbreviation(c)
                .ok_or_else(|| Status::invalid_arg(format!("unknown access mask '{}'", c)))
        })
        .collect()
}

/// Renders a mask set in the same abbreviated form [`parse_masks`] accepts.
pub fn format_masks(masks: &AccessMasks) -> String {
    masks.iter().map(|m| m.abbreviation()).collect()
}

impl FromStr for AccessMask {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => AccessMask::from_abbreviation(c)
                .ok_or_else(|| Status::invalid_arg(format!("unknown access mask '{}'", s))),
            _ => Err(Status::invalid_arg(format!("unknown access mask '{}'", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviations_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for m in AccessMask::ALL {
            assert!(seen.insert(m.abbreviation()), "duplicate for {:?}", m);
        }
    }

    #[test]
    fn test_parse_and_format() {
        let masks = parse_masks("rxw").unwrap();
        assert!(masks.contains(AccessMask::ReadData));
        assert!(masks.contains(AccessMask::WriteData));
        assert!(masks.contains(AccessMask::Execute));
        assert_eq!(format_masks(&masks), "rwx");
        assert!(parse_masks("rq").is_err());
        assert_eq!("l".parse::<AccessMask>().unwrap(), AccessMask::ListDirectory);
    }
}
