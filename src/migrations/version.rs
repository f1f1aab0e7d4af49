use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};

/// `major.minor.patch`, compared numerically. Pre-release and build suffixes
/// are ignored, missing components count as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AppError::Config(format!("invalid version: {s:?}"));

        let trimmed = s.trim().trim_start_matches('v');
        let core = trimmed
            .split(['-', '+'])
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(invalid)?;

        let mut parts = [0u32; 3];
        for (i, part) in core.split('.').enumerate() {
            if i >= parts.len() {
                return Err(invalid());
            }
            parts[i] = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SchemaVersion {
        s.parse().unwrap()
    }

    #[test]
    fn parses_loose_forms() {
        assert_eq!(v("1.2.3"), SchemaVersion::new(1, 2, 3));
        assert_eq!(v("v2"), SchemaVersion::new(2, 0, 0));
        assert_eq!(v("1.4"), SchemaVersion::new(1, 4, 0));
        assert_eq!(v("1.0.2-beta.1"), SchemaVersion::new(1, 0, 2));
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0.0") > v("1.99.0"));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "abc", "1.2.3.4", "1..2", "-1"] {
            assert!(bad.parse::<SchemaVersion>().is_err(), "{bad}");
        }
    }
}
