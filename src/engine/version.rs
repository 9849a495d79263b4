//! Engine program versions and the capabilities gated on them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A `major.minor.patch` engine version.
///
/// `0.0.0` stands for a version that could not be determined.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SemVerTriple {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl SemVerTriple {
    /// The placeholder for an undetermined version.
    pub const UNKNOWN: Self = Self::new(0, 0, 0);

    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `X`, `X.Y` or `X.Y.Z`, tolerating a leading `v` and
    /// pre-release suffixes such as `4.2.0-dev`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim().trim_start_matches('v');
        let mut parts = trimmed.splitn(3, '.');
        let major = leading_number(parts.next()?)?;
        let minor = parts.next().map_or(Some(0), leading_number)?;
        let patch = parts.next().map_or(Some(0), leading_number)?;
        Some(Self::new(major, minor, patch))
    }

    /// Finds the first dotted version token in free-form text such as
    /// `podman version 4.2.0` or `Docker version 24.0.7, build afdd53b`.
    #[must_use]
    pub fn find_in(text: &str) -> Option<Self> {
        text.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| token.contains('.'))
            .find_map(Self::parse)
    }

    /// Returns true for the undetermined placeholder.
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        self.major == 0 && self.minor == 0 && self.patch == 0
    }

    /// Whether `system connection list` accepts `--format json`.
    ///
    /// Engines up to major version 3 only print a table.
    #[must_use]
    pub const fn supports_json_connections(self) -> bool {
        self.major > 3
    }
}

fn leading_number(segment: &str) -> Option<u64> {
    let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

impl fmt::Display for SemVerTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for SemVerTriple {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid version '{value}'"))
    }
}

impl From<SemVerTriple> for String {
    fn from(version: SemVerTriple) -> Self {
        version.to_string()
    }
}
