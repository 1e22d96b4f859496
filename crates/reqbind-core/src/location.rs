//! Request locations a field value may legally arrive from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the six sources a request value can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// Router path parameters (e.g. `/users/{id}`).
    Path,
    /// URL query string parameters.
    Query,
    /// HTTP headers.
    Header,
    /// URL-encoded or multipart form values.
    Form,
    /// Uploaded multipart files.
    File,
    /// Flattened JSON request body.
    #[serde(alias = "json")]
    Body,
}

impl Location {
    /// Every location, in merge order of the original request model.
    pub const ALL: [Location; 6] = [
        Location::Path,
        Location::Query,
        Location::Header,
        Location::Form,
        Location::File,
        Location::Body,
    ];

    /// Returns the lowercase name used in annotations and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Form => "form",
            Self::File => "file",
            Self::Body => "body",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown location name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown location: {0:?}")]
pub struct UnknownLocation(pub String);

impl FromStr for Location {
    type Err = UnknownLocation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "query" => Ok(Self::Query),
            "header" => Ok(Self::Header),
            "form" => Ok(Self::Form),
            "file" => Ok(Self::File),
            "body" | "json" => Ok(Self::Body),
            _ => Err(UnknownLocation(s.to_string())),
        }
    }
}

/// A compact set of [`Location`]s.
///
/// Used for the aggregate "contains" flags of a record type, which let the
/// HTTP layer skip extracting sources a record never reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LocationSet(u8);

impl LocationSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Adds a location to the set.
    pub fn insert(&mut self, location: Location) {
        self.0 |= location.bit();
    }

    /// Adds every location of `other` to the set.
    pub fn extend_from(&mut self, other: LocationSet) {
        self.0 |= other.0;
    }

    /// Returns true if the set holds `location`.
    #[must_use]
    pub const fn contains(self, location: Location) -> bool {
        self.0 & location.bit() != 0
    }

    /// Returns true if no location is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the locations in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Location> {
        Location::ALL.into_iter().filter(move |l| self.contains(*l))
    }
}

impl FromIterator<Location> for LocationSet {
    fn from_iter<I: IntoIterator<Item = Location>>(iter: I) -> Self {
        let mut set = Self::empty();
        for location in iter {
            set.insert(location);
        }
        set
    }
}

impl Extend<Location> for LocationSet {
    fn extend<I: IntoIterator<Item = Location>>(&mut self, iter: I) {
        for location in iter {
            self.insert(location);
        }
    }
}

/// Renders a location list as `[header query]`.
pub(crate) fn format_locations(locations: &[Location]) -> String {
    let names: Vec<&str> = locations.iter().map(|l| l.as_str()).collect();
    format!("[{}]", names.join(" "))
}
