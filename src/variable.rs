//! Fully qualified variable identifiers.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Identifies a variable within a simulation as `"instance::variable"`.
///
/// # Examples
///
/// ```
/// use cosim::VariableId;
///
/// let id: VariableId = "chassis::zChassis".parse().unwrap();
/// assert_eq!(id.instance(), "chassis");
/// assert_eq!(id.variable(), "zChassis");
/// assert_eq!(id.to_string(), "chassis::zChassis");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableId {
    instance: String,
    variable: String,
}

impl VariableId {
    pub fn new(instance: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            variable: variable.into(),
        }
    }

    /// Parses `"instance::variable"`, failing if the `::` separator is
    /// missing.
    pub fn parse(identifier: &str) -> Result<Self> {
        let Some((instance, variable)) = identifier.split_once("::") else {
            return Err(Error::MalformedIdentifier(identifier.to_string()));
        };
        Ok(Self::new(instance, variable))
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Matches this identifier against a pattern that may contain `*`
    /// (any run of characters) and `?` (any single character) in either
    /// component.
    pub fn matches(&self, pattern: &VariableId) -> bool {
        wildcard_match(&self.instance, &pattern.instance)
            && wildcard_match(&self.variable, &pattern.variable)
    }
}

impl FromStr for VariableId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.instance, self.variable)
    }
}

/// Iterative glob match supporting `*` and `?`.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_t = 0usize;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}
