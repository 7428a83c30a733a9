use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use thiserror::Error;

use crate::schema::SchemaError;

pub static OBJECT_CLASS_ATTRIBUTE: &str = "objectClass";

/// Distinguished name of an entry. Stored as given, compared by its
/// normalized form: RDNs trimmed, attribute types and values lower cased.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dn(String);

impl Dn {
    pub fn new(s: &str) -> Dn {
        Dn(s.trim().to_string())
    }

    pub fn root() -> Dn {
        Dn(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn normalized(&self) -> String {
        self.normalized_rdns().join(",")
    }

    pub fn rdn(&self) -> Option<&str> {
        self.rdns().first().copied()
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.is_root() {
            return None;
        }

        let rdns = self.rdns();
        Some(Dn(rdns
            .iter()
            .skip(1)
            .map(|r| r.trim())
            .collect::<Vec<_>>()
            .join(",")))
    }

    /// True for the base itself and everything below it.
    pub fn is_within(&self, base: &Dn) -> bool {
        let mine = self.normalized_rdns();
        let theirs = base.normalized_rdns();
        mine.len() >= theirs.len() && mine.ends_with(&theirs)
    }

    pub fn is_child_of(&self, base: &Dn) -> bool {
        let mine = self.normalized_rdns();
        let theirs = base.normalized_rdns();
        mine.len() == theirs.len() + 1 && mine.ends_with(&theirs)
    }

    fn rdns(&self) -> Vec<&str> {
        if self.is_root() {
            return Vec::new();
        }

        let mut rdns = Vec::new();
        let mut start = 0;
        let mut escaped = false;
        for (i, c) in self.0.char_indices() {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                ',' => {
                    rdns.push(&self.0[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        rdns.push(&self.0[start..]);
        rdns
    }

    fn normalized_rdns(&self) -> Vec<String> {
        self.rdns()
            .into_iter()
            .map(|rdn| match rdn.split_once('=') {
                Some((name, value)) => format!(
                    "{}={}",
                    name.trim().to_ascii_lowercase(),
                    value.trim().to_ascii_lowercase()
                ),
                None => rdn.trim().to_ascii_lowercase(),
            })
            .collect()
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Dn {}

impl Debug for Dn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}`", self.0)
    }
}

impl Display for Dn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Dn {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.0
    }
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("No such entry {0}")]
    NoSuchEntry(Dn),
    #[error("Entry already exists {0}")]
    AlreadyExists(Dn),
    #[error("Object class violation: {0}")]
    ObjectClassViolation(#[from] SchemaError),
    #[error("Insufficient access to {0}")]
    InsufficientAccess(Dn),
    #[error("Size limit exceeded")]
    SizeLimitExceeded,
    #[error("Time limit exceeded")]
    TimeLimitExceeded,
    #[error("Directory detached")]
    Detached,
    #[error(transparent)]
    Anyhow(anyhow::Error),
}

impl From<anyhow::Error> for DirectoryError {
    fn from(source: anyhow::Error) -> Self {
        DirectoryError::Anyhow(source)
    }
}
