use serde::{Deserialize, Serialize};

use crate::model::{Dn, Entry};

/// Who is performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Principal {
    #[default]
    Anonymous,
    Root,
    Dn(Dn),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Subject {
    Everybody,
    Authenticated,
    Key(Dn),
}

impl Subject {
    fn includes(&self, principal: &Principal) -> bool {
        match (self, principal) {
            (Subject::Everybody, _) => true,
            (Subject::Authenticated, Principal::Anonymous) => false,
            (Subject::Authenticated, _) => true,
            (Subject::Key(dn), Principal::Dn(other)) => dn == other,
            (Subject::Key(_), _) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Perm {
    Read,
    Write,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AclRule {
    keys: Vec<Subject>,
    perm: Perm,
    #[serde(default)]
    within: Option<Dn>,
}

impl AclRule {
    pub fn new(keys: Vec<Subject>, perm: Perm) -> Self {
        Self {
            keys,
            perm,
            within: None,
        }
    }

    pub fn within(mut self, base: Dn) -> Self {
        self.within = Some(base);
        self
    }

    fn grants(&self, principal: &Principal, dn: &Dn, perm: Perm) -> bool {
        self.perm == perm
            && self.within.as_ref().map_or(true, |base| dn.is_within(base))
            && self.keys.iter().any(|k| k.includes(principal))
    }
}

/// Access rules loaded from configuration. Root is always allowed, everybody
/// else needs a matching rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Acls {
    #[serde(default)]
    rules: Vec<AclRule>,
}

impl Acls {
    pub fn new(rules: Vec<AclRule>) -> Self {
        Self { rules }
    }

    pub fn allows(&self, principal: &Principal, dn: &Dn, perm: Perm) -> bool {
        matches!(principal, Principal::Root) || self.rules.iter().any(|r| r.grants(principal, dn, perm))
    }
}

pub trait AccessControl: Send + Sync {
    fn can_write(&self, principal: &Principal, entry: &Entry) -> bool;
}

impl AccessControl for Acls {
    fn can_write(&self, principal: &Principal, entry: &Entry) -> bool {
        self.allows(principal, entry.dn(), Perm::Write)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AllowAll {}

impl AccessControl for AllowAll {
    fn can_write(&self, _principal: &Principal, _entry: &Entry) -> bool {
        true
    }
}
