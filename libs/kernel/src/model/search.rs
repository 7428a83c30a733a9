use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    str::FromStr,
    time::{Duration, Instant},
};

use super::{DirectoryError, Dn, Entry, Filter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchScope {
    Base,
    OneLevel,
    #[default]
    Subtree,
}

impl FromStr for SearchScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "one" | "onelevel" => Ok(Self::OneLevel),
            "sub" | "subtree" => Ok(Self::Subtree),
            _ => Err(anyhow::anyhow!("Unknown search scope '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttributeSelection {
    #[default]
    All,
    Only(Vec<String>),
}

impl AttributeSelection {
    fn includes(&self, name: &str) -> bool {
        match self {
            AttributeSelection::All => true,
            AttributeSelection::Only(names) => names.iter().any(|n| n.eq_ignore_ascii_case(name)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: Dn,
    pub scope: SearchScope,
    pub size_limit: Option<usize>,
    pub time_limit: Option<Duration>,
    pub filter: Filter,
    pub attributes: AttributeSelection,
    pub types_only: bool,
}

impl SearchRequest {
    pub fn new(base: Dn, filter: Filter) -> Self {
        Self {
            base,
            scope: SearchScope::default(),
            size_limit: None,
            time_limit: None,
            filter,
            attributes: AttributeSelection::default(),
            types_only: false,
        }
    }

    /// Everything in the store matching `filter`.
    pub fn everywhere(filter: Filter) -> Self {
        Self::new(Dn::root(), filter)
    }

    pub fn scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn only(mut self, names: &[&str]) -> Self {
        self.attributes = AttributeSelection::Only(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn in_scope(&self, dn: &Dn) -> bool {
        match self.scope {
            SearchScope::Base => dn == &self.base,
            SearchScope::OneLevel => dn.is_child_of(&self.base),
            SearchScope::Subtree => dn.is_within(&self.base),
        }
    }

    pub fn selects(&self, entry: &Entry) -> bool {
        self.in_scope(entry.dn()) && self.filter.matches(entry)
    }

    /// Copy of `entry` reduced to the requested attributes.
    pub fn project(&self, entry: &Entry) -> Entry {
        let mut projected = entry.clone();
        projected.retain_attributes(|a| self.attributes.includes(a.name()));
        if self.types_only {
            for attribute in projected.attributes_mut() {
                attribute.clear_values();
            }
        }
        projected
    }
}

/// Applies a request's scope, filter, projection and limits to candidates
/// produced by a storage backend, handing selected entries to the visitor.
pub struct SearchProgress<'a> {
    request: &'a SearchRequest,
    started: Instant,
    returned: usize,
}

impl<'a> SearchProgress<'a> {
    pub fn new(request: &'a SearchRequest) -> Self {
        Self {
            request,
            started: Instant::now(),
            returned: 0,
        }
    }

    pub fn offer(
        &mut self,
        candidate: &Entry,
        visit: &mut dyn FnMut(&Entry) -> Result<()>,
    ) -> Result<()> {
        if let Some(limit) = self.request.time_limit {
            if self.started.elapsed() > limit {
                return Err(DirectoryError::TimeLimitExceeded.into());
            }
        }

        if !self.request.selects(candidate) {
            return Ok(());
        }

        if let Some(limit) = self.request.size_limit {
            if self.returned >= limit {
                return Err(DirectoryError::SizeLimitExceeded.into());
            }
        }

        visit(&self.request.project(candidate))?;
        self.returned += 1;

        Ok(())
    }

    pub fn returned(&self) -> usize {
        self.returned
    }
}

/// Enumeration of stored entries. Implementations drain the whole result
/// before returning and must not re-enter the overlay chain.
pub trait EntrySearcher {
    fn search(
        &self,
        request: &SearchRequest,
        visit: &mut dyn FnMut(&Entry) -> Result<()>,
    ) -> Result<()>;

    fn search_all(&self, request: &SearchRequest) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        self.search(request, &mut |entry| {
            entries.push(entry.clone());
            Ok(())
        })?;
        Ok(entries)
    }
}
