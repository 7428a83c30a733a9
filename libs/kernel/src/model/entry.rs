use serde::{Deserialize, Serialize};

use super::{Dn, OBJECT_CLASS_ATTRIBUTE};
use crate::schema::{AttributeDescription, ObjectClass};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    values: Vec<String>,
}

impl Attribute {
    pub fn new(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_owned(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub(crate) fn clear_values(&mut self) {
        self.values.clear()
    }
}

/// An entry, either stored or pending. Attribute order is preserved as added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    dn: Dn,
    #[serde(default)]
    attributes: Vec<Attribute>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: Vec::new(),
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Lookup by literal name, ignoring case. No alias resolution.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is(name))
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.attribute(name).map(|a| a.values()).unwrap_or(&[])
    }

    /// Lookup through the schema, so aliases of the attribute type match too.
    pub fn find(&self, desc: &AttributeDescription) -> Option<&Attribute> {
        self.attributes.iter().find(|a| desc.matches(a.name()))
    }

    pub fn has(&self, desc: &AttributeDescription) -> bool {
        self.find(desc).is_some()
    }

    pub fn object_classes(&self) -> impl Iterator<Item = &str> {
        self.values(OBJECT_CLASS_ATTRIBUTE)
            .iter()
            .map(|v| v.as_str())
    }

    pub fn has_object_class(&self, class: &ObjectClass) -> bool {
        self.object_classes().any(|v| class.is_named(v))
    }

    /// Append a single value, creating the attribute if necessary. Values
    /// already present are left alone. Returns true when the entry changed.
    pub fn merge_one(&mut self, desc: &AttributeDescription, value: String) -> bool {
        match self.attributes.iter_mut().find(|a| desc.matches(a.name())) {
            Some(attribute) => {
                if attribute.values.contains(&value) {
                    false
                } else {
                    attribute.values.push(value);
                    true
                }
            }
            None => {
                self.attributes
                    .push(Attribute::new(desc.name(), vec![value]));
                true
            }
        }
    }

    /// Unchecked append by literal name, for building entries outside of any
    /// schema.
    pub fn add_value(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|a| a.is(name)) {
            Some(attribute) => attribute.values.push(value.to_owned()),
            None => self
                .attributes
                .push(Attribute::new(name, vec![value.to_owned()])),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let position = self.attributes.iter().position(|a| a.is(name))?;
        Some(self.attributes.remove(position))
    }

    pub(crate) fn retain_attributes<F>(&mut self, keep: F)
    where
        F: FnMut(&Attribute) -> bool,
    {
        self.attributes.retain(keep)
    }

    pub(crate) fn attributes_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        self.attributes.iter_mut()
    }
}

pub struct EntryBuilder {
    entry: Entry,
}

impl EntryBuilder {
    pub fn new(dn: &str) -> Self {
        Self {
            entry: Entry::new(Dn::new(dn)),
        }
    }

    pub fn class(self, name: &str) -> Self {
        self.attr(OBJECT_CLASS_ATTRIBUTE, name)
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.entry.add_value(name, value);
        self
    }

    pub fn posix_account(self) -> Self {
        self.class("top").class("account").class("posixAccount")
    }
}

impl From<EntryBuilder> for Entry {
    fn from(value: EntryBuilder) -> Self {
        value.entry
    }
}

pub fn build_entry(dn: &str) -> EntryBuilder {
    EntryBuilder::new(dn)
}
