use serde::{Deserialize, Serialize};
use std::{fmt::Display, sync::Arc};
use thiserror::Error;

use crate::model::Entry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Undefined attribute type '{0}'")]
    UndefinedAttributeType(String),
    #[error("Undefined object class '{0}'")]
    UndefinedObjectClass(String),
    #[error("No objectClass on {0}")]
    MissingObjectClass(String),
    #[error("Object class '{class}' requires '{attribute}'")]
    MissingRequired { class: String, attribute: String },
    #[error("Attribute '{0}' is single-valued")]
    SingleValued(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeType {
    pub oid: String,
    pub names: Vec<String>,
    #[serde(default)]
    pub single_value: bool,
}

impl AttributeType {
    pub fn name(&self) -> &str {
        self.names.first().map(|n| n.as_str()).unwrap_or(self.oid.as_str())
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.oid == name || self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectClass {
    pub oid: String,
    pub names: Vec<String>,
    #[serde(default)]
    pub sup: Vec<String>,
    #[serde(default)]
    pub must: Vec<String>,
    #[serde(default)]
    pub may: Vec<String>,
}

impl ObjectClass {
    pub fn name(&self) -> &str {
        self.names.first().map(|n| n.as_str()).unwrap_or(self.oid.as_str())
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.oid == name || self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// A schema-resolved attribute name.
#[derive(Debug, Clone)]
pub struct AttributeDescription {
    attribute: Arc<AttributeType>,
}

impl AttributeDescription {
    pub fn name(&self) -> &str {
        self.attribute.name()
    }

    pub fn attribute_type(&self) -> &AttributeType {
        &self.attribute
    }

    pub fn matches(&self, name: &str) -> bool {
        self.attribute.is_named(name)
    }
}

impl Display for AttributeDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    attributes: Vec<Arc<AttributeType>>,
    classes: Vec<Arc<ObjectClass>>,
}

impl Schema {
    pub fn with_attribute(mut self, attribute: AttributeType) -> Self {
        self.attributes.push(Arc::new(attribute));
        self
    }

    pub fn with_class(mut self, class: ObjectClass) -> Self {
        self.classes.push(Arc::new(class));
        self
    }

    pub fn without_attribute(mut self, name: &str) -> Self {
        self.attributes.retain(|a| !a.is_named(name));
        self
    }

    pub fn without_class(mut self, name: &str) -> Self {
        self.classes.retain(|c| !c.is_named(name));
        self
    }

    pub fn resolve(&self, name: &str) -> Result<AttributeDescription, SchemaError> {
        self.attributes
            .iter()
            .find(|a| a.is_named(name))
            .map(|a| AttributeDescription {
                attribute: Arc::clone(a),
            })
            .ok_or_else(|| SchemaError::UndefinedAttributeType(name.to_owned()))
    }

    pub fn find_object_class(&self, name: &str) -> Option<Arc<ObjectClass>> {
        self.classes.iter().find(|c| c.is_named(name)).cloned()
    }

    /// Verifies the entry against its object classes: every class known,
    /// every MUST attribute (including inherited ones) present, attributes
    /// defined and single-valued attributes holding one value.
    pub fn check(&self, entry: &Entry) -> Result<(), SchemaError> {
        let classes = entry.object_classes().collect::<Vec<_>>();
        if classes.is_empty() {
            return Err(SchemaError::MissingObjectClass(entry.dn().to_string()));
        }

        for attribute in entry.attributes() {
            let desc = self.resolve(attribute.name())?;
            if desc.attribute_type().single_value && attribute.values().len() > 1 {
                return Err(SchemaError::SingleValued(desc.name().to_owned()));
            }
        }

        let mut pending = classes.into_iter().map(|c| c.to_owned()).collect::<Vec<_>>();
        let mut visited: Vec<String> = Vec::new();
        while let Some(name) = pending.pop() {
            if visited.iter().any(|v| v.eq_ignore_ascii_case(&name)) {
                continue;
            }

            let class = self
                .find_object_class(&name)
                .ok_or_else(|| SchemaError::UndefinedObjectClass(name.clone()))?;

            for required in class.must.iter() {
                let desc = self.resolve(required)?;
                if !entry.has(&desc) {
                    return Err(SchemaError::MissingRequired {
                        class: class.name().to_owned(),
                        attribute: desc.name().to_owned(),
                    });
                }
            }

            pending.extend(class.sup.iter().cloned());
            visited.push(name);
        }

        Ok(())
    }

    /// Core, cosine, inetOrgPerson and NIS (RFC 2307) definitions, enough for
    /// directories holding people, groups and POSIX accounts.
    pub fn rfc2307() -> Self {
        let attributes = [
            attribute("2.5.4.0", &["objectClass"], false),
            attribute("2.5.4.3", &["cn", "commonName"], false),
            attribute("2.5.4.4", &["sn", "surname"], false),
            attribute("2.5.4.10", &["o", "organizationName"], false),
            attribute("2.5.4.11", &["ou", "organizationalUnitName"], false),
            attribute("2.5.4.13", &["description"], false),
            attribute("2.5.4.35", &["userPassword"], false),
            attribute("2.5.4.42", &["givenName", "gn"], false),
            attribute("0.9.2342.19200300.100.1.1", &["uid", "userid"], false),
            attribute("0.9.2342.19200300.100.1.3", &["mail", "rfc822Mailbox"], false),
            attribute("0.9.2342.19200300.100.1.25", &["dc", "domainComponent"], true),
            attribute("1.3.6.1.1.1.1.0", &["uidNumber"], true),
            attribute("1.3.6.1.1.1.1.1", &["gidNumber"], true),
            attribute("1.3.6.1.1.1.1.2", &["gecos"], true),
            attribute("1.3.6.1.1.1.1.3", &["homeDirectory"], true),
            attribute("1.3.6.1.1.1.1.4", &["loginShell"], true),
            attribute("1.3.6.1.1.1.1.5", &["shadowLastChange"], true),
            attribute("1.3.6.1.1.1.1.8", &["shadowWarning"], true),
            attribute("1.3.6.1.1.1.1.12", &["memberUid"], false),
        ];

        let classes = [
            class("2.5.6.0", "top", &[], &["objectClass"], &[]),
            class("2.5.6.4", "organization", &["top"], &["o"], &["description"]),
            class("2.5.6.5", "organizationalUnit", &["top"], &["ou"], &["description"]),
            class("1.3.6.1.4.1.1466.344", "dcObject", &["top"], &["dc"], &[]),
            class("2.5.6.6", "person", &["top"], &["sn", "cn"], &["userPassword", "description"]),
            class("2.5.6.7", "organizationalPerson", &["person"], &[], &["ou"]),
            class(
                "2.16.840.1.113730.3.2.2",
                "inetOrgPerson",
                &["organizationalPerson"],
                &[],
                &["givenName", "mail", "uid"],
            ),
            class("0.9.2342.19200300.100.4.5", "account", &["top"], &["uid"], &["description", "o", "ou"]),
            class(
                "1.3.6.1.1.1.2.0",
                "posixAccount",
                &["top"],
                &["cn", "uid", "uidNumber", "gidNumber", "homeDirectory"],
                &["userPassword", "loginShell", "gecos", "description"],
            ),
            class(
                "1.3.6.1.1.1.2.1",
                "shadowAccount",
                &["top"],
                &["uid"],
                &["userPassword", "shadowLastChange", "shadowWarning", "description"],
            ),
            class(
                "1.3.6.1.1.1.2.2",
                "posixGroup",
                &["top"],
                &["cn", "gidNumber"],
                &["userPassword", "memberUid", "description"],
            ),
        ];

        let schema = attributes
            .into_iter()
            .fold(Schema::default(), |schema, a| schema.with_attribute(a));

        classes
            .into_iter()
            .fold(schema, |schema, c| schema.with_class(c))
    }
}

fn attribute(oid: &str, names: &[&str], single_value: bool) -> AttributeType {
    AttributeType {
        oid: oid.to_owned(),
        names: names.iter().map(|n| n.to_string()).collect(),
        single_value,
    }
}

fn class(oid: &str, name: &str, sup: &[&str], must: &[&str], may: &[&str]) -> ObjectClass {
    let owned = |v: &[&str]| v.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    ObjectClass {
        oid: oid.to_owned(),
        names: vec![name.to_owned()],
        sup: owned(sup),
        must: owned(must),
        may: owned(may),
    }
}
