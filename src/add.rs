use std::io::{self, Write};

use anyhow::{anyhow, Result};
use clap::Args;

use crate::config::DirectoryBuilder;
use engine::SessionOpener;
use kernel::prelude::{Dn, Entry, Principal};

#[derive(Debug, Args, Clone)]
pub struct Command {
    #[arg(short, long)]
    dn: String,
    /// Repeatable, `name=value`.
    #[arg(short, long = "attr", value_name = "NAME=VALUE")]
    attrs: Vec<String>,
    /// Principal performing the add, root when omitted.
    #[arg(short, long, value_name = "DN")]
    bind: Option<String>,
}

impl Command {
    fn principal(&self) -> Principal {
        match &self.bind {
            Some(dn) => Principal::Dn(Dn::new(dn)),
            None => Principal::Root,
        }
    }

    fn entry(&self) -> Result<Entry> {
        let mut entry = Entry::new(Dn::new(&self.dn));
        for attr in self.attrs.iter() {
            let (name, value) = attr
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected name=value, got '{}'", attr))?;
            entry.add_value(name.trim(), value.trim());
        }

        Ok(entry)
    }
}

pub fn execute_command(builder: &DirectoryBuilder, cmd: &Command) -> Result<()> {
    let directory = builder.build()?;
    let session = directory.open_session()?;

    let added = session.add(cmd.principal(), cmd.entry()?)?;

    let mut stdout = io::stdout();
    stdout.write_all(&serde_json::to_vec_pretty(&added)?)?;
    stdout.write_all(b"\n")?;

    directory.detach()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(attrs: &[&str], bind: Option<&str>) -> Command {
        Command {
            dn: "uid=jacob,ou=people,dc=example".to_owned(),
            attrs: attrs.iter().map(|a| a.to_string()).collect(),
            bind: bind.map(|b| b.to_owned()),
        }
    }

    #[test]
    fn it_builds_entries_from_attribute_arguments() -> Result<()> {
        let entry = command(&["objectClass=top", "objectClass=posixAccount", "cn = Jacob"], None).entry()?;

        assert_eq!(entry.values("objectClass"), &["top", "posixAccount"]);
        assert_eq!(entry.values("cn"), &["Jacob"]);

        Ok(())
    }

    #[test]
    fn it_keeps_equals_signs_in_values() -> Result<()> {
        let entry = command(&["description=a=b"], None).entry()?;

        assert_eq!(entry.values("description"), &["a=b"]);

        Ok(())
    }

    #[test]
    fn it_refuses_malformed_attribute_arguments() {
        assert!(command(&["objectClass"], None).entry().is_err());
    }

    #[test]
    fn it_binds_as_root_by_default() {
        assert_eq!(command(&[], None).principal(), Principal::Root);
        assert_eq!(
            command(&[], Some("uid=admin,dc=example")).principal(),
            Principal::Dn(Dn::new("uid=admin,dc=example"))
        );
    }
}
