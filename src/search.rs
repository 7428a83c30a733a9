use std::io::{self, Write};

use anyhow::Result;
use clap::Args;

use crate::config::DirectoryBuilder;
use engine::SessionOpener;
use kernel::prelude::{Dn, Filter, SearchRequest, SearchScope};

#[derive(Debug, Args, Clone)]
pub struct Command {
    #[arg(short, long, default_value = "")]
    base: String,
    #[arg(short, long, default_value = "subtree")]
    scope: SearchScope,
    #[arg(short, long, default_value = "(objectClass=*)")]
    filter: String,
    #[arg(short, long)]
    attrs: Vec<String>,
    #[arg(long)]
    size_limit: Option<usize>,
}

impl Command {
    fn request(&self) -> Result<SearchRequest> {
        let filter: Filter = self.filter.parse()?;
        let mut request = SearchRequest::new(Dn::new(&self.base), filter).scope(self.scope);
        if !self.attrs.is_empty() {
            let names = self.attrs.iter().map(|a| a.as_str()).collect::<Vec<_>>();
            request = request.only(&names);
        }
        if let Some(limit) = self.size_limit {
            request = request.size_limit(limit);
        }

        Ok(request)
    }
}

pub fn execute_command(builder: &DirectoryBuilder, cmd: &Command) -> Result<()> {
    let directory = builder.build()?;
    let session = directory.open_session()?;

    let entries = session.search(cmd.request()?)?;

    let mut stdout = io::stdout();
    stdout.write_all(&serde_json::to_vec_pretty(&entries)?)?;
    stdout.write_all(b"\n")?;

    Ok(())
}
