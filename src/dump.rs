use std::io::{self, Write};

use anyhow::Result;
use clap::Args;

use crate::config::DirectoryBuilder;

#[derive(Debug, Args, Clone)]
pub struct Command {
    #[arg(short, long)]
    lines: bool,
}

pub fn execute_command(builder: &DirectoryBuilder, cmd: &Command) -> Result<()> {
    let directory = builder.build()?;

    let entries = directory.query_all()?;
    let mut stdout = io::stdout();
    if cmd.lines {
        for entry in entries {
            stdout.write_all(&serde_json::to_vec(&entry)?)?;
            stdout.write_all(b"\n")?;
        }
    } else {
        stdout.write_all(&serde_json::to_vec(&entries)?)?;
    }

    Ok(())
}
