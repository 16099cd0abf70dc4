//! Completions command - print shell completion scripts

use crate::cli::args::Cli;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io;

/// Write completions for `shell` to stdout
pub fn execute(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
}
