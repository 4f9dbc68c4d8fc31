//! grub-editenv: edit the bootloader environment block

mod invocation;
mod logger;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser};
use editenv_core::config::DEFAULT_BOOT_DIR;
use editenv_core::probe::{self, HostTopology};
use editenv_core::{command, Config, Placement};
use tracing::info;

use crate::invocation::Invocation;

const AFTER_HELP: &str = "\
Commands:
  create                    Create a blank environment block file.
  list                      List the current variables.
  set [NAME=VALUE ...]      Set variables.
  unset [NAME ...]          Delete variables.

If FILENAME is `-', the default value /boot/grub/grubenv is used.

There is no `delete' command; if you want to delete the whole environment
block, use `rm /boot/grub/grubenv'.";

#[derive(Parser, Debug)]
#[command(
    name = "grub-editenv",
    version,
    about = "Tool to edit environment block.",
    override_usage = "grub-editenv [OPTIONS] [FILENAME] COMMAND [ARGS]...",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Print verbose messages
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Directory holding the default environment block
    #[arg(long, env = "GRUB_EDITENV_BOOT_DIR", default_value = DEFAULT_BOOT_DIR, hide = true)]
    boot_dir: PathBuf,

    #[arg(value_name = "ARGS", trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version land here too
            let code: u8 = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    logger::init(cli.verbose);

    let invocation = match Invocation::parse(&cli.args) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("grub-editenv: error: {err}");
            if err.wants_usage() {
                eprintln!("{}", Cli::command().render_usage());
            }
            return ExitCode::FAILURE;
        }
    };

    match run(&Config::with_boot_dir(cli.boot_dir), &invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("grub-editenv: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, invocation: &Invocation) -> Result<()> {
    let path = config.resolve(invocation.filename.as_deref());

    let placement = if config.should_probe(&path) {
        probe::resolve_placement(&HostTopology::new(), &config.boot_dir)
    } else {
        Placement::FileOnly
    };
    info!(path = %path.display(), ?placement, "environment block");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    command::run(&invocation.command, &path, &placement, &mut out)?;
    out.flush().context("cannot flush standard output")?;
    Ok(())
}
