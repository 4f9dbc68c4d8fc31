//! Positional argument handling: `[FILENAME] COMMAND [ARGS]...`

use editenv_core::{Assignment, Command, EditEnvError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("You need to specify at least one command.")]
    NoCommand,

    #[error("Unknown command `{0}'.")]
    UnknownCommand(String),

    #[error(transparent)]
    Parameter(#[from] EditEnvError),
}

impl InvocationError {
    /// Usage mistakes are followed by the usage line
    pub fn wants_usage(&self) -> bool {
        matches!(self, Self::NoCommand | Self::UnknownCommand(_))
    }
}

/// Parsed positional arguments
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    /// `None` when only a command was given
    pub filename: Option<String>,
    pub command: Command,
}

impl Invocation {
    /// A single argument is the command; otherwise the first is the file
    pub fn parse(args: &[String]) -> Result<Self, InvocationError> {
        let (filename, command, rest) = match args {
            [] => return Err(InvocationError::NoCommand),
            [command] => (None, command, &[][..]),
            [filename, command, rest @ ..] => (Some(filename.clone()), command, rest),
        };

        let command = match command.as_str() {
            "create" => Command::Create,
            "list" => Command::List,
            "set" => Command::Set(
                rest.iter()
                    .map(|arg| arg.parse::<Assignment>())
                    .collect::<Result<Vec<_>, EditEnvError>>()?,
            ),
            "unset" => Command::Unset(rest.to_vec()),
            other => return Err(InvocationError::UnknownCommand(other.to_string())),
        };

        Ok(Self { filename, command })
    }
}
