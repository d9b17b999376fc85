use std::ffi::OsStr;
use std::process::{Command, ExitStatus};

use crate::env::{EnvLookup, SystemEnv};
use crate::error::Error;
use crate::loader::EnvLoader;

/// Build a [`Command`] for `program` whose environment is the inherited one
/// plus the loader's files.
///
/// Without override, variables already present in the parent environment keep
/// their inherited value. The parent environment itself is never modified.
pub fn command<I, S>(
    loader: &EnvLoader,
    program: impl AsRef<OsStr>,
    args: I,
) -> Result<Command, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let entries = loader.read_with(&SystemEnv)?;

    let mut command = Command::new(program);
    command.args(args);
    for entry in entries {
        if !loader.overrides_existing() && SystemEnv.contains_key(&entry.key) {
            tracing::debug!(key = %entry.key, "keeping inherited value");
            continue;
        }
        command.env(entry.key, entry.value);
    }

    Ok(command)
}

/// Run `program` with the loaded environment, inheriting the standard streams,
/// and wait for it to finish.
pub fn exec<I, S>(
    loader: &EnvLoader,
    program: impl AsRef<OsStr>,
    args: I,
) -> Result<ExitStatus, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = command(loader, program, args)?;
    let status = command.status()?;
    tracing::debug!(?status, "child exited");
    Ok(status)
}
