use std::env;
use std::ffi::OsString;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{self, Command};

use envfile::{EnvLoader, KeyParsingMode, SubstitutionMode, SystemEnv};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILE: &str = ".env";
const LOG_ENV: &str = "ENVFILE_LOG";

const HELP: &str = "\
envfile - load, run with and format env files

Usage:
  envfile run [OPTIONS] -- COMMAND [ARGS...]
  envfile run [OPTIONS] COMMAND [ARGS...]
  envfile fmt [OPTIONS]
  envfile --help
  envfile --version

Commands:
  run       Load env files and execute a command
  fmt       Print env files in canonical form
";

const LOAD_OPTIONS_HELP: &str = "\
  -f, --file <PATHS>      Env file path(s). Repeat or pass comma-separated paths.
                          Defaults to .env.
  -C, --dir <DIR>         Resolve relative env file paths against DIR.
  -i, --ignore-missing    Skip files that cannot be read or parsed.
  -o, --overload          Override existing environment variables.
      --no-expand         Do not expand $VAR placeholders in values.
      --strict-keys       Only accept keys made of [A-Za-z0-9_.-].
  -v, --verbose           Print loader diagnostics to stderr.
  -q, --quiet             Only print errors.
  -h, --help              Show this help text.
";

const RUN_USAGE: &str = "\
envfile run - load env files and execute a command

Usage:
  envfile run [OPTIONS] -- COMMAND [ARGS...]
  envfile run [OPTIONS] COMMAND [ARGS...]

Options:
";

const FMT_USAGE: &str = "\
envfile fmt - print env files in canonical form

Usage:
  envfile fmt [OPTIONS]

Options:
  -w, --write <PATH>      Write the output to PATH instead of stdout.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Subcommand {
    Help,
    Run(RunOptions),
    Fmt(FmtOptions),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LoadOptions {
    files: Vec<PathBuf>,
    base_dir: Option<PathBuf>,
    strict: bool,
    override_existing: bool,
    substitution_mode: SubstitutionMode,
    key_parsing_mode: KeyParsingMode,
    verbosity: Verbosity,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            base_dir: None,
            strict: true,
            override_existing: false,
            substitution_mode: SubstitutionMode::Expand,
            key_parsing_mode: KeyParsingMode::Lenient,
            verbosity: Verbosity::Normal,
        }
    }
}

impl LoadOptions {
    fn loader(&self) -> EnvLoader {
        let mut loader = EnvLoader::new()
            .paths(&self.files)
            .strict(self.strict)
            .override_existing(self.override_existing)
            .substitution_mode(self.substitution_mode)
            .key_parsing_mode(self.key_parsing_mode);
        if let Some(dir) = &self.base_dir {
            loader = loader.base_dir(dir);
        }
        loader
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct RunOptions {
    load: LoadOptions,
    command: OsString,
    args: Vec<OsString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct FmtOptions {
    load: LoadOptions,
    write: Option<PathBuf>,
}

fn main() {
    process::exit(run(env::args_os()));
}

fn run(args: impl IntoIterator<Item = OsString>) -> i32 {
    let mut args = args.into_iter();
    let _bin = args.next();

    let Some(subcommand) = args.next() else {
        print_help();
        return 0;
    };

    let subcommand = subcommand.to_string_lossy();
    let parsed = match subcommand.as_ref() {
        "-h" | "--help" | "help" => {
            print_help();
            return 0;
        }
        "-V" | "--version" | "version" => {
            print_version();
            return 0;
        }
        "run" => parse_run_options(args.collect()),
        "fmt" => parse_fmt_options(args.collect()),
        unknown => {
            eprintln!("envfile: unknown subcommand `{unknown}`");
            eprintln!("Try `envfile --help`.");
            return 1;
        }
    };

    let result = match parsed {
        Ok(Subcommand::Help) => {
            print_subcommand_help(&subcommand);
            return 0;
        }
        Ok(Subcommand::Run(options)) => {
            init_logging(options.load.verbosity);
            execute_run(options)
        }
        Ok(Subcommand::Fmt(options)) => {
            init_logging(options.load.verbosity);
            execute_fmt(options)
        }
        Err(err) => {
            eprintln!("envfile: {err}");
            eprintln!("Try `envfile {subcommand} --help`.");
            return 1;
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("envfile: {err}");
            1
        }
    }
}

/// Consume one shared loader option starting at `args[index]`.
///
/// Returns the index of the next unread argument, or `None` when the token is
/// not a loader option.
fn parse_load_option(
    args: &[OsString],
    index: usize,
    options: &mut LoadOptions,
) -> Result<Option<usize>, String> {
    let token = args[index].to_string_lossy();
    let next = match token.as_ref() {
        "-f" | "--file" => {
            let Some(value) = args.get(index + 1) else {
                return Err("missing value for `-f/--file`".to_owned());
            };
            parse_file_text(&value.to_string_lossy(), &mut options.files)?;
            index + 2
        }
        value if value.starts_with("--file=") => {
            parse_file_text(&value["--file=".len()..], &mut options.files)?;
            index + 1
        }
        "-C" | "--dir" => {
            let Some(value) = args.get(index + 1) else {
                return Err("missing value for `-C/--dir`".to_owned());
            };
            options.base_dir = Some(PathBuf::from(value));
            index + 2
        }
        "-i" | "--ignore-missing" => {
            options.strict = false;
            index + 1
        }
        "-o" | "--overload" | "--override" => {
            options.override_existing = true;
            index + 1
        }
        "--no-expand" => {
            options.substitution_mode = SubstitutionMode::Disabled;
            index + 1
        }
        "--strict-keys" => {
            options.key_parsing_mode = KeyParsingMode::Strict;
            index + 1
        }
        "-v" | "--verbose" => {
            options.verbosity = Verbosity::Verbose;
            index + 1
        }
        "-q" | "--quiet" => {
            options.verbosity = Verbosity::Quiet;
            index + 1
        }
        _ => return Ok(None),
    };
    Ok(Some(next))
}

fn parse_run_options(args: Vec<OsString>) -> Result<Subcommand, String> {
    let mut options = RunOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        if let Some(next) = parse_load_option(&args, index, &mut options.load)? {
            index = next;
            continue;
        }

        let token = args[index].to_string_lossy();
        match token.as_ref() {
            "--" => {
                index += 1;
                break;
            }
            "-h" | "--help" => return Ok(Subcommand::Help),
            unknown if unknown.starts_with('-') => {
                return Err(format!("unknown option `{unknown}`"));
            }
            _ => break,
        }
    }

    let remaining = &args[index..];
    let Some((command, command_args)) = remaining.split_first() else {
        return Err("missing command after `run`".to_owned());
    };

    apply_default_file(&mut options.load);
    options.command = command.clone();
    options.args = command_args.to_vec();
    Ok(Subcommand::Run(options))
}

fn parse_fmt_options(args: Vec<OsString>) -> Result<Subcommand, String> {
    let mut options = FmtOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        if let Some(next) = parse_load_option(&args, index, &mut options.load)? {
            index = next;
            continue;
        }

        let token = args[index].to_string_lossy();
        match token.as_ref() {
            "-w" | "--write" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("missing value for `-w/--write`".to_owned());
                };
                options.write = Some(PathBuf::from(value));
                index += 2;
            }
            "-h" | "--help" => return Ok(Subcommand::Help),
            unknown => return Err(format!("unexpected argument `{unknown}`")),
        }
    }

    apply_default_file(&mut options.load);
    Ok(Subcommand::Fmt(options))
}

fn apply_default_file(options: &mut LoadOptions) {
    if options.files.is_empty() {
        options.files.push(PathBuf::from(DEFAULT_FILE));
    }
}

fn parse_file_text(raw: &str, files: &mut Vec<PathBuf>) -> Result<(), String> {
    let mut added = 0usize;
    for segment in raw.split(',') {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        files.push(PathBuf::from(trimmed));
        added += 1;
    }
    if added == 0 {
        return Err("`-f/--file` requires at least one path".to_owned());
    }
    Ok(())
}

fn execute_run(options: RunOptions) -> Result<i32, envfile::Error> {
    let loader = options.load.loader();
    let command = envfile::command(&loader, &options.command, &options.args)?;
    Ok(execute_command(command, &options.command))
}

fn execute_fmt(options: FmtOptions) -> Result<i32, envfile::Error> {
    let map = options.load.loader().read_map_with(&SystemEnv)?;
    match &options.write {
        Some(path) => envfile::write_file(&map, path)?,
        None => println!("{}", envfile::marshal(&map)?),
    }
    Ok(0)
}

#[cfg(unix)]
fn execute_command(mut command: Command, program: &OsString) -> i32 {
    let err = command.exec();
    eprintln!(
        "envfile: failed to execute `{}`: {err}",
        program.to_string_lossy()
    );
    127
}

#[cfg(not(unix))]
fn execute_command(mut command: Command, program: &OsString) -> i32 {
    match command.status() {
        Ok(status) => status.code().unwrap_or(1),
        Err(err) => {
            eprintln!(
                "envfile: failed to execute `{}`: {err}",
                program.to_string_lossy()
            );
            127
        }
    }
}

fn init_logging(verbosity: Verbosity) {
    let filter = match verbosity {
        Verbosity::Quiet => EnvFilter::new("error"),
        Verbosity::Verbose => EnvFilter::new("debug"),
        Verbosity::Normal => {
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_help() {
    println!("{HELP}");
}

fn print_subcommand_help(subcommand: &str) {
    match subcommand {
        "fmt" => println!("{FMT_USAGE}{LOAD_OPTIONS_HELP}"),
        _ => println!("{RUN_USAGE}{LOAD_OPTIONS_HELP}"),
    }
}

fn print_version() {
    println!("envfile {}", env!("CARGO_PKG_VERSION"));
}
