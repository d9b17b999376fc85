//! Read, load and write `.env` files.
//!
//! [`parse_str`] and [`unmarshal`] decode env text, [`marshal`] encodes a
//! mapping back into canonical text that decodes to the same values.
//!
//! [`EnvLoader`] reads one or more files and applies them to an
//! [`EnvStore`]. It defaults to an in-memory [`TargetEnv`], so loading is
//! process-isolated unless a process target is requested. The free
//! [`load`], [`overload`] and [`dotenv`] functions mutate the process
//! environment and are `unsafe`, because callers must guarantee no
//! concurrent process-environment access.

mod command;
mod env;
mod error;
mod expand;
mod loader;
mod marshal;
mod model;
mod parser;

pub use command::{command, exec};
pub use env::{EmptyEnv, EnvLookup, EnvStore, SystemEnv, TargetEnv};
pub use error::{Error, ParseError, ParseErrorKind};
pub use loader::{EnvLoader, dotenv, load, overload, read};
pub use marshal::{marshal, write_file};
pub use model::{
    EnvMap, Entry, KeyParsingMode, LoadReport, ParseOptions, SubstitutionMode,
};
pub use parser::{
    parse_bytes, parse_bytes_with, parse_reader, parse_reader_with, parse_str, parse_str_with,
    unmarshal, unmarshal_bytes, unmarshal_with,
};
