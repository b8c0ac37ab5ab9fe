//! Line-oriented control commands for the pedalboard

mod commands;
mod parser;

pub use commands::{Command, SourceKind};
pub use parser::{parse_command, ParseError, HELP};
