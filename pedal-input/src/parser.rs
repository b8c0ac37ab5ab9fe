//! Text command parser

use std::path::PathBuf;

use pedal_audio::{EffectKind, NodeId};
use thiserror::Error;

use crate::commands::{Command, SourceKind};

/// Prompt help text
pub const HELP: &str = "\
add <type>               append a pedal (overdrive, fuzz, delay, analog_delay,
                         chorus, flanger, tremolo, autowah, reverb)
rm <id>                  remove a pedal
mv <from> <to>           move the pedal at position <from> to <to>
set <id> <param> <value> turn a knob
mix <id> <0..1>          wet/dry balance
bypass <id>              toggle bypass
source mic|tone|silence  switch the input
source file <path>       loop an audio file
save <path>              write the board as a preset
load <path>              replace the board with a preset
list                     show the board
quit                     exit";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command '{0}' (try 'help')")]
    UnknownCommand(String),
    #[error("'{command}' needs <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("<{argument}> must be a number, got '{value}'")]
    InvalidNumber {
        argument: &'static str,
        value: String,
    },
    #[error("<{argument}> {value} is outside {min}..{max}")]
    OutOfRange {
        argument: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("Unknown effect type '{0}'")]
    UnknownEffect(String),
    #[error("Unknown source '{0}' (mic, tone, silence or file <path>)")]
    UnknownSource(String),
    #[error("Unexpected '{0}' after command")]
    TrailingInput(String),
}

/// Whitespace tokens of one command line
struct Args<'a> {
    command: &'static str,
    rest: &'a str,
}

impl<'a> Args<'a> {
    fn new(command: &'static str, rest: &'a str) -> Self {
        Self {
            command,
            rest: rest.trim_start(),
        }
    }

    fn next(&mut self, argument: &'static str) -> Result<&'a str, ParseError> {
        let rest = self.rest;
        if rest.is_empty() {
            return Err(ParseError::MissingArgument {
                command: self.command,
                argument,
            });
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        self.rest = rest[end..].trim_start();
        Ok(&rest[..end])
    }

    fn number<T: std::str::FromStr>(&mut self, argument: &'static str) -> Result<T, ParseError> {
        let token = self.next(argument)?;
        token.parse().map_err(|_| ParseError::InvalidNumber {
            argument,
            value: token.to_string(),
        })
    }

    fn id(&mut self) -> Result<NodeId, ParseError> {
        self.number("id").map(NodeId)
    }

    /// Remainder as a path, quotes stripped
    fn path(&mut self) -> Result<PathBuf, ParseError> {
        let path = unquote(self.rest.trim());
        if path.is_empty() {
            return Err(ParseError::MissingArgument {
                command: self.command,
                argument: "path",
            });
        }
        self.rest = "";
        Ok(PathBuf::from(path))
    }

    fn finish(self, command: Command) -> Result<Command, ParseError> {
        if self.rest.is_empty() {
            Ok(command)
        } else {
            Err(ParseError::TrailingInput(self.rest.to_string()))
        }
    }
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Parse one prompt line
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let input = line.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }
    let (word, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));

    match word.to_ascii_lowercase().as_str() {
        "add" => {
            let mut args = Args::new("add", rest);
            let name = args.next("type")?;
            let kind: EffectKind = name
                .parse()
                .map_err(|_| ParseError::UnknownEffect(name.to_string()))?;
            args.finish(Command::Add(kind))
        }
        "rm" | "remove" => {
            let mut args = Args::new("rm", rest);
            let id = args.id()?;
            args.finish(Command::Remove(id))
        }
        "mv" | "move" => {
            let mut args = Args::new("mv", rest);
            let from = args.number("from")?;
            let to = args.number("to")?;
            args.finish(Command::Move { from, to })
        }
        "set" => {
            let mut args = Args::new("set", rest);
            let id = args.id()?;
            let param = args.next("param")?.to_ascii_lowercase();
            let value: f32 = args.number("value")?;
            if !value.is_finite() {
                return Err(ParseError::InvalidNumber {
                    argument: "value",
                    value: value.to_string(),
                });
            }
            args.finish(Command::Set { id, param, value })
        }
        "mix" => {
            let mut args = Args::new("mix", rest);
            let id = args.id()?;
            let mix: f32 = args.number("mix")?;
            if !(0.0..=1.0).contains(&mix) {
                return Err(ParseError::OutOfRange {
                    argument: "mix",
                    value: mix,
                    min: 0.0,
                    max: 1.0,
                });
            }
            args.finish(Command::Mix { id, mix })
        }
        "bypass" => {
            let mut args = Args::new("bypass", rest);
            let id = args.id()?;
            args.finish(Command::Bypass(id))
        }
        "source" => {
            let mut args = Args::new("source", rest);
            let name = args.next("source")?;
            let source = match name.to_ascii_lowercase().as_str() {
                "mic" | "input" => SourceKind::Mic,
                "tone" => SourceKind::Tone,
                "silence" | "off" => SourceKind::Silence,
                "file" => SourceKind::File(args.path()?),
                _ => return Err(ParseError::UnknownSource(name.to_string())),
            };
            args.finish(Command::Source(source))
        }
        "save" => Args::new("save", rest).path().map(Command::Save),
        "load" => Args::new("load", rest).path().map(Command::Load),
        "list" | "ls" => Args::new("list", rest).finish(Command::List),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        _ => Err(ParseError::UnknownCommand(word.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_commands() {
        assert_eq!(
            parse_command("add overdrive"),
            Ok(Command::Add(EffectKind::Overdrive))
        );
        assert_eq!(
            parse_command("  ADD Auto_Wah "),
            Ok(Command::Add(EffectKind::AutoWah))
        );
        assert_eq!(parse_command("rm 3"), Ok(Command::Remove(NodeId(3))));
        assert_eq!(
            parse_command("mv 1 0"),
            Ok(Command::Move { from: 1, to: 0 })
        );
    }

    #[test]
    fn test_knob_commands() {
        assert_eq!(
            parse_command("set 2 Drive 75.5"),
            Ok(Command::Set {
                id: NodeId(2),
                param: "drive".to_string(),
                value: 75.5
            })
        );
        assert_eq!(
            parse_command("mix 1 0.25"),
            Ok(Command::Mix {
                id: NodeId(1),
                mix: 0.25
            })
        );
        assert_eq!(parse_command("bypass 4"), Ok(Command::Bypass(NodeId(4))));
    }

    #[test]
    fn test_sources_and_paths() {
        assert_eq!(
            parse_command("source tone"),
            Ok(Command::Source(SourceKind::Tone))
        );
        assert_eq!(
            parse_command("source file \"my riffs/take 1.wav\""),
            Ok(Command::Source(SourceKind::File(PathBuf::from(
                "my riffs/take 1.wav"
            ))))
        );
        assert_eq!(
            parse_command("save presets/lead.json"),
            Ok(Command::Save(PathBuf::from("presets/lead.json")))
        );
        assert_eq!(
            parse_command("load 'a b.json'"),
            Ok(Command::Load(PathBuf::from("a b.json")))
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_command("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_command("add sitar"),
            Err(ParseError::UnknownEffect("sitar".to_string()))
        );
        assert_eq!(
            parse_command("rm"),
            Err(ParseError::MissingArgument {
                command: "rm",
                argument: "id"
            })
        );
        assert!(matches!(
            parse_command("rm x"),
            Err(ParseError::InvalidNumber { argument: "id", .. })
        ));
        assert!(matches!(
            parse_command("mix 1 1.5"),
            Err(ParseError::OutOfRange { .. })
        ));
        assert_eq!(
            parse_command("bypass 1 2"),
            Err(ParseError::TrailingInput("2".to_string()))
        );
        assert_eq!(
            parse_command("source radio"),
            Err(ParseError::UnknownSource("radio".to_string()))
        );
        assert!(matches!(
            parse_command("launch"),
            Err(ParseError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("list"), Ok(Command::List));
        assert_eq!(parse_command("q"), Ok(Command::Quit));
        assert_eq!(parse_command("help"), Ok(Command::Help));
    }
}
