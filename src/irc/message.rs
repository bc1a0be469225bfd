//! IRC line parser.
//!
//! Turns one raw protocol line (`:nick!user@host COMMAND arg :trailing text`)
//! into a typed [`ParsedEvent`]. Pure: no I/O, no shared state.

use crate::error::ParseError;

/// Commands that carry no channel scope. Their first argument is never
/// treated as a channel and they are always logged to the server session.
pub const GLOBAL_COMMANDS: &[&str] = &["ERROR", "NICK", "QUIT", "PING", "PONG"];

/// A parsed IRC line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEvent {
    /// Origin nick (or server name). Empty when the line has no origin.
    pub source_nick: String,
    /// `user@host` part of the origin, empty if absent.
    pub source_info: String,
    pub command: String,
    /// Lowercased target channel; empty for global commands and numerics.
    pub channel: String,
    pub args: Vec<String>,
    pub raw: String,
}

impl ParsedEvent {
    /// Parse a single line. Trailing CR/LF are ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let raw = line.trim_end_matches(['\r', '\n']);
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut rest = raw;
        let mut source_nick = String::new();
        let mut source_info = String::new();

        if let Some(stripped) = rest.strip_prefix(':') {
            let Some((origin, after)) = stripped.split_once(' ') else {
                return Err(ParseError::MissingCommand(raw.to_string()));
            };
            match origin.split_once('!') {
                Some((nick, info)) => {
                    source_nick = nick.to_string();
                    source_info = info.to_string();
                }
                None => source_nick = origin.to_string(),
            }
            rest = after;
        }

        let rest = rest.trim_start_matches(' ');
        let (command, mut rest) = match rest.split_once(' ') {
            Some((cmd, after)) => (cmd, after),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(ParseError::MissingCommand(raw.to_string()));
        }

        let mut args = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            // A lone ':' at the very end of the line is an ordinary token.
            if rest.len() > 1 {
                if let Some(trailing) = rest.strip_prefix(':') {
                    args.push(trailing.to_string());
                    break;
                }
            }
            match rest.split_once(' ') {
                Some((token, after)) => {
                    args.push(token.to_string());
                    rest = after;
                }
                None => {
                    args.push(rest.to_string());
                    break;
                }
            }
        }

        let channel = if is_global(command) || is_numeric(command) {
            String::new()
        } else {
            args.first().map(|a| a.to_lowercase()).unwrap_or_default()
        };

        Ok(ParsedEvent {
            source_nick,
            source_info,
            command: command.to_string(),
            channel,
            args,
            raw: raw.to_string(),
        })
    }

    pub fn arg(&self, index: usize) -> &str {
        self.args.get(index).map(String::as_str).unwrap_or("")
    }

    /// Last argument, usually the trailing text.
    pub fn text(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or("")
    }
}

pub fn is_global(command: &str) -> bool {
    GLOBAL_COMMANDS.contains(&command)
}

/// Three-digit numeric server replies (`001`, `372`, `433`, ...).
pub fn is_numeric(command: &str) -> bool {
    command.len() == 3 && command.bytes().all(|b| b.is_ascii_digit())
}
