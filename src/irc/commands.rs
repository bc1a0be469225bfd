//! Local command parser for lines written to an `in` pipe.
//!
//! Lines starting with `/` are commands; everything else is a message for
//! the topic the pipe belongs to. Unknown commands are passed to the server
//! as raw lines with the `/` removed.

/// A parsed local command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Join { channel: String, key: Option<String> },
    Leave { reason: Option<String> },
    Nick { nick: String },
    Topic { text: String },
    Away { message: Option<String> },
    Raw { command: String },
}

/// Parse a `/command ...` line into a [`ParsedCommand`].
///
/// Returns `None` if the input does not start with `/` or a known command
/// is missing its required argument.
pub fn parse_command(input: &str) -> Option<ParsedCommand> {
    let input = input.trim_end();
    let body = input.strip_prefix('/')?;

    let (cmd, rest) = match body.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (body, ""),
    };
    let rest = (!rest.is_empty()).then_some(rest);

    match cmd.to_lowercase().as_str() {
        "j" | "join" => {
            let mut parts = rest?.split_whitespace();
            let channel = parts.next()?.to_string();
            let key = parts.next().map(|k| k.to_string());
            Some(ParsedCommand::Join { channel, key })
        }
        "l" | "leave" => Some(ParsedCommand::Leave {
            reason: rest.map(|r| r.to_string()),
        }),
        "n" | "nick" => {
            let nick = rest?.split_whitespace().next()?.to_string();
            Some(ParsedCommand::Nick { nick })
        }
        "t" | "topic" => Some(ParsedCommand::Topic {
            text: rest?.to_string(),
        }),
        "a" | "away" => Some(ParsedCommand::Away {
            message: rest.map(|r| r.to_string()),
        }),
        "" => None,
        _ => Some(ParsedCommand::Raw {
            command: body.to_string(),
        }),
    }
}

/// Channel names as opposed to nicknames.
pub fn is_channel_name(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}
