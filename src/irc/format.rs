//! Human-readable rendering of server events for `out` logs.

use crate::irc::message::{is_global, is_numeric, ParsedEvent};

/// Render an event as a log line. An empty string means "do not log".
pub fn format_event(p: &ParsedEvent) -> String {
    match p.command.as_str() {
        "ERROR" => format!("-!- ERROR: {}", p.arg(0)),
        "JOIN" => format!(
            "-!- {} ({}) has joined {}",
            p.source_nick,
            p.source_info,
            p.channel
        ),
        "KICK" => format!(
            "-!- {} kicked {} from {} (\"{}\")",
            p.source_nick,
            p.arg(1),
            p.arg(0),
            p.arg(2)
        ),
        "MODE" => format!(
            "-!- {} changed mode/{} -> {}",
            p.source_nick,
            p.arg(0),
            p.args.get(1..).unwrap_or_default().join(" ")
        ),
        "NICK" => format!("-!- {} changed nick to {}", p.source_nick, p.arg(0)),
        "NOTICE" => {
            // Server notices have no `user@host`.
            if p.source_info.is_empty() {
                format!("-!- NOTICE: {}", p.text())
            } else {
                format!("-!- NOTICE: {}: {}", p.source_nick, p.text())
            }
        }
        "QUIT" => format!(
            "-!- {} ({}) has quit ({})",
            p.source_nick,
            p.source_info,
            p.text()
        ),
        "PART" => format!(
            "-!- {} ({}) has left {}",
            p.source_nick,
            p.source_info,
            p.arg(0)
        ),
        "PRIVMSG" => format!("{}: {}", p.source_nick, p.arg(1)),
        "TOPIC" => format!(
            "-!- {} changed the topic to \"{}\"",
            p.source_nick,
            p.arg(1)
        ),
        "INVITE" => format!("-!- {} invited you to {}", p.source_nick, p.arg(1)),
        cmd if is_global(cmd) || is_numeric(cmd) => {
            p.args.get(1..).unwrap_or_default().join(" ")
        }
        _ => String::new(),
    }
}
