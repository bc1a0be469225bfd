use std::fmt;

/// One line the dispatch loop writes to the server.
///
/// `Display` renders the wire form without the CRLF terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Pass { password: String },
    User { username: String, host: String, realname: String },
    Ping { server: String },
    Pong { token: String },
    Join { channel: String, key: Option<String> },
    Part { channel: String, reason: Option<String> },
    ChangeNick { nick: String },
    SetTopic { channel: String, text: String },
    SetAway { message: Option<String> },
    SendPrivmsg { target: String, text: String },
    SendRaw { command: String },
    Quit { message: Option<String> },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Pass { password } => write!(f, "PASS {password}"),
            Action::User {
                username,
                host,
                realname,
            } => write!(f, "USER {username} localhost {host} :{realname}"),
            Action::Ping { server } => write!(f, "PING {server}"),
            Action::Pong { token } => write!(f, "PONG {token}"),
            Action::Join { channel, key: None } => write!(f, "JOIN {channel}"),
            Action::Join {
                channel,
                key: Some(key),
            } => write!(f, "JOIN {channel} {key}"),
            Action::Part {
                channel,
                reason: None,
            } => write!(f, "PART {channel}"),
            Action::Part {
                channel,
                reason: Some(reason),
            } => write!(f, "PART {channel} :{reason}"),
            Action::ChangeNick { nick } => write!(f, "NICK {nick}"),
            Action::SetTopic { channel, text } => write!(f, "TOPIC {channel} :{text}"),
            Action::SetAway { message: None } => write!(f, "AWAY"),
            Action::SetAway {
                message: Some(message),
            } => write!(f, "AWAY :{message}"),
            Action::SendPrivmsg { target, text } => write!(f, "PRIVMSG {target} :{text}"),
            Action::SendRaw { command } => write!(f, "{command}"),
            Action::Quit { message: None } => write!(f, "QUIT"),
            Action::Quit {
                message: Some(message),
            } => write!(f, "QUIT :{message}"),
        }
    }
}
