//! The dispatch loop.
//!
//! Single owner of the connection writer and the session registry. Merges
//! the keepalive timer, parsed server events and lines from the `in` pipes,
//! and turns each into at most one write plus log output.

use crate::app::action::Action;
use crate::app::event::UserLine;
use crate::app::registry::SessionRegistry;
use crate::error::{ClientError, ClientResult};
use crate::irc::commands::{is_channel_name, parse_command, ParsedCommand};
use crate::irc::connection;
use crate::irc::format::format_event;
use crate::irc::message::ParsedEvent;
use crate::logging::OutLogger;
use crate::session::layout::TopicDirs;
use crate::session::listener::spawn_listener;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Target of keepalive `PING`s.
    pub server: String,
    pub keepalive: Duration,
    pub quit_message: Option<String>,
}

enum Wake {
    Stop,
    Keepalive,
    Server(ParsedEvent),
    User(UserLine),
}

pub struct Dispatcher {
    settings: DispatchSettings,
    nick: String,
    registry: SessionRegistry,
    dirs: TopicDirs,
    logger: OutLogger,
    shutdown: CancellationToken,
    user_tx: mpsc::UnboundedSender<UserLine>,
    user_rx: mpsc::UnboundedReceiver<UserLine>,
}

impl Dispatcher {
    pub fn new(
        nick: String,
        settings: DispatchSettings,
        dirs: TopicDirs,
        shutdown: CancellationToken,
    ) -> Self {
        let (user_tx, user_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            nick,
            registry: SessionRegistry::new(shutdown.clone()),
            logger: OutLogger::new(dirs.clone()),
            dirs,
            shutdown,
            user_tx,
            user_rx,
        }
    }

    /// Current nickname, updated when the server confirms a change.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    #[cfg(test)]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub fn user_sender(&self) -> mpsc::UnboundedSender<UserLine> {
        self.user_tx.clone()
    }

    /// Activate `topic`, creating its directory and starting its listener
    /// if it was not active yet. On a filesystem error the topic stays
    /// inactive.
    pub async fn open_session(&mut self, topic: &str) -> bool {
        if !self.registry.ensure_active(topic) {
            return true;
        }
        let dirs = self.dirs.clone();
        let owned = topic.to_string();
        let prepared = tokio::task::spawn_blocking(move || dirs.prepare(&owned))
            .await
            .unwrap_or_else(|e| {
                Err(ClientError::filesystem(
                    self.dirs.dir(topic),
                    io::Error::other(e.to_string()),
                ))
            });
        if let Err(e) = prepared {
            error!("Cannot open session {:?}: {}", topic, e);
            self.registry.deactivate(topic);
            return false;
        }
        if let Some(token) = self.registry.session_token(topic) {
            spawn_listener(
                topic.to_string(),
                self.dirs.in_path(topic),
                token,
                self.user_tx.clone(),
            );
        }
        info!("Opened session {:?}", topic);
        true
    }

    /// Serve one connection until `link` is cancelled or a write fails.
    ///
    /// On the way out, server events already queued are still logged and
    /// queued user lines are discarded. If the whole process is shutting
    /// down, a `QUIT` is sent first.
    pub async fn run<W>(
        &mut self,
        writer: &mut W,
        events: &mut mpsc::UnboundedReceiver<ParsedEvent>,
        link: &CancellationToken,
    ) -> ClientResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let period = self.settings.keepalive;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                biased;
                _ = link.cancelled() => Wake::Stop,
                _ = keepalive.tick() => Wake::Keepalive,
                Some(event) = events.recv() => Wake::Server(event),
                Some(line) = self.user_rx.recv() => Wake::User(line),
            };
            match wake {
                Wake::Stop => break,
                Wake::Keepalive => {
                    let ping = Action::Ping {
                        server: self.settings.server.clone(),
                    };
                    self.send(writer, ping).await?;
                }
                Wake::Server(event) => self.handle_server_event(writer, event).await?,
                Wake::User(line) => self.handle_user_line(writer, line).await?,
            }
        }

        while let Ok(event) = events.try_recv() {
            self.record_event(&event).await;
        }
        let mut dropped = 0;
        while self.user_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} pending input line(s)", dropped);
        }

        if self.shutdown.is_cancelled() {
            let quit = Action::Quit {
                message: self.settings.quit_message.clone(),
            };
            if let Err(e) = self.send(writer, quit).await {
                debug!("QUIT not delivered: {}", e);
            }
        }
        Ok(())
    }

    async fn handle_server_event<W>(&mut self, writer: &mut W, event: ParsedEvent) -> ClientResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match event.command.as_str() {
            "PING" => {
                let pong = Action::Pong {
                    token: event.arg(0).to_string(),
                };
                return self.send(writer, pong).await;
            }
            "PONG" => return Ok(()),
            "001" => {
                if !event.arg(0).is_empty() {
                    self.nick = event.arg(0).to_string();
                }
                self.restore_sessions(writer).await?;
            }
            "NICK" if self.is_me(&event.source_nick) => {
                info!("Nick changed to {}", event.arg(0));
                self.nick = event.arg(0).to_string();
            }
            _ => {}
        }
        self.record_event(&event).await;
        Ok(())
    }

    /// Re-join every active channel, e.g. after a reconnect.
    async fn restore_sessions<W>(&mut self, writer: &mut W) -> ClientResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let channels: Vec<String> = self
            .registry
            .active_topics()
            .filter(|t| is_channel_name(t))
            .map(String::from)
            .collect();
        for channel in channels {
            self.send(writer, Action::Join { channel, key: None }).await?;
        }
        Ok(())
    }

    /// Route an event to its topic and append its log line.
    async fn record_event(&mut self, event: &ParsedEvent) {
        let topic = self.resolve_topic(event);

        // Our own PART echo must not bring the session back.
        let own_part = event.command == "PART" && self.is_me(&event.source_nick);
        if !own_part {
            self.open_session(&topic).await;
        }

        let line = format_event(event);
        if line.is_empty() {
            return;
        }
        if let Err(e) = self.logger.log(&topic, &line).await {
            warn!("Log write for {:?} failed: {}", topic, e);
        }
    }

    fn resolve_topic(&self, event: &ParsedEvent) -> String {
        let channel = event.channel.as_str();
        if channel == "*" {
            return String::new();
        }
        if !channel.is_empty() && channel == self.nick.to_lowercase() {
            // Direct messages go to the sender's topic; server-originated
            // ones (no user@host) to the server session.
            if event.source_info.is_empty() {
                return String::new();
            }
            return event.source_nick.to_lowercase();
        }
        channel.to_string()
    }

    async fn handle_user_line<W>(&mut self, writer: &mut W, line: UserLine) -> ClientResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let UserLine { topic, text } = line;

        if !text.starts_with('/') {
            if topic.is_empty() {
                return self.send(writer, Action::SendRaw { command: text }).await;
            }
            let privmsg = Action::SendPrivmsg {
                target: topic.clone(),
                text: text.clone(),
            };
            self.send(writer, privmsg).await?;
            let echo = ParsedEvent {
                source_nick: self.nick.clone(),
                command: "PRIVMSG".to_string(),
                channel: topic.clone(),
                args: vec![topic.clone(), text],
                ..Default::default()
            };
            if let Err(e) = self.logger.log(&topic, &format_event(&echo)).await {
                warn!("Log write for {:?} failed: {}", topic, e);
            }
            return Ok(());
        }

        let Some(command) = parse_command(&text) else {
            warn!("Ignoring invalid command in {:?}: {}", topic, text);
            return Ok(());
        };

        match command {
            ParsedCommand::Join { channel, key } => {
                let target = channel.to_lowercase();
                self.send(writer, Action::Join { channel, key }).await?;
                self.open_session(&target).await;
            }
            ParsedCommand::Leave { reason } => {
                if topic.is_empty() {
                    warn!("Cannot leave the server session");
                    return Ok(());
                }
                let part = Action::Part {
                    channel: topic.clone(),
                    reason,
                };
                self.send(writer, part).await?;
                self.registry.deactivate(&topic);
                info!("Closed session {:?}", topic);
            }
            ParsedCommand::Nick { nick } => {
                self.send(writer, Action::ChangeNick { nick }).await?;
            }
            ParsedCommand::Topic { text } => {
                if topic.is_empty() {
                    warn!("No channel to set a topic on in the server session");
                    return Ok(());
                }
                let set = Action::SetTopic {
                    channel: topic,
                    text,
                };
                self.send(writer, set).await?;
            }
            ParsedCommand::Away { message } => {
                self.send(writer, Action::SetAway { message }).await?;
            }
            ParsedCommand::Raw { command } => {
                self.send(writer, Action::SendRaw { command }).await?;
            }
        }
        Ok(())
    }

    fn is_me(&self, nick: &str) -> bool {
        nick.eq_ignore_ascii_case(&self.nick)
    }

    async fn send<W>(&self, writer: &mut W, action: Action) -> ClientResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        debug!(">> {}", action);
        connection::send(writer, &action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;
    use std::path::Path;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};
    use tokio::task::JoinHandle;

    type ServerLines = Lines<BufReader<DuplexStream>>;

    struct Harness {
        shutdown: CancellationToken,
        user_tx: mpsc::UnboundedSender<UserLine>,
        event_tx: mpsc::UnboundedSender<ParsedEvent>,
        server: ServerLines,
        task: JoinHandle<(Dispatcher, ClientResult<()>)>,
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            server: "irc.test".into(),
            keepalive: Duration::from_secs(3600),
            quit_message: Some("bye".into()),
        }
    }

    async fn start(root: &Path, topics: &[&str], settings: DispatchSettings) -> Harness {
        let shutdown = CancellationToken::new();
        let mut d = Dispatcher::new("me".into(), settings, TopicDirs::new(root), shutdown.clone());
        for topic in topics {
            assert!(d.open_session(topic).await);
        }
        let user_tx = d.user_sender();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (mut client, server) = tokio::io::duplex(4096);
        let link = shutdown.child_token();
        let task = tokio::spawn(async move {
            let result = d.run(&mut client, &mut event_rx, &link).await;
            (d, result)
        });
        Harness {
            shutdown,
            user_tx,
            event_tx,
            server: BufReader::new(server).lines(),
            task,
        }
    }

    impl Harness {
        fn event(&self, line: &str) {
            self.event_tx.send(ParsedEvent::parse(line).unwrap()).unwrap();
        }

        fn user(&self, topic: &str, text: &str) {
            self.user_tx
                .send(UserLine {
                    topic: topic.into(),
                    text: text.into(),
                })
                .unwrap();
        }

        async fn next_line(&mut self) -> Option<String> {
            tokio::time::timeout(Duration::from_secs(5), self.server.next_line())
                .await
                .expect("timed out waiting for a line")
                .unwrap()
        }

        /// Round-trip a PING so every earlier server event has been handled.
        async fn sync(&mut self) {
            self.event("PING :sync");
            assert_eq!(self.next_line().await.as_deref(), Some("PONG sync"));
        }

        async fn stop(self) -> (Dispatcher, Vec<String>) {
            let Harness {
                shutdown,
                task,
                mut server,
                ..
            } = self;
            shutdown.cancel();
            let (d, result) = task.await.unwrap();
            result.unwrap();
            let mut rest = Vec::new();
            while let Some(line) = server.next_line().await.unwrap() {
                rest.push(line);
            }
            (d, rest)
        }
    }

    fn read_out(root: &Path, topic: &str) -> Vec<String> {
        let path = TopicDirs::new(root).out_path(topic);
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|l| l[20..].to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_join_from_root_pipe() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &[""], settings()).await;

        h.user("", "/j #new");
        assert_eq!(h.next_line().await.as_deref(), Some("JOIN #new"));

        let (d, rest) = h.stop().await;
        assert_eq!(rest, vec!["QUIT :bye"]);
        assert!(d.registry().is_active("#new"));
        let meta = std::fs::metadata(tmp.path().join("#new").join("in")).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[tokio::test]
    async fn test_channel_message_is_logged() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &[""], settings()).await;

        h.event(":Bobo PRIVMSG #Dessert chocolate");
        h.sync().await;

        assert_eq!(read_out(tmp.path(), "#dessert"), vec!["Bobo: chocolate"]);
        let (d, _) = h.stop().await;
        assert!(d.registry().is_active("#dessert"));
    }

    #[tokio::test]
    async fn test_private_message_goes_to_sender_topic() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &[""], settings()).await;

        h.event(":Dmr!dmr@bell-labs.com PRIVMSG Me :hello there");
        h.event(":irc.test NOTICE me :server says hi");
        h.sync().await;

        assert_eq!(read_out(tmp.path(), "dmr"), vec!["Dmr: hello there"]);
        assert_eq!(read_out(tmp.path(), ""), vec!["-!- NOTICE: server says hi"]);
        let (d, _) = h.stop().await;
        assert!(d.registry().is_active("dmr"));
        assert!(!d.registry().is_active("me"));
    }

    #[tokio::test]
    async fn test_private_message_from_nick_named_out() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &[""], settings()).await;

        h.event(":out!o@example.org PRIVMSG me :can you see this");
        h.sync().await;

        assert_eq!(read_out(tmp.path(), "out"), vec!["out: can you see this"]);
        assert!(read_out(tmp.path(), "").is_empty());
        let (d, _) = h.stop().await;
        assert!(d.registry().is_active("out"));
    }

    #[tokio::test]
    async fn test_unrecognized_command_is_not_logged() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &["", "#x"], settings()).await;

        h.event(":a!b@c FROBNICATE #x :whatever");
        h.sync().await;

        assert!(read_out(tmp.path(), "#x").is_empty());
        h.stop().await;
    }

    #[tokio::test]
    async fn test_plain_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &["", "#rust"], settings()).await;

        h.user("#rust", "hi all");
        assert_eq!(h.next_line().await.as_deref(), Some("PRIVMSG #rust :hi all"));
        h.user("", "WHOIS dmr");
        assert_eq!(h.next_line().await.as_deref(), Some("WHOIS dmr"));

        h.stop().await;
        assert_eq!(read_out(tmp.path(), "#rust"), vec!["me: hi all"]);
    }

    #[tokio::test]
    async fn test_local_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &["", "#rust"], settings()).await;

        h.user("#rust", "/t Fearless concurrency");
        assert_eq!(
            h.next_line().await.as_deref(),
            Some("TOPIC #rust :Fearless concurrency")
        );
        h.user("#rust", "/a lunch");
        assert_eq!(h.next_line().await.as_deref(), Some("AWAY :lunch"));
        h.user("", "/n ken");
        assert_eq!(h.next_line().await.as_deref(), Some("NICK ken"));
        h.user("", "/j");
        h.user("", "/l");
        h.user("", "/MODE #rust +t");
        assert_eq!(h.next_line().await.as_deref(), Some("MODE #rust +t"));

        h.stop().await;
    }

    #[tokio::test]
    async fn test_leave_deactivates_and_stays_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &["", "#rust"], settings()).await;

        h.user("#rust", "/l gotta go");
        assert_eq!(h.next_line().await.as_deref(), Some("PART #rust :gotta go"));
        h.event(":me!u@h PART #rust :gotta go");
        h.sync().await;

        let (d, _) = h.stop().await;
        assert!(!d.registry().is_active("#rust"));
        assert_eq!(
            read_out(tmp.path(), "#rust"),
            vec!["-!- me (u@h) has left #rust"]
        );
    }

    #[tokio::test]
    async fn test_welcome_rejoins_active_channels() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &["", "#b", "#a", "dmr"], settings()).await;

        h.event(":irc.test 001 me_ :Welcome to the test network");
        assert_eq!(h.next_line().await.as_deref(), Some("JOIN #a"));
        assert_eq!(h.next_line().await.as_deref(), Some("JOIN #b"));
        h.sync().await;

        let (d, _) = h.stop().await;
        assert_eq!(d.nick(), "me_");
        assert_eq!(
            read_out(tmp.path(), ""),
            vec!["Welcome to the test network"]
        );
    }

    #[tokio::test]
    async fn test_own_nick_change_is_tracked() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(tmp.path(), &[""], settings()).await;

        h.event(":me!u@h NICK :ken");
        h.event(":dmr!d@h PRIVMSG ken :psst");
        h.sync().await;

        let (d, _) = h.stop().await;
        assert_eq!(d.nick(), "ken");
        assert!(d.registry().is_active("dmr"));
        assert_eq!(read_out(tmp.path(), ""), vec!["-!- me changed nick to ken"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_ping() {
        let tmp = tempfile::tempdir().unwrap();
        let mut h = start(
            tmp.path(),
            &[],
            DispatchSettings {
                keepalive: Duration::from_secs(1),
                ..settings()
            },
        )
        .await;
        assert_eq!(h.next_line().await.as_deref(), Some("PING irc.test"));
        h.stop().await;
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let h = start(tmp.path(), &[], settings()).await;
        let Harness {
            user_tx,
            server,
            task,
            event_tx: _event_tx,
            shutdown: _shutdown,
        } = h;
        drop(server);

        user_tx
            .send(UserLine {
                topic: "".into(),
                text: "/n ken".into(),
            })
            .unwrap();
        let (_, result) = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[tokio::test]
    async fn test_queued_events_are_logged_after_link_loss() {
        let tmp = tempfile::tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let mut d = Dispatcher::new(
            "me".into(),
            settings(),
            TopicDirs::new(tmp.path()),
            shutdown.clone(),
        );
        d.open_session("").await;
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let link = shutdown.child_token();
        event_tx
            .send(ParsedEvent::parse("ERROR :Closing Link").unwrap())
            .unwrap();
        link.cancel();

        let mut out = Vec::new();
        d.run(&mut out, &mut event_rx, &link).await.unwrap();

        assert!(out.is_empty());
        assert_eq!(read_out(tmp.path(), ""), vec!["-!- ERROR: Closing Link"]);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_queued_user_lines_are_discarded_on_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let mut d = Dispatcher::new(
            "me".into(),
            settings(),
            TopicDirs::new(tmp.path()),
            shutdown.clone(),
        );
        let user_tx = d.user_sender();
        for i in 0..20 {
            user_tx
                .send(UserLine {
                    topic: "".into(),
                    text: format!("RAW{}", i),
                })
                .unwrap();
        }
        let (_event_tx, mut event_rx) = mpsc::unbounded_channel();
        let link = shutdown.child_token();
        shutdown.cancel();

        let mut out = Vec::new();
        d.run(&mut out, &mut event_rx, &link).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "QUIT :bye\r\n");
    }

    #[tokio::test]
    async fn test_open_session_failure_leaves_topic_inactive() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("#blocked"), "").unwrap();
        let mut d = Dispatcher::new(
            "me".into(),
            settings(),
            TopicDirs::new(tmp.path()),
            CancellationToken::new(),
        );

        assert!(!d.open_session("#blocked").await);
        assert!(!d.registry().is_active("#blocked"));
        assert!(d.open_session("#fine").await);
        assert!(d.registry().is_active("#fine"));
        assert!(tmp.path().join("#fine").join("in").exists());
    }
}
