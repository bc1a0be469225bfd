//! Connection supervisor.
//!
//! Owns the dispatcher across connections. Each connection gets its own
//! link token and reader task; the registry and every `in` listener survive
//! a reconnect, and the welcome reply re-joins the active channels.

use crate::app::dispatch::{DispatchSettings, Dispatcher};
use crate::config::AppConfig;
use crate::irc::connection::{connect, login, spawn_reader};
use crate::session::layout::TopicDirs;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct Client {
    config: AppConfig,
    shutdown: CancellationToken,
    dispatcher: Dispatcher,
}

impl Client {
    pub fn new(config: AppConfig, shutdown: CancellationToken) -> Self {
        let server = &config.server;
        let dirs = TopicDirs::new(config.filesystem.server_root(&server.host));
        let settings = DispatchSettings {
            server: server.host.clone(),
            keepalive: Duration::from_secs(config.behavior.keepalive_secs.max(1)),
            quit_message: config.behavior.quit_message.clone(),
        };
        let dispatcher = Dispatcher::new(server.nickname.clone(), settings, dirs, shutdown.clone());
        Self {
            config,
            shutdown,
            dispatcher,
        }
    }

    /// Run until shutdown is requested or, without reconnection, until the
    /// connection is lost.
    pub async fn run(mut self) -> Result<()> {
        if !self.dispatcher.open_session("").await {
            bail!("Cannot create the server session directory");
        }
        for channel in &self.config.server.channels {
            self.dispatcher.open_session(&channel.to_lowercase()).await;
        }
        let password = self.config.server.password()?;

        loop {
            let result = self.run_connection(password.as_deref()).await;
            if self.shutdown.is_cancelled() {
                info!("Shut down");
                return Ok(());
            }
            let err = match result {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if !self.config.behavior.reconnect {
                return Err(err);
            }

            error!("{:#}", err);
            let delay = Duration::from_secs(self.config.behavior.reconnect_delay_secs);
            info!("Reconnecting in {}s", delay.as_secs());
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_connection(&mut self, password: Option<&str>) -> Result<()> {
        let server = &self.config.server;
        let stream = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(()),
            stream = connect(&server.host, server.port(), server.tls, server.accept_invalid_certs) => stream?,
        };
        let (reader, mut writer) = tokio::io::split(stream);

        let link = self.shutdown.child_token();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let reader_task = spawn_reader(reader, event_tx, link.clone());

        let mut session = login(
            &mut writer,
            &server.host,
            self.dispatcher.nick(),
            server.realname(),
            password,
        )
        .await;
        if session.is_ok() {
            session = self
                .dispatcher
                .run(&mut writer, &mut event_rx, &link)
                .await;
        }

        link.cancel();
        let _ = writer.shutdown().await;
        let read_result = reader_task
            .await
            .context("Connection reader panicked")?;

        session.context("Write to server failed")?;
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        read_result.context("Lost connection to server")?;
        bail!("Connection ended")
    }
}
