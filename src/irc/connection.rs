use crate::app::action::Action;
use crate::error::{ClientError, ClientResult};
use crate::irc::message::ParsedEvent;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Byte stream to the server, plain or TLS.
pub trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

/// Open the TCP (and optionally TLS) stream to `host:port`.
pub async fn connect(
    host: &str,
    port: u16,
    tls: bool,
    accept_invalid_certs: bool,
) -> Result<Box<dyn IrcStream>> {
    let tcp = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("TCP connect to {}:{} failed", host, port))?;
    if let Err(e) = tcp.set_nodelay(true) {
        debug!("set_nodelay failed: {}", e);
    }
    info!("Connected to {}:{} ({})", host, port, if tls { "TLS" } else { "plain" });

    if !tls {
        return Ok(Box::new(tcp));
    }

    let config = if accept_invalid_certs {
        warn!("TLS certificate verification disabled");
        insecure_tls_config()
    } else {
        default_tls_config()
    };
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .with_context(|| format!("Invalid TLS server name {}", host))?;
    let stream = connector
        .connect(server_name, tcp)
        .await
        .with_context(|| format!("TLS handshake with {} failed", host))?;
    Ok(Box::new(stream))
}

/// Write one protocol line, CRLF-terminated.
pub async fn send<W>(writer: &mut W, action: &Action) -> ClientResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let line = format!("{}\r\n", action);
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Register with the server: optional `PASS`, then `NICK` and `USER`.
pub async fn login<W>(
    writer: &mut W,
    host: &str,
    nick: &str,
    realname: &str,
    password: Option<&str>,
) -> ClientResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if let Some(password) = password {
        send(
            writer,
            &Action::Pass {
                password: password.to_string(),
            },
        )
        .await?;
    }
    send(
        writer,
        &Action::ChangeNick {
            nick: nick.to_string(),
        },
    )
    .await?;
    send(
        writer,
        &Action::User {
            username: nick.to_string(),
            host: host.to_string(),
            realname: realname.to_string(),
        },
    )
    .await
}

/// Spawn the connection reader.
///
/// Every parsed line is forwarded to `event_tx`; unparsable lines are logged
/// and dropped. The task cancels `link` and returns the reason when the
/// server sends `ERROR`, closes the stream, or a read fails. It returns
/// `Ok(())` if `link` was cancelled by someone else.
pub fn spawn_reader<R>(
    reader: R,
    event_tx: mpsc::UnboundedSender<ParsedEvent>,
    link: CancellationToken,
) -> JoinHandle<ClientResult<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = read_events(reader, &event_tx, &link).await;
        if result.is_err() {
            link.cancel();
        }
        result
    })
}

async fn read_events<R>(
    reader: R,
    event_tx: &mpsc::UnboundedSender<ParsedEvent>,
    link: &CancellationToken,
) -> ClientResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let n = tokio::select! {
            _ = link.cancelled() => return Ok(()),
            n = reader.read_until(b'\n', &mut buf) => n?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }

        let line = String::from_utf8_lossy(&buf).into_owned();
        buf.clear();

        let event = match ParsedEvent::parse(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Discarding server line: {}", ClientError::from(e));
                continue;
            }
        };
        debug!("<< {}", event.raw);

        let fatal = (event.command == "ERROR").then(|| event.arg(0).to_string());
        if event_tx.send(event).is_err() {
            return Ok(());
        }
        if let Some(reason) = fatal {
            return Err(ClientError::Fatal(reason));
        }
    }
}

fn default_tls_config() -> rustls::ClientConfig {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn insecure_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
        .with_no_client_auth()
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
