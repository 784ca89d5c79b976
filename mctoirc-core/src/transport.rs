//! TCP (and optionally TLS) connection to the IRC server.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

pub type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established connection that has not started IRC registration yet.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Transport {
    /// Split into a buffered line reader and a writer.
    pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
        match self {
            Transport::Plain(tcp) => {
                let (r, w) = tcp.into_split();
                (BufReader::new(Box::new(r)), Box::new(w))
            }
            Transport::Tls(tls) => {
                let (r, w) = tokio::io::split(*tls);
                (BufReader::new(Box::new(r)), Box::new(w))
            }
        }
    }
}

/// Open a connection to the configured server.
pub async fn connect(config: &BridgeConfig) -> Result<Transport> {
    let addr = config.server_addr();
    let mode = if config.use_tls() { "TLS" } else { "plain" };

    tracing::debug!(%addr, "connecting");
    let tcp = TcpStream::connect((config.irc.server.as_str(), config.irc.port))
        .await
        .map_err(|source| BridgeError::Connect {
            addr: addr.clone(),
            source,
        })?;
    let _ = tcp.set_nodelay(true);
    tracing::debug!(%addr, mode, "TCP connected");

    if !config.use_tls() {
        return Ok(Transport::Plain(tcp));
    }

    let connector = TlsConnector::from(Arc::new(rustls_default_config()));
    let dns_name = rustls::pki_types::ServerName::try_from(config.irc.server.clone())
        .map_err(|e| BridgeError::Tls(format!("invalid server name {}: {e}", config.irc.server)))?;
    let tls = connector
        .connect(dns_name, tcp)
        .await
        .map_err(|e| BridgeError::Tls(format!("handshake with {addr} failed: {e}")))?;
    tracing::debug!(%addr, "TLS handshake complete");
    Ok(Transport::Tls(Box::new(tls)))
}

fn rustls_default_config() -> rustls::ClientConfig {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
