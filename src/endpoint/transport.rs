//! Stream transport primitives: TCP and TLS over TCP.

use std::{
    fs,
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    path::Path,
    time::Duration,
};

use native_tls::{Certificate, Identity, TlsConnector, TlsStream};

use crate::config::{ConfigError, TlsConfig};

/// Everything a session thread needs to open a connection.
#[derive(Clone, Debug)]
pub struct ConnectSpec {
    pub port: u16,
    pub connect_timeout: Option<Duration>,
    pub tls: Option<TlsOptions>,
}

/// TLS handshake parameters.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Name checked against the server certificate.
    pub domain: String,
    pub connector: TlsConnector,
}

impl TlsOptions {
    /// Load certificates and build the connector.
    ///
    /// The client identity is a PEM certificate chain plus a PKCS#8 PEM
    /// key. A configured server certificate replaces the system roots.
    pub fn from_config(domain: &str, config: &TlsConfig) -> Result<Self, ConfigError> {
        let mut builder = TlsConnector::builder();
        if let (Some(chain), Some(key)) = (&config.client_cert_chain, &config.client_private_key)
        {
            let chain = read_pem("client certificate chain", chain)?;
            let key = read_pem("client private key", key)?;
            builder.identity(Identity::from_pkcs8(&chain, &key)?);
        }
        if let Some(server_cert) = &config.server_cert {
            let pem = read_pem("server certificate", server_cert)?;
            builder.add_root_certificate(Certificate::from_pem(&pem)?);
            builder.disable_built_in_roots(true);
        }
        Ok(Self {
            domain: domain.to_string(),
            connector: builder.build()?,
        })
    }
}

fn read_pem(kind: &'static str, path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::Certificate {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

/// Active socket connection state.
pub enum ActiveConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ActiveConnection {
    /// Write a full buffer to the socket.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.write_all(buf),
            ActiveConnection::Tls(stream) => stream.write_all(buf),
        }
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.flush(),
            ActiveConnection::Tls(stream) => stream.flush(),
        }
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            ActiveConnection::PlainTcp(stream) => stream,
            ActiveConnection::Tls(stream) => stream.get_ref(),
        }
    }

    /// Check without blocking whether the peer has closed the connection.
    ///
    /// A plain TCP collector never sends anything, so pending bytes are
    /// read and discarded until end of stream or `WouldBlock`. A TLS socket
    /// carries records the TLS layer has not consumed (session tickets,
    /// `close_notify`), so it always reports `false`; a closed TLS peer
    /// surfaces as a write error instead.
    pub fn peer_closed(&self) -> io::Result<bool> {
        let ActiveConnection::PlainTcp(stream) = self else {
            return Ok(false);
        };
        stream.set_nonblocking(true)?;
        let result = drain_until_closed(stream);
        stream.set_nonblocking(false)?;
        result
    }
}

fn drain_until_closed(mut stream: &TcpStream) -> io::Result<bool> {
    let mut buf = [0u8; 512];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(true),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
}

impl std::fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ActiveConnection::PlainTcp(_) => "PlainTcp",
            ActiveConnection::Tls(_) => "Tls",
        };
        f.debug_struct("ActiveConnection")
            .field("kind", &kind)
            .field("peer", &self.tcp().peer_addr().ok())
            .finish()
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    let mut last_err = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {host}:{port}"),
        )
    }))
}

/// Connect to `host` and, when configured, complete the TLS handshake.
/// The connection is only returned once it is usable for writes.
pub fn connect_transport(host: &str, spec: &ConnectSpec) -> io::Result<ActiveConnection> {
    let stream = connect_tcp(host, spec.port, spec.connect_timeout)?;
    let Some(tls) = &spec.tls else {
        return Ok(ActiveConnection::PlainTcp(stream));
    };
    let stream = tls
        .connector
        .connect(&tls.domain, stream)
        .map_err(io::Error::other)?;
    Ok(ActiveConnection::Tls(Box::new(stream)))
}
