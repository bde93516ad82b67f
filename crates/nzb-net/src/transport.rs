//! A single NNTP connection: TCP/TLS framing plus the handful of commands the
//! core needs (`AUTHINFO`, `STAT`, `HEAD`, `BODY`) (spec §6, "Wire protocol
//! into Usenet").

use std::sync::Arc;

use nzb_types::{ArticleId, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::TransportError;

enum Stream {
    Plain(BufReader<TcpStream>),
    Tls(BufReader<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// One live NNTP connection to a specific server (spec §3 "connection" as
/// used by the pool, C3).
pub struct Connection {
    server_name: String,
    stream: Stream,
}

impl Connection {
    pub async fn connect(
        config: &ServerConfig,
        tls_connector: Option<Arc<tokio_rustls::TlsConnector>>,
    ) -> Result<Self, TransportError> {
        let addr = (config.host.as_str(), config.port);
        let tcp = TcpStream::connect(addr).await.map_err(|e| TransportError::Io {
            server: config.name.clone(),
            source: e,
        })?;
        let _ = tcp.set_nodelay(true);

        let mut conn = if config.use_ssl {
            let connector = tls_connector.expect("TLS connector required when use_ssl is set");
            let server_name = rustls::pki_types::ServerName::try_from(config.host.clone())
                .map_err(|_| TransportError::Protocol {
                    server: config.name.clone(),
                    reply: format!("invalid TLS server name {}", config.host),
                })?;
            let tls = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| TransportError::Io {
                    server: config.name.clone(),
                    source: e,
                })?;
            Self {
                server_name: config.name.clone(),
                stream: Stream::Tls(BufReader::new(tls)),
            }
        } else {
            Self {
                server_name: config.name.clone(),
                stream: Stream::Plain(BufReader::new(tcp)),
            }
        };

        let greeting = conn.read_line().await?;
        if !(greeting.starts_with("200") || greeting.starts_with("201")) {
            return Err(TransportError::Protocol {
                server: conn.server_name.clone(),
                reply: greeting,
            });
        }

        if let Some(user) = &config.user {
            conn.authenticate(user, config.pass.as_deref().unwrap_or("")).await?;
        }

        Ok(conn)
    }

    async fn authenticate(&mut self, user: &str, pass: &str) -> Result<(), TransportError> {
        let reply = self
            .command(&format!("AUTHINFO USER {user}"))
            .await?;
        if reply.starts_with("281") {
            return Ok(());
        }
        if !reply.starts_with("381") {
            return Err(TransportError::AuthFailed {
                server: self.server_name.clone(),
                reply,
            });
        }
        let reply = self.command(&format!("AUTHINFO PASS {pass}")).await?;
        if reply.starts_with("281") {
            Ok(())
        } else {
            Err(TransportError::AuthFailed {
                server: self.server_name.clone(),
                reply,
            })
        }
    }

    /// `STAT <article-id>`. Returns `Ok(true)` if present, `Ok(false)` if the
    /// server reports it missing; any other failure is a [`TransportError`].
    pub async fn stat(&mut self, id: &ArticleId) -> Result<bool, TransportError> {
        let reply = self.command(&format!("STAT <{}>", id.as_str())).await?;
        match reply.get(..3) {
            Some("223") => Ok(true),
            Some("430") | Some("423") => Ok(false),
            _ => Err(TransportError::Protocol {
                server: self.server_name.clone(),
                reply,
            }),
        }
    }

    /// `HEAD <article-id>`, returning the raw header lines. Used by the
    /// repair scheduler to recover a file's release date from the article's
    /// `Date:` header when none is on record yet (spec §4.12).
    pub async fn head(&mut self, id: &ArticleId) -> Result<Vec<u8>, TransportError> {
        let reply = self.command(&format!("HEAD <{}>", id.as_str())).await?;
        match reply.get(..3) {
            Some("221") => self.read_multiline().await,
            Some("430") | Some("423") => Err(TransportError::ArticleMissing(id.clone())),
            _ => Err(TransportError::Protocol {
                server: self.server_name.clone(),
                reply,
            }),
        }
    }

    /// `BODY <article-id>`, returning the raw (dot-unstuffed) article body.
    pub async fn body(&mut self, id: &ArticleId) -> Result<Vec<u8>, TransportError> {
        let reply = self.command(&format!("BODY <{}>", id.as_str())).await?;
        match reply.get(..3) {
            Some("222") => self.read_multiline().await,
            Some("430") | Some("423") => Err(TransportError::ArticleMissing(id.clone())),
            _ => Err(TransportError::Protocol {
                server: self.server_name.clone(),
                reply,
            }),
        }
    }

    async fn command(&mut self, cmd: &str) -> Result<String, TransportError> {
        self.write_line(cmd).await?;
        self.read_line().await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let io_err = |e: std::io::Error| TransportError::Io {
            server: self.server_name.clone(),
            source: e,
        };
        match &mut self.stream {
            Stream::Plain(s) => {
                s.write_all(line.as_bytes()).await.map_err(io_err)?;
                s.write_all(b"\r\n").await.map_err(io_err)?;
                s.flush().await.map_err(io_err)
            }
            Stream::Tls(s) => {
                s.write_all(line.as_bytes()).await.map_err(io_err)?;
                s.write_all(b"\r\n").await.map_err(io_err)?;
                s.flush().await.map_err(io_err)
            }
        }
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = String::new();
        let io_err = |e: std::io::Error| TransportError::Io {
            server: self.server_name.clone(),
            source: e,
        };
        let n = match &mut self.stream {
            Stream::Plain(s) => s.read_line(&mut buf).await.map_err(io_err)?,
            Stream::Tls(s) => s.read_line(&mut buf).await.map_err(io_err)?,
        };
        if n == 0 {
            return Err(TransportError::Io {
                server: self.server_name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed"),
            });
        }
        Ok(buf.trim_end().to_string())
    }

    /// Reads a dot-terminated multiline block, undoing NNTP dot-stuffing
    /// (RFC 3977 §3.1.1): a line of exactly `.` ends the block; a line
    /// starting with `..` represents a literal leading `.`.
    async fn read_multiline(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut out = Vec::new();
        loop {
            let mut raw = Vec::new();
            let io_err = |e: std::io::Error| TransportError::Io {
                server: self.server_name.clone(),
                source: e,
            };
            let n = match &mut self.stream {
                Stream::Plain(s) => s.read_until(b'\n', &mut raw).await.map_err(io_err)?,
                Stream::Tls(s) => s.read_until(b'\n', &mut raw).await.map_err(io_err)?,
            };
            if n == 0 {
                return Err(TransportError::Io {
                    server: self.server_name.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed mid-multiline",
                    ),
                });
            }
            while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
                raw.pop();
            }
            if raw == b"." {
                break;
            }
            if raw.starts_with(b".") {
                out.extend_from_slice(&raw[1..]);
            } else {
                out.extend_from_slice(&raw);
            }
            out.extend_from_slice(b"\r\n");
        }
        Ok(out)
    }
}
