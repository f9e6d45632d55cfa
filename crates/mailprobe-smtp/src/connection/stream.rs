//! Low-level SMTP stream handling.

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::{Error, Result};
use crate::parser;
use crate::types::Reply;

/// SMTP stream (plaintext or TLS) over any transport.
#[derive(Debug)]
pub enum SmtpStream<S> {
    /// Plaintext connection.
    Plain(BufReader<S>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<TlsStream<S>>>),
}

impl<S> SmtpStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a plaintext transport.
    pub fn plain(stream: S) -> Self {
        Self::Plain(BufReader::new(stream))
    }

    /// Performs a TLS handshake immediately (implicit TLS).
    ///
    /// # Errors
    ///
    /// Returns a TLS error if the handshake fails.
    pub async fn implicit_tls(
        stream: S,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> Result<Self> {
        let tls = handshake(stream, connector, server_name).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls))))
    }

    /// Reads one complete reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the reply is malformed.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        match self {
            Self::Plain(reader) => parser::read_reply(reader).await,
            Self::Tls(reader) => parser::read_reply(&mut **reader).await,
        }
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Upgrades a plaintext stream to TLS after a successful STARTTLS reply.
    ///
    /// Refuses if the server already sent bytes past the STARTTLS reply:
    /// those bytes were not protected by TLS and must not be treated as
    /// part of the encrypted session.
    ///
    /// # Errors
    ///
    /// Returns a TLS error if the stream is already encrypted, if plaintext
    /// data is pending, or if the handshake fails.
    pub async fn upgrade_to_tls(
        self,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> Result<Self> {
        let reader = match self {
            Self::Plain(reader) => reader,
            Self::Tls(_) => return Err(Error::Tls("connection is already using TLS".into())),
        };

        let pending = reader.buffer().len();
        if pending > 0 {
            return Err(Error::Tls(format!(
                "server sent {pending} bytes after the STARTTLS reply; refusing to upgrade"
            )));
        }

        let tls = handshake(reader.into_inner(), connector, server_name).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls))))
    }

    /// Returns true if the stream is encrypted.
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// The rustls connection state, once encrypted.
    pub fn tls_connection(&self) -> Option<&rustls::ClientConnection> {
        match self {
            Self::Plain(_) => None,
            Self::Tls(reader) => Some(reader.get_ref().get_ref().1),
        }
    }

    /// Shuts down the write side of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Plain(reader) => reader.get_mut().shutdown().await?,
            Self::Tls(reader) => reader.get_mut().shutdown().await?,
        }
        Ok(())
    }
}

async fn handshake<S>(
    stream: S,
    connector: &TlsConnector,
    server_name: ServerName<'static>,
) -> Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = server_name.to_str().into_owned();
    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Tls(format!("TLS handshake with {name} failed: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::tls::TlsSettings;
    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test]
    async fn plain_round_trip() {
        let (client, mut server) = duplex(1024);
        let mut stream = SmtpStream::plain(client);

        server.write_all(b"220 ready\r\n").await.unwrap();
        let reply = stream.read_reply().await.unwrap();
        assert_eq!(reply.code.as_u16(), 220);

        stream.write_all(b"NOOP\r\n").await.unwrap();
        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"NOOP\r\n");
        assert!(!stream.is_tls());
        assert!(stream.tls_connection().is_none());
    }

    #[tokio::test]
    async fn multiline_reply_across_reads() {
        use tokio_test::io::Builder;

        let mock = Builder::new()
            .read(b"250-mx.example.com Hello\r\n250-SIZE 1000\r\n")
            .read(b"250 8BITMIME\r\n")
            .write(b"QUIT\r\n")
            .build();
        let mut stream = SmtpStream::plain(mock);

        let reply = stream.read_reply().await.unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(
            reply.lines,
            vec!["mx.example.com Hello", "SIZE 1000", "8BITMIME"]
        );
        stream.write_all(b"QUIT\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn upgrade_refuses_pipelined_plaintext() {
        let (client, mut server) = duplex(1024);
        let mut stream = SmtpStream::plain(client);

        server
            .write_all(b"220 go ahead\r\n250 injected\r\n")
            .await
            .unwrap();
        let reply = stream.read_reply().await.unwrap();
        assert_eq!(reply.code.as_u16(), 220);

        let settings = TlsSettings::default();
        let err = stream
            .upgrade_to_tls(
                &settings.connector_with_check().unwrap().0,
                settings.server_name("mx.example.com").unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tls(ref msg) if msg.contains("refusing to upgrade")));
    }

    #[tokio::test]
    async fn handshake_failure_is_tls_error() {
        let (client, mut server) = duplex(1024);
        let stream = SmtpStream::plain(client);

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let _ = server.read(&mut buf).await;
            let _ = server.write_all(b"this is not a TLS record\r\n").await;
        });

        let settings = TlsSettings::default();
        let err = stream
            .upgrade_to_tls(
                &settings.connector_with_check().unwrap().0,
                settings.server_name("mx.example.com").unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
    }
}
