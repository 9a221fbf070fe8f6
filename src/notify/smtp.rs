//! Mail submission over implicit-TLS SMTP.
//!
//! ## Reply grammar
//!
//! ```text
//! reply         = *continuation terminal
//! continuation  = 3DIGIT "-" text CRLF
//! terminal      = 3DIGIT [ SP text ] CRLF
//! ```
//!
//! Lines that fit neither form are kept as text of the reply being read.
//! A line longer than [`MAX_REPLY_LINE`] bytes is a protocol error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Local;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::NotifyError;
use crate::models::MailSettings;
use crate::notify::{Delivery, Message, Notifier};

type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Longest accepted reply line, terminator included.
pub const MAX_REPLY_LINE: u64 = 515;

/// Session bound used unless the caller sets one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A complete server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is(&self, codes: &[u16]) -> bool {
        codes.contains(&self.code)
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lines.join(" | "))
    }
}

/// Classify a single reply line. Returns the code and whether it ends the
/// reply, or `None` for lines without a leading code.
pub fn parse_reply_line(line: &str) -> Option<(u16, bool)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = line[..3].parse().ok()?;
    match bytes.get(3) {
        None | Some(b' ') => Some((code, true)),
        Some(b'-') => Some((code, false)),
        Some(_) => None,
    }
}

/// Encode a header value as RFC 2047 when it is not plain ASCII.
pub fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", BASE64.encode(value))
    }
}

/// Base64 body wrapped at 76 columns, CRLF separated.
fn encode_body(body: &str) -> String {
    let encoded = BASE64.encode(body);
    encoded
        .as_bytes()
        .chunks(76)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// One SMTP conversation over an already-established stream.
pub struct SmtpSession<S> {
    stream: BufStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Read lines until a terminal reply line.
    pub async fn read_reply(&mut self) -> NotifyResult<Reply> {
        let mut lines = Vec::new();
        loop {
            let mut raw = Vec::new();
            let read = (&mut self.stream)
                .take(MAX_REPLY_LINE)
                .read_until(b'\n', &mut raw)
                .await?;
            if read == 0 {
                return Err(NotifyError::protocol(format!(
                    "connection closed mid-reply after {:?}",
                    lines
                )));
            }
            if !raw.ends_with(b"\n") && read as u64 >= MAX_REPLY_LINE {
                return Err(NotifyError::protocol(format!(
                    "reply line longer than {MAX_REPLY_LINE} bytes"
                )));
            }
            let line = String::from_utf8_lossy(&raw)
                .trim_end_matches(['\r', '\n'])
                .to_string();
            let parsed = parse_reply_line(&line);
            lines.push(line);
            if let Some((code, true)) = parsed {
                return Ok(Reply { code, lines });
            }
        }
    }

    async fn send_line(&mut self, line: &str) -> NotifyResult<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn command(&mut self, line: &str) -> NotifyResult<Reply> {
        self.send_line(line).await?;
        self.read_reply().await
    }

    async fn expect(&mut self, line: &str, stage: &'static str, codes: &[u16]) -> NotifyResult<Reply> {
        let reply = self.command(line).await?;
        if !reply.is(codes) {
            return Err(NotifyError::Rejected {
                stage,
                reply: reply.to_string(),
            });
        }
        Ok(reply)
    }

    /// Run the whole dialogue: greet, authenticate, send, quit.
    pub async fn deliver(
        mut self,
        settings: &MailSettings,
        sender_name: &str,
        message: &Message,
    ) -> NotifyResult<Delivery> {
        let greeting = self.read_reply().await?;
        if !greeting.is(&[220]) {
            return Err(NotifyError::Rejected {
                stage: "Greeting",
                reply: greeting.to_string(),
            });
        }

        self.expect(&format!("EHLO {}", settings.hostname), "EHLO", &[250])
            .await?;

        self.expect("AUTH LOGIN", "AUTH LOGIN", &[334]).await?;
        self.expect(&BASE64.encode(&settings.username), "AUTH username", &[334])
            .await?;
        let auth = self.command(&BASE64.encode(&settings.password)).await?;
        if !auth.is(&[235]) {
            return Err(NotifyError::AuthFailed(auth.to_string()));
        }

        self.expect(
            &format!("MAIL FROM:<{}>", settings.username),
            "MAIL FROM",
            &[250],
        )
        .await?;

        let mut delivery = Delivery::default();
        for recipient in &settings.recipients {
            let reply = self.command(&format!("RCPT TO:<{recipient}>")).await?;
            if reply.is(&[250, 251]) {
                log::info!("Recipient accepted: {}", recipient);
                delivery.accepted.push(recipient.clone());
            } else {
                log::warn!("Recipient rejected: {} - {}", recipient, reply);
                delivery.rejected.push((recipient.clone(), reply.to_string()));
            }
        }
        if delivery.accepted.is_empty() {
            let _ = self.command("QUIT").await;
            return Err(NotifyError::NoRecipientsAccepted);
        }

        self.expect("DATA", "DATA", &[354]).await?;

        let content = format!(
            "From: {name} <{from}>\r\n\
             To: {to}\r\n\
             Subject: {subject}\r\n\
             Date: {date}\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             {body}\r\n\
             .",
            name = encode_header(sender_name),
            from = settings.username,
            to = settings.recipients.join(", "),
            subject = encode_header(&message.subject),
            date = Local::now().to_rfc2822(),
            body = encode_body(&message.html_body),
        );
        let reply = self.command(&content).await?;
        if !reply.is(&[250]) {
            return Err(NotifyError::Rejected {
                stage: "Message body",
                reply: reply.to_string(),
            });
        }

        // Some servers drop the connection without a 221.
        let _ = self.command("QUIT").await;
        Ok(delivery)
    }
}

/// Notifier delivering through an SMTP server with implicit TLS.
pub struct SmtpNotifier {
    settings: MailSettings,
    sender_name: String,
    timeout: Duration,
}

impl SmtpNotifier {
    pub fn new(settings: MailSettings, sender_name: impl Into<String>) -> Self {
        Self {
            settings,
            sender_name: sender_name.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect(&self) -> NotifyResult<TlsStream<TcpStream>> {
        let tcp = TcpStream::connect((self.settings.hostname.as_str(), self.settings.port))
            .await
            .map_err(NotifyError::Connect)?;

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| NotifyError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let server_name = rustls::pki_types::ServerName::try_from(self.settings.hostname.clone())
            .map_err(|e| NotifyError::Tls(e.to_string()))?;

        TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
            .map_err(|e| NotifyError::Tls(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, message: &Message) -> NotifyResult<Delivery> {
        let session = async {
            let stream = self.connect().await?;
            SmtpSession::new(stream)
                .deliver(&self.settings, &self.sender_name, message)
                .await
        };
        tokio::time::timeout(self.timeout, session)
            .await
            .map_err(|_| NotifyError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn settings(recipients: &[&str]) -> MailSettings {
        MailSettings {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            hostname: "smtp.example.com".into(),
            port: 465,
            username: "bot@example.com".into(),
            password: "secret".into(),
        }
    }

    fn message() -> Message {
        Message {
            subject: "✓ Product Date Check - No Changes - 2025-10-02".into(),
            html_body: "<html>\n.hidden\n</html>".into(),
        }
    }

    /// Minimal server: rejects recipients starting with "bad", refuses the
    /// password "wrong". Returns every line it received.
    async fn fake_server(stream: DuplexStream) -> Vec<String> {
        let mut stream = BufReader::new(stream);
        let mut received = Vec::new();
        let mut auth_step = 0;
        let mut in_data = false;

        stream.write_all(b"220 smtp.example.com ESMTP\r\n").await.unwrap();
        loop {
            let mut line = String::new();
            if stream.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            received.push(line.clone());

            let reply: &[u8] = if in_data {
                if line != "." {
                    continue;
                }
                in_data = false;
                b"250 2.0.0 queued\r\n"
            } else if auth_step == 1 {
                auth_step = 2;
                b"334 UGFzc3dvcmQ6\r\n"
            } else if auth_step == 2 {
                auth_step = 0;
                if line == BASE64.encode("wrong") {
                    b"535 5.7.8 bad credentials\r\n"
                } else {
                    b"235 2.7.0 accepted\r\n"
                }
            } else if line.starts_with("EHLO") {
                b"250-smtp.example.com\r\n250-AUTH LOGIN PLAIN\r\n250 SIZE 1000000\r\n"
            } else if line == "AUTH LOGIN" {
                auth_step = 1;
                b"334 VXNlcm5hbWU6\r\n"
            } else if line.starts_with("MAIL FROM") {
                b"250 OK\r\n"
            } else if line.starts_with("RCPT TO:<bad") {
                b"550 5.1.1 no such user\r\n"
            } else if line.starts_with("RCPT TO") {
                b"250 OK\r\n"
            } else if line == "DATA" {
                in_data = true;
                b"354 go ahead\r\n"
            } else if line == "QUIT" {
                stream.write_all(b"221 bye\r\n").await.unwrap();
                break;
            } else {
                b"500 unknown\r\n"
            };
            stream.write_all(reply).await.unwrap();
        }
        received
    }

    #[test]
    fn test_parse_reply_line() {
        assert_eq!(parse_reply_line("250 OK"), Some((250, true)));
        assert_eq!(parse_reply_line("250-PIPELINING"), Some((250, false)));
        assert_eq!(parse_reply_line("250"), Some((250, true)));
        assert_eq!(parse_reply_line("hello"), None);
        assert_eq!(parse_reply_line("25 x"), None);
    }

    #[tokio::test]
    async fn test_multiline_reply() {
        let (client, mut server) = tokio::io::duplex(1024);
        server
            .write_all(b"250-first\r\nnoise\r\n250-second\r\n250 last\r\n")
            .await
            .unwrap();

        let mut session = SmtpSession::new(client);
        let reply = session.read_reply().await.unwrap();

        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines.len(), 4);
        assert_eq!(reply.lines[3], "250 last");
    }

    #[tokio::test]
    async fn test_reply_cut_off_is_protocol_error() {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(b"250-first\r\n").await.unwrap();
        drop(server);

        let mut session = SmtpSession::new(client);
        assert!(matches!(
            session.read_reply().await,
            Err(NotifyError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_overlong_reply_line_is_protocol_error() {
        let (client, mut server) = tokio::io::duplex(4096);
        let long = format!("250 {}\r\n", "x".repeat(600));
        server.write_all(long.as_bytes()).await.unwrap();

        let mut session = SmtpSession::new(client);
        let err = session.read_reply().await.unwrap_err();
        assert!(matches!(err, NotifyError::Protocol(ref m) if m.contains("515")));
    }

    #[tokio::test]
    async fn test_reply_line_at_limit_is_accepted() {
        let (client, mut server) = tokio::io::duplex(4096);
        let line = format!("250 {}\r\n", "x".repeat(MAX_REPLY_LINE as usize - 6));
        assert_eq!(line.len() as u64, MAX_REPLY_LINE);
        server.write_all(line.as_bytes()).await.unwrap();

        let mut session = SmtpSession::new(client);
        assert_eq!(session.read_reply().await.unwrap().code, 250);
    }

    #[tokio::test]
    async fn test_silent_server_hits_session_timeout() {
        // Accepts the TCP connection but never answers the TLS handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut creds = settings(&["ops@example.com"]);
        creds.hostname = "127.0.0.1".into();
        creds.port = port;

        let notifier = SmtpNotifier::new(creds, "Checker").with_timeout(Duration::from_millis(200));
        let err = notifier.send(&message()).await.unwrap_err();
        drop(listener);

        assert!(matches!(err, NotifyError::Timeout));
    }

    #[tokio::test]
    async fn test_full_dialogue_with_partial_recipients() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(fake_server(server));

        let delivery = SmtpSession::new(client)
            .deliver(
                &settings(&["ops@example.com", "bad@example.com"]),
                "Product Date Checker",
                &message(),
            )
            .await
            .unwrap();
        let received = server.await.unwrap();

        assert_eq!(delivery.accepted, vec!["ops@example.com"]);
        assert_eq!(delivery.rejected.len(), 1);
        assert_eq!(received[0], "EHLO smtp.example.com");
        assert_eq!(received[1], "AUTH LOGIN");
        assert_eq!(received[2], BASE64.encode("bot@example.com"));
        assert_eq!(received[3], BASE64.encode("secret"));
        assert_eq!(received[4], "MAIL FROM:<bot@example.com>");
        assert!(received.contains(&"RCPT TO:<bad@example.com>".to_string()));
        assert!(received.contains(&"To: ops@example.com, bad@example.com".to_string()));
        assert!(received.contains(&"Content-Type: text/html; charset=UTF-8".to_string()));
        assert!(received.iter().any(|l| l.starts_with("Subject: =?UTF-8?B?")));
        assert_eq!(received.iter().filter(|l| *l == ".").count(), 1);
        assert_eq!(received.last().unwrap(), "QUIT");
    }

    #[tokio::test]
    async fn test_no_recipients_accepted() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(fake_server(server));

        let err = SmtpSession::new(client)
            .deliver(&settings(&["bad@example.com"]), "Checker", &message())
            .await
            .unwrap_err();
        let received = server.await.unwrap();

        assert!(matches!(err, NotifyError::NoRecipientsAccepted));
        assert!(!received.contains(&"DATA".to_string()));
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(fake_server(server));

        let mut creds = settings(&["ops@example.com"]);
        creds.password = "wrong".into();
        let err = SmtpSession::new(client)
            .deliver(&creds, "Checker", &message())
            .await
            .unwrap_err();
        drop(server);

        assert!(matches!(err, NotifyError::AuthFailed(_)));
    }

    #[test]
    fn test_encode_header() {
        assert_eq!(encode_header("Plain subject"), "Plain subject");
        assert!(encode_header("✓ done").starts_with("=?UTF-8?B?"));
    }

    #[test]
    fn test_encode_body_wraps_lines() {
        let body = "x".repeat(200);
        let encoded = encode_body(&body);
        assert!(encoded.split("\r\n").all(|line| line.len() <= 76));
        let joined: String = encoded.split("\r\n").collect();
        assert_eq!(BASE64.decode(joined).unwrap(), body.as_bytes());
    }
}
