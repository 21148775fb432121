//! Syslog ingestion over UDP
//!
//! Each datagram carries one RFC 5424 message. Messages are routed to a log
//! by APP-NAME and MSGID:
//!
//! | MSGID            | Log              |
//! |------------------|------------------|
//! | `out` or `err`   | `APP-NAME:MSGID` |
//! | equal to APP-NAME| `APP-NAME`       |
//!
//! Anything else, or a packet that does not parse, is logged and dropped.

use std::net::SocketAddr;
use std::str;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use logd_storage::codec;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::collector::Collector;
use crate::config::SyslogConfig;
use crate::error::CollectorResult;

const NIL: &[u8] = b"-";
const BOM: &[u8] = b"\xEF\xBB\xBF";

const MAX_HOSTNAME_LEN: usize = 255;
const MAX_APP_NAME_LEN: usize = 48;
const MAX_PROC_ID_LEN: usize = 128;
const MAX_MSG_ID_LEN: usize = 32;
const MAX_TIMESTAMP_LEN: usize = 64;

/// Errors from parsing or routing a syslog message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyslogError {
    /// The packet is not a well-formed RFC 5424 message
    #[error("malformed syslog message: {0}")]
    Malformed(String),

    /// A field needed for routing is nil
    #[error("expected {0}")]
    MissingField(&'static str),

    /// MSGID is neither a stream name nor the APP-NAME
    #[error("unexpected MSGID: {0:?}")]
    UnexpectedMsgId(String),

    /// TIMESTAMP parses but falls outside the storable range
    #[error("TIMESTAMP {0} out of range")]
    TimestampOutOfRange(String),
}

impl SyslogError {
    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// A parsed RFC 5424 message; nil fields are `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogMessage {
    pub facility: u8,
    pub severity: u8,
    pub version: u16,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub proc_id: Option<String>,
    pub msg_id: Option<String>,
    /// Raw structured data elements, brackets included
    pub structured_data: Option<String>,
    /// Message body with any leading BOM removed
    pub message: Option<Vec<u8>>,
}

impl SyslogMessage {
    /// A user-level informational message carrying one line of a stream
    pub fn stream_line(
        app_name: impl Into<String>,
        msg_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            facility: 1,
            severity: 6,
            version: 1,
            timestamp: Some(timestamp.fixed_offset()),
            hostname: None,
            app_name: Some(app_name.into()),
            proc_id: None,
            msg_id: Some(msg_id.into()),
            structured_data: None,
            message: Some(message.into()),
        }
    }

    /// Encode as an RFC 5424 packet
    pub fn encode(&self) -> Vec<u8> {
        fn field(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("-")
        }

        let priority = u16::from(self.facility) * 8 + u16::from(self.severity);
        let timestamp = self
            .timestamp
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_else(|| "-".to_string());
        let mut packet = format!(
            "<{}>{} {} {} {} {} {} {}",
            priority,
            self.version,
            timestamp,
            field(&self.hostname),
            field(&self.app_name),
            field(&self.proc_id),
            field(&self.msg_id),
            field(&self.structured_data),
        )
        .into_bytes();
        if let Some(message) = &self.message {
            packet.push(b' ');
            packet.extend_from_slice(message);
        }
        packet
    }
}

/// An event ready to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestEvent {
    pub log: String,
    pub timestamp: DateTime<Utc>,
    pub message: Vec<u8>,
}

struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8, context: &str) -> Result<(), SyslogError> {
        if self.peek() != Some(byte) {
            return Err(SyslogError::malformed(format!(
                "expected {:?} {} at offset {}",
                byte as char, context, self.pos
            )));
        }
        self.pos += 1;
        Ok(())
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !pred(b) {
                break;
            }
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn number(&mut self, name: &str, max_digits: usize) -> Result<u16, SyslogError> {
        let digits = self.take_while(|b| b.is_ascii_digit());
        if digits.is_empty() || digits.len() > max_digits {
            return Err(SyslogError::malformed(format!("invalid {}", name)));
        }
        digits
            .iter()
            .try_fold(0u16, |n, d| Some(n * 10 + u16::from(d - b'0')))
            .ok_or_else(|| SyslogError::malformed(format!("invalid {}", name)))
    }

    /// A header field: printable ASCII up to the next space, `-` for nil
    fn field(&mut self, name: &str, max_len: usize) -> Result<Option<&'a str>, SyslogError> {
        let token = self.take_while(|b| b != b' ');
        if token.is_empty() {
            return Err(SyslogError::malformed(format!("missing {}", name)));
        }
        if token == NIL {
            return Ok(None);
        }
        if token.len() > max_len {
            return Err(SyslogError::malformed(format!(
                "{} longer than {} bytes",
                name, max_len
            )));
        }
        if !token.iter().all(|b| (33..=126).contains(b)) {
            return Err(SyslogError::malformed(format!("{} is not printable ASCII", name)));
        }
        // Printable ASCII is valid UTF-8
        str::from_utf8(token)
            .map(Some)
            .map_err(|e| SyslogError::malformed(e.to_string()))
    }

    fn structured_data(&mut self) -> Result<Option<&'a str>, SyslogError> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                return Ok(None);
            }
            Some(b'[') => {}
            _ => return Err(SyslogError::malformed("expected STRUCTURED-DATA")),
        }

        let start = self.pos;
        while self.peek() == Some(b'[') {
            self.sd_element()?;
        }
        str::from_utf8(&self.input[start..self.pos])
            .map(Some)
            .map_err(|e| SyslogError::malformed(format!("STRUCTURED-DATA: {}", e)))
    }

    fn sd_element(&mut self) -> Result<(), SyslogError> {
        self.pos += 1;
        let mut in_value = false;
        loop {
            let Some(b) = self.peek() else {
                return Err(SyslogError::malformed("unterminated STRUCTURED-DATA"));
            };
            self.pos += 1;
            match b {
                b'\\' if in_value => self.pos += 1,
                b'"' => in_value = !in_value,
                b']' if !in_value => return Ok(()),
                _ => {}
            }
        }
    }
}

/// Parse one RFC 5424 packet
pub fn parse_rfc5424(packet: &[u8]) -> Result<SyslogMessage, SyslogError> {
    let mut s = Scanner {
        input: packet,
        pos: 0,
    };

    s.expect(b'<', "to open PRI")?;
    let priority = s.number("PRI", 3)?;
    if priority > 191 {
        return Err(SyslogError::malformed(format!("PRI {} out of range", priority)));
    }
    s.expect(b'>', "to close PRI")?;

    if s.peek() == Some(b'0') {
        return Err(SyslogError::malformed("invalid VERSION"));
    }
    let version = s.number("VERSION", 3)?;
    s.expect(b' ', "after VERSION")?;

    let timestamp = match s.field("TIMESTAMP", MAX_TIMESTAMP_LEN)? {
        Some(text) => Some(DateTime::parse_from_rfc3339(text).map_err(|e| {
            SyslogError::malformed(format!("invalid TIMESTAMP {:?}: {}", text, e))
        })?),
        None => None,
    };
    s.expect(b' ', "after TIMESTAMP")?;
    let hostname = s.field("HOSTNAME", MAX_HOSTNAME_LEN)?.map(str::to_owned);
    s.expect(b' ', "after HOSTNAME")?;
    let app_name = s.field("APP-NAME", MAX_APP_NAME_LEN)?.map(str::to_owned);
    s.expect(b' ', "after APP-NAME")?;
    let proc_id = s.field("PROCID", MAX_PROC_ID_LEN)?.map(str::to_owned);
    s.expect(b' ', "after PROCID")?;
    let msg_id = s.field("MSGID", MAX_MSG_ID_LEN)?.map(str::to_owned);
    s.expect(b' ', "after MSGID")?;
    let structured_data = s.structured_data()?.map(str::to_owned);

    let message = if s.peek().is_none() {
        None
    } else {
        s.expect(b' ', "before MSG")?;
        let body = &packet[s.pos..];
        Some(body.strip_prefix(BOM).unwrap_or(body).to_vec())
    };

    Ok(SyslogMessage {
        facility: (priority / 8) as u8,
        severity: (priority % 8) as u8,
        version,
        timestamp,
        hostname,
        app_name,
        proc_id,
        msg_id,
        structured_data,
        message,
    })
}

/// Decide which log a message belongs to
pub fn route(message: &SyslogMessage) -> Result<IngestEvent, SyslogError> {
    let app_name = message
        .app_name
        .as_deref()
        .ok_or(SyslogError::MissingField("APP-NAME"))?;
    let msg_id = message
        .msg_id
        .as_deref()
        .ok_or(SyslogError::MissingField("MSGID"))?;
    let timestamp = message
        .timestamp
        .ok_or(SyslogError::MissingField("TIMESTAMP"))?
        .with_timezone(&Utc);
    if codec::timestamp_nanos(timestamp).is_none() {
        return Err(SyslogError::TimestampOutOfRange(timestamp.to_rfc3339()));
    }

    let log = match msg_id {
        "out" | "err" => format!("{}:{}", app_name, msg_id),
        id if id == app_name => app_name.to_owned(),
        other => return Err(SyslogError::UnexpectedMsgId(other.to_owned())),
    };

    let mut body = message.message.clone().unwrap_or_default();
    if body.last() == Some(&b'\n') {
        body.pop();
    }

    Ok(IngestEvent {
        log,
        timestamp,
        message: body,
    })
}

/// Receives syslog datagrams and appends them through a [`Collector`]
pub struct SyslogListener {
    socket: UdpSocket,
    config: SyslogConfig,
    collector: Collector,
}

impl SyslogListener {
    /// Bind the UDP socket
    #[instrument(skip(collector), fields(addr = %config.bind_addr))]
    pub async fn bind(config: SyslogConfig, collector: Collector) -> CollectorResult<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        Ok(Self {
            socket,
            config,
            collector,
        })
    }

    /// The bound address; useful when binding port 0
    pub fn local_addr(&self) -> CollectorResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until cancelled
    ///
    /// Bad packets, and packets the collector rejects as invalid, are
    /// dropped with a warning. Any other append failure or a socket error
    /// ends the listener with that error.
    pub async fn run(self, cancel: CancellationToken) -> CollectorResult<()> {
        info!(addr = %self.local_addr()?, "Listening for syslog");
        let mut buffer = vec![0u8; self.config.max_packet_size.max(1)];

        loop {
            let (len, peer) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Syslog listener shutting down");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buffer) => received?,
            };

            let event = match parse_rfc5424(&buffer[..len]).and_then(|message| route(&message)) {
                Ok(event) => event,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Dropping syslog packet");
                    continue;
                }
            };

            debug!(log = %event.log, peer = %peer, "Syslog event");
            match self
                .collector
                .add_event(&event.log, event.timestamp, &event.message)
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_validation() => {
                    warn!(peer = %peer, log = %event.log, error = %e, "Dropping syslog packet");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
