use crate::domain::mac_address::MacAddress;
use crate::domain::result::{DomainError, DomainResult};
use chrono::{DateTime, SecondsFormat, Utc};

/// A message received from a mesh device. Immutable once stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMessage {
    pub mac: MacAddress,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// What a device sent, before the relay stamps it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub mac: MacAddress,
    pub payload: String,
}

impl DeviceMessage {
    pub fn received_now(incoming: IncomingMessage) -> Self {
        Self {
            mac: incoming.mac,
            payload: incoming.payload,
            received_at: Utc::now(),
        }
    }

    /// Line appended to the device's record file, newline included.
    ///
    /// `<RFC3339 millis>\t<MAC>\t<payload>\n`
    ///
    /// Line breaks inside the payload are written as `\n` / `\r` escapes
    /// (and `\` as `\\`), so one message is always exactly one line.
    pub fn to_record_line(&self) -> String {
        format!(
            "{}\t{}\t{}\n",
            self.received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.mac,
            escape_payload(self.payload.trim_end_matches(['\r', '\n']))
        )
    }

    /// Inverse of [`DeviceMessage::to_record_line`]; the trailing newline is optional.
    pub fn from_record_line(line: &str) -> DomainResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.splitn(3, '\t');

        let (Some(timestamp), Some(mac), Some(payload)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(DomainError::MalformedFrame(format!(
                "record line has fewer than 3 fields: {line}"
            )));
        };

        let received_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| DomainError::MalformedFrame(format!("bad timestamp '{timestamp}': {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            mac: MacAddress::parse(mac)?,
            payload: unescape_payload(payload),
            received_at,
        })
    }
}

fn escape_payload(payload: &str) -> String {
    let mut escaped = String::with_capacity(payload.len());
    for c in payload.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape_payload(field: &str) -> String {
    let mut payload = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            payload.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => payload.push('\n'),
            Some('r') => payload.push('\r'),
            Some('\\') => payload.push('\\'),
            // Unknown escape: keep it verbatim.
            Some(other) => {
                payload.push('\\');
                payload.push(other);
            }
            None => payload.push('\\'),
        }
    }
    payload
}
