use common::domain::{DomainError, DomainResult, IncomingMessage, MacAddress};
use serde_json::Value;

const SENDER_KEYS: [&str; 3] = ["mac", "src_addr", "addr"];
const PAYLOAD_KEYS: [&str; 2] = ["data", "payload"];

/// Parse one frame (a line without its terminator) sent by a mesh device
///
/// Two formats are understood:
/// - plain text `<MAC><sep><payload>`, where `<sep>` is the first space, tab or comma
/// - a JSON object such as `{"src_addr": "<MAC>", "data": ...}`
///
/// # Examples
/// ```
/// use ingest_listener::tcp::parse_frame;
///
/// let message = parse_frame("aa:bb:cc:dd:ee:ff hello").unwrap();
/// assert_eq!(message.mac.to_string(), "AA:BB:CC:DD:EE:FF");
/// assert_eq!(message.payload, "hello");
/// ```
pub fn parse_frame(line: &str) -> DomainResult<IncomingMessage> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DomainError::MalformedFrame("empty frame".to_string()));
    }

    if line.starts_with('{') {
        parse_json_frame(line)
    } else {
        parse_plain_frame(line)
    }
}

fn parse_plain_frame(line: &str) -> DomainResult<IncomingMessage> {
    let (mac_part, payload) = match line.find([' ', '\t', ',']) {
        Some(idx) => (&line[..idx], &line[idx + 1..]),
        None => (line, ""),
    };

    let mac = MacAddress::parse(mac_part)?;
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(DomainError::EmptyPayload(mac.to_string()));
    }

    Ok(IncomingMessage {
        mac,
        payload: payload.to_string(),
    })
}

fn parse_json_frame(line: &str) -> DomainResult<IncomingMessage> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| DomainError::MalformedFrame(format!("invalid JSON frame: {e}")))?;
    let Value::Object(object) = value else {
        return Err(DomainError::MalformedFrame("JSON frame is not an object".to_string()));
    };

    let sender = SENDER_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DomainError::MalformedFrame("JSON frame has no string mac/src_addr/addr field".to_string())
        })?;
    let mac = MacAddress::parse(sender)?;

    let payload = match PAYLOAD_KEYS.iter().find_map(|key| object.get(*key)) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.trim().to_string(),
        Some(other) => other.to_string(),
    };
    if payload.is_empty() {
        return Err(DomainError::EmptyPayload(mac.to_string()));
    }

    Ok(IncomingMessage { mac, payload })
}
