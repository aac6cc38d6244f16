use chrono::{DateTime, Utc};
use ring::hmac;

/// Requests whose embedded timestamp is older than this are rejected even
/// when the MAC itself is valid.
const REPLAY_WINDOW_SECS: i64 = 30 * 60;

/// Why a webhook request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingHeader,
    MissingSecret,
    MalformedHeader,
    StaleTimestamp,
    BadSignature,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingHeader => "missing signature header",
            RejectReason::MissingSecret => "webhook secret not configured",
            RejectReason::MalformedHeader => "malformed signature header",
            RejectReason::StaleTimestamp => "signature timestamp outside replay window",
            RejectReason::BadSignature => "signature mismatch",
        }
    }

    /// HTTP status a boundary handler should answer with.
    pub fn status(&self) -> u16 {
        match self {
            RejectReason::MalformedHeader => 400,
            _ => 401,
        }
    }
}

/// Outcome of verifying one inbound webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub ok: bool,
    pub reason: Option<RejectReason>,
    pub status: u16,
}

impl Verdict {
    fn accept() -> Self {
        Self {
            ok: true,
            reason: None,
            status: 200,
        }
    }

    fn reject(reason: RejectReason) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            status: reason.status(),
        }
    }
}

/// Verify an inbound webhook against the shared secret.
///
/// Header scheme: `t=<unix-seconds>,v0=<hex hmac-sha256>` where the MAC is
/// computed over `"{t}.{raw body}"`. The comparison runs through
/// `ring::hmac::verify`, which is constant-time; callers must short-circuit
/// on a failed verdict before parsing the body as trusted input.
///
/// Takes `now` explicitly so the replay window is deterministic under test.
pub fn verify(
    raw_body: &[u8],
    signature_header: Option<&str>,
    secret: Option<&str>,
    now: DateTime<Utc>,
) -> Verdict {
    let Some(header) = signature_header else {
        return Verdict::reject(RejectReason::MissingHeader);
    };
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return Verdict::reject(RejectReason::MissingSecret);
    };

    let Some((timestamp, signature_hex)) = parse_header(header) else {
        return Verdict::reject(RejectReason::MalformedHeader);
    };
    let Some(signature) = hex_decode(signature_hex) else {
        return Verdict::reject(RejectReason::MalformedHeader);
    };

    // The window bounds the past only; future timestamps pass (clock skew).
    if now.timestamp() - timestamp > REPLAY_WINDOW_SECS {
        return Verdict::reject(RejectReason::StaleTimestamp);
    }

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut message = timestamp.to_string().into_bytes();
    message.push(b'.');
    message.extend_from_slice(raw_body);

    match hmac::verify(&key, &message, &signature) {
        Ok(()) => Verdict::accept(),
        Err(_) => Verdict::reject(RejectReason::BadSignature),
    }
}

/// Produce a `t=..,v0=..` header for a payload. Used by tests and by the
/// outbound webhook simulator in the dev tooling.
pub fn sign_payload(raw_body: &[u8], secret: &str, timestamp: i64) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut message = timestamp.to_string().into_bytes();
    message.push(b'.');
    message.extend_from_slice(raw_body);
    let tag = hmac::sign(&key, &message);
    format!("t={},v0={}", timestamp, hex_encode(tag.as_ref()))
}

fn parse_header(header: &str) -> Option<(i64, &str)> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        let (k, v) = part.trim().split_once('=')?;
        match k {
            "t" => timestamp = Some(v.parse::<i64>().ok()?),
            "v0" => signature = Some(v),
            _ => {}
        }
    }
    Some((timestamp?, signature?))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(input: &str) -> Option<Vec<u8>> {
    // Attacker-controlled input: byte-index slicing would panic on
    // multi-byte UTF-8, so operate on bytes only.
    if input.len() % 2 != 0 || input.is_empty() || !input.is_ascii() {
        return None;
    }
    input
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let high = hex_digit(pair[0])?;
            let low = hex_digit(pair[1])?;
            Some(high << 4 | low)
        })
        .collect()
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
