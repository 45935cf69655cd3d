//! Session descriptions exchanged during signaling
//!
//! A description is a few SDP-style lines naming the session and the
//! datagram endpoints ("candidates") a peer can be reached on:
//!
//! ```text
//! v=0
//! o=- 6f1c0c5e 0 IN IP4 0.0.0.0
//! s=nst
//! a=candidate:1 udp 192.168.1.20 50012
//! a=end-of-candidates
//! ```

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// JSON envelope used by `/webrtc/offer` in both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpMessage {
    pub sdp: String,
}

/// One reachable datagram endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub foundation: u32,
    pub addr: SocketAddr,
}

impl Candidate {
    pub fn udp(foundation: u32, addr: SocketAddr) -> Self {
        Self { foundation, addr }
    }
}

/// An offer or an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub session_id: String,
    pub candidates: Vec<Candidate>,
}

impl SessionDescription {
    pub fn new<S: Into<String>>(session_id: S) -> Self {
        Self {
            session_id: session_id.into(),
            candidates: Vec::new(),
        }
    }

    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Wrap into the JSON signaling envelope
    pub fn to_message(&self) -> SdpMessage {
        SdpMessage { sdp: self.to_string() }
    }

    /// Parse the `sdp` field of a signaling envelope
    pub fn from_message(message: &SdpMessage) -> Result<Self> {
        message.sdp.parse()
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "v=0")?;
        writeln!(f, "o=- {} 0 IN IP4 0.0.0.0", self.session_id)?;
        writeln!(f, "s=nst")?;
        for candidate in &self.candidates {
            writeln!(
                f,
                "a=candidate:{} udp {} {}",
                candidate.foundation,
                candidate.addr.ip(),
                candidate.addr.port()
            )?;
        }
        writeln!(f, "a=end-of-candidates")
    }
}

impl FromStr for SessionDescription {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let mut lines = s.lines().map(str::trim).filter(|line| !line.is_empty());

        if lines.next() != Some("v=0") {
            return Err(AppError::signaling("session description must start with v=0"));
        }

        let mut session_id = None;
        let mut candidates = Vec::new();

        for line in lines {
            if let Some(origin) = line.strip_prefix("o=") {
                session_id = origin.split_whitespace().nth(1).map(str::to_string);
            } else if let Some(candidate) = line.strip_prefix("a=candidate:") {
                candidates.push(parse_candidate(candidate)?);
            }
        }

        let session_id = session_id
            .ok_or_else(|| AppError::signaling("session description has no origin line"))?;

        if candidates.is_empty() {
            return Err(AppError::signaling("session description has no candidates"));
        }

        Ok(Self { session_id, candidates })
    }
}

/// `<foundation> udp <ip> <port>`
fn parse_candidate(value: &str) -> Result<Candidate> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    let [foundation, transport, ip, port] = fields[..] else {
        return Err(AppError::signaling(format!("malformed candidate: {}", value)));
    };

    if !transport.eq_ignore_ascii_case("udp") {
        return Err(AppError::signaling(format!("unsupported candidate transport: {}", transport)));
    }

    let foundation = foundation
        .parse::<u32>()
        .map_err(|e| AppError::signaling(format!("bad candidate foundation '{}': {}", foundation, e)))?;
    let ip = ip
        .parse::<IpAddr>()
        .map_err(|e| AppError::signaling(format!("bad candidate address '{}': {}", ip, e)))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| AppError::signaling(format!("bad candidate port '{}': {}", port, e)))?;

    Ok(Candidate::udp(foundation, SocketAddr::new(ip, port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionDescription {
        SessionDescription::new("abc123")
            .with_candidate(Candidate::udp(1, "127.0.0.1:50000".parse().unwrap()))
            .with_candidate(Candidate::udp(2, "[::1]:50001".parse().unwrap()))
    }

    #[test]
    fn test_render_and_parse() {
        let text = sample().to_string();
        assert!(text.starts_with("v=0\n"));
        assert!(text.contains("a=candidate:1 udp 127.0.0.1 50000"));
        assert!(text.contains("a=candidate:2 udp ::1 50001"));

        let parsed: SessionDescription = text.parse().unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_parse_accepts_crlf() {
        let text = "v=0\r\no=- s1 0 IN IP4 0.0.0.0\r\ns=nst\r\na=candidate:1 udp 10.0.0.1 4000\r\n";
        let parsed: SessionDescription = text.parse().unwrap();
        assert_eq!(parsed.session_id, "s1");
        assert_eq!(parsed.candidates[0].addr, "10.0.0.1:4000".parse().unwrap());
    }

    #[test]
    fn test_parse_rejects_missing_candidates() {
        let text = "v=0\no=- s1 0 IN IP4 0.0.0.0\ns=nst\na=end-of-candidates\n";
        assert!(matches!(text.parse::<SessionDescription>(), Err(AppError::Signaling(_))));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("hello".parse::<SessionDescription>().is_err());
        assert!("v=0\no=- s 0 IN IP4 0.0.0.0\na=candidate:1 tcp 1.2.3.4 80\n"
            .parse::<SessionDescription>()
            .is_err());
        assert!("v=0\no=- s 0 IN IP4 0.0.0.0\na=candidate:1 udp 1.2.3.4 99999\n"
            .parse::<SessionDescription>()
            .is_err());
    }

    #[test]
    fn test_message_envelope() {
        let message = sample().to_message();
        let json = serde_json::to_string(&message).unwrap();
        let back: SdpMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(SessionDescription::from_message(&back).unwrap(), sample());
    }
}
