//! UDP realisation of the datagram capability
//!
//! Server: every accepted offer gets its own socket and echo task. The first
//! datagram's source becomes the session's peer; traffic from anyone else is
//! ignored. An empty datagram or the idle timeout ends the session. Offers
//! beyond the session limit are refused before any socket is bound.
//!
//! Client: binds one socket, advertises it as a candidate and connects it to
//! the answer's first candidate.

use super::{
    Candidate, ChannelEvent, DatagramChannel, EchoEndpoint, RealtimeTransport, SessionDescription,
    MAX_DATAGRAM,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Bind a UDP socket on `ip`, inside `range` when one is given
pub async fn bind_in_range(ip: IpAddr, range: Option<(u16, u16)>) -> Result<UdpSocket> {
    let Some((min, max)) = range else {
        return UdpSocket::bind((ip, 0))
            .await
            .map_err(|e| AppError::network(format!("Failed to bind UDP socket on {}: {}", ip, e)));
    };

    for port in min..=max {
        match UdpSocket::bind((ip, port)).await {
            Ok(socket) => return Ok(socket),
            Err(e) if e.kind() == ErrorKind::AddrInUse => continue,
            Err(e) => {
                return Err(AppError::network(format!("Failed to bind UDP {}:{}: {}", ip, port, e)));
            }
        }
    }

    Err(AppError::network(format!("No free UDP port in range {}-{}", min, max)))
}

/// Decrements the live session count when an echo task ends
struct SessionGuard(Arc<AtomicUsize>);

impl SessionGuard {
    /// Take a slot unless `limit` sessions are already live
    fn try_enter(counter: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .ok()
            .map(|_| Self(counter.clone()))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Server-side echo capability over UDP
pub struct UdpEchoEndpoint {
    bind_ip: IpAddr,
    port_range: Option<(u16, u16)>,
    public_ip: Option<IpAddr>,
    idle_timeout: Duration,
    max_sessions: usize,
    active: Arc<AtomicUsize>,
}

impl UdpEchoEndpoint {
    pub fn new(bind_ip: IpAddr, port_range: Option<(u16, u16)>, public_ip: Option<IpAddr>, idle_timeout: Duration) -> Self {
        Self {
            bind_ip,
            port_range,
            public_ip,
            idle_timeout,
            max_sessions: crate::defaults::DEFAULT_RTC_MAX_SESSIONS,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_session_limit(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Build from the server configuration
    pub fn from_config(config: &crate::models::Config) -> Result<Self> {
        let bind_ip = if config.server_host == "localhost" {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            config
                .server_host
                .parse()
                .map_err(|e| AppError::config(format!("Invalid server host '{}': {}", config.server_host, e)))?
        };

        Ok(Self::new(
            bind_ip,
            config.udp_port_range(),
            config.rtc_public_ip,
            config.rtc_idle_timeout(),
        )
        .with_session_limit(config.rtc_max_sessions))
    }
}

#[async_trait]
impl EchoEndpoint for UdpEchoEndpoint {
    async fn open(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let Some(guard) = SessionGuard::try_enter(&self.active, self.max_sessions) else {
            warn!(offer_session = %offer.session_id, limit = self.max_sessions, "Echo session limit reached");
            return Err(AppError::unavailable(format!(
                "echo session limit of {} reached, try again later",
                self.max_sessions
            )));
        };

        let socket = bind_in_range(self.bind_ip, self.port_range).await?;
        let local = socket.local_addr()?;
        let advertised = SocketAddr::new(self.public_ip.unwrap_or(local.ip()), local.port());

        let answer = SessionDescription::new(Uuid::new_v4().simple().to_string())
            .with_candidate(Candidate::udp(1, advertised));

        info!(
            offer_session = %offer.session_id,
            answer_session = %answer.session_id,
            local = %local,
            advertised = %advertised,
            "Echo session opened"
        );

        tokio::spawn(echo_loop(socket, offer.session_id, self.idle_timeout, guard));

        Ok(answer)
    }

    fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Echo datagrams back to the session's peer until closed or idle
async fn echo_loop(socket: UdpSocket, session_id: String, idle_timeout: Duration, _guard: SessionGuard) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut peer: Option<SocketAddr> = None;
    let mut echoed: u64 = 0;

    loop {
        let (len, from) = match tokio::time::timeout(idle_timeout, socket.recv_from(&mut buf)).await {
            Err(_) => {
                info!(session = %session_id, echoed, "Echo session idle, closing");
                break;
            }
            Ok(Err(e)) => {
                // ICMP errors from an earlier send surface here; the session survives them
                debug!(session = %session_id, error = %e, "Echo receive error");
                continue;
            }
            Ok(Ok(received)) => received,
        };

        match peer {
            None => {
                debug!(session = %session_id, peer = %from, "Echo peer bound");
                peer = Some(from);
            }
            Some(bound) if bound != from => {
                debug!(session = %session_id, from = %from, "Ignoring datagram from foreign source");
                continue;
            }
            Some(_) => {}
        }

        if len == 0 {
            info!(session = %session_id, echoed, "Echo session closed by peer");
            break;
        }

        if let Err(e) = socket.send_to(&buf[..len], from).await {
            warn!(session = %session_id, error = %e, "Error echoing datagram");
            continue;
        }
        echoed += 1;
    }
}

/// Client-side transport over UDP
pub struct UdpTransport {
    server_url: Url,
    port_range: Option<(u16, u16)>,
    gather_timeout: Duration,
    socket: Option<UdpSocket>,
    server_ip: Option<IpAddr>,
}

impl UdpTransport {
    pub fn new(server_url: Url, port_range: Option<(u16, u16)>, gather_timeout: Duration) -> Self {
        Self {
            server_url,
            port_range,
            gather_timeout,
            socket: None,
            server_ip: None,
        }
    }

    /// Resolve the server host, preferring IPv4 to match a wildcard-bound server
    async fn resolve_server(&self) -> Result<SocketAddr> {
        let host = self
            .server_url
            .host_str()
            .ok_or_else(|| AppError::validation("Server URL must have a host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = self.server_url.port_or_known_default().unwrap_or(80);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| AppError::network(format!("Failed to resolve {}: {}", host, e)))?
            .collect();

        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| AppError::network(format!("No address found for {}", host)))
    }

    /// Bind the local socket and list the addresses it can be reached on
    async fn gather(&mut self) -> Result<Vec<Candidate>> {
        let server = self.resolve_server().await?;
        let unspecified = match server.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };

        let socket = bind_in_range(unspecified, self.port_range).await?;
        let port = socket.local_addr()?.port();

        // The interface the kernel routes towards the server is the useful candidate
        let probe = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await?;
        probe.connect(server).await?;
        let route_ip = probe.local_addr()?.ip();

        debug!(server = %server, route_ip = %route_ip, port, "Candidates gathered");

        self.socket = Some(socket);
        self.server_ip = Some(server.ip());
        Ok(vec![Candidate::udp(1, SocketAddr::new(route_ip, port))])
    }
}

#[async_trait]
impl RealtimeTransport for UdpTransport {
    async fn create_offer(&mut self) -> Result<SessionDescription> {
        let candidates = tokio::time::timeout(self.gather_timeout, self.gather())
            .await
            .map_err(|_| {
                AppError::timeout(format!(
                    "Candidate gathering did not complete within {:?}",
                    self.gather_timeout
                ))
            })??;

        let offer = candidates
            .into_iter()
            .fold(SessionDescription::new(Uuid::new_v4().simple().to_string()), |desc, c| {
                desc.with_candidate(c)
            });
        Ok(offer)
    }

    async fn apply_answer(&mut self, answer: SessionDescription) -> Result<Box<dyn DatagramChannel>> {
        let socket = self
            .socket
            .take()
            .ok_or_else(|| AppError::signaling("Answer applied before an offer was created"))?;

        let candidate = answer
            .candidates
            .first()
            .ok_or_else(|| AppError::signaling("Answer carries no candidates"))?;

        let mut remote = candidate.addr;
        if remote.ip().is_unspecified() {
            if let Some(server_ip) = self.server_ip {
                remote.set_ip(server_ip);
            }
        }

        socket
            .connect(remote)
            .await
            .map_err(|e| AppError::network(format!("Failed to connect datagram channel to {}: {}", remote, e)))?;

        info!(remote = %remote, session = %answer.session_id, "Datagram channel ready");
        Ok(Box::new(UdpChannel::new(socket)))
    }
}

/// Connected UDP socket acting as a datagram channel
pub struct UdpChannel {
    socket: UdpSocket,
    closed: AtomicBool,
}

impl UdpChannel {
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DatagramChannel for UdpChannel {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::network("Datagram channel is closed"));
        }
        self.socket.send(payload).await.map_err(|e| match e.kind() {
            ErrorKind::ConnectionRefused => AppError::network("Peer unreachable"),
            _ => AppError::network(format!("Datagram send failed: {}", e)),
        })?;
        Ok(())
    }

    async fn recv(&self) -> ChannelEvent {
        if self.closed.load(Ordering::SeqCst) {
            return ChannelEvent::Closed;
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        match self.socket.recv(&mut buf).await {
            Ok(len) => ChannelEvent::Message(Bytes::copy_from_slice(&buf[..len])),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                ChannelEvent::Failed("Peer unreachable (connection refused)".to_string())
            }
            Err(e) => ChannelEvent::Failed(e.to_string()),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Empty datagram tells the echo side to tear down; losing it only delays that
        if let Err(e) = self.socket.send(&[]).await {
            debug!(error = %e, "Close notification not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost_endpoint(idle: Duration) -> UdpEchoEndpoint {
        UdpEchoEndpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), None, None, idle)
    }

    fn offer() -> SessionDescription {
        SessionDescription::new("client").with_candidate(Candidate::udp(1, "127.0.0.1:9".parse().unwrap()))
    }

    #[tokio::test]
    async fn test_echo_returns_bytes_verbatim() {
        let endpoint = localhost_endpoint(Duration::from_secs(5));
        let answer = endpoint.open(offer()).await.unwrap();
        assert_eq!(endpoint.active_sessions(), 1);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(answer.candidates[0].addr).await.unwrap();

        let payload = br#"{"id":3,"timestamp":12.5}"#;
        client.send(payload).await.unwrap();

        let mut buf = [0u8; 128];
        let len = tokio::time::timeout(Duration::from_secs(2), client.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], payload);
    }

    #[tokio::test]
    async fn test_empty_datagram_closes_session() {
        let endpoint = localhost_endpoint(Duration::from_secs(5));
        let answer = endpoint.open(offer()).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(answer.candidates[0].addr).await.unwrap();
        client.send(&[]).await.unwrap();

        for _ in 0..50 {
            if endpoint.active_sessions() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(endpoint.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_idle_session_is_closed() {
        let endpoint = localhost_endpoint(Duration::from_millis(50));
        endpoint.open(offer()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(endpoint.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_public_ip_is_advertised() {
        let public: IpAddr = "203.0.113.7".parse().unwrap();
        let endpoint = UdpEchoEndpoint::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            None,
            Some(public),
            Duration::from_millis(50),
        );
        let answer = endpoint.open(offer()).await.unwrap();
        assert_eq!(answer.candidates[0].addr.ip(), public);
    }

    #[tokio::test]
    async fn test_bind_in_range_picks_free_port() {
        let first = bind_in_range(IpAddr::V4(Ipv4Addr::LOCALHOST), None).await.unwrap();
        let taken = first.local_addr().unwrap().port();

        // A one-port range that is already taken has nothing left
        let result = bind_in_range(IpAddr::V4(Ipv4Addr::LOCALHOST), Some((taken, taken))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transport_against_echo_endpoint() {
        let endpoint = localhost_endpoint(Duration::from_secs(5));
        let mut transport = UdpTransport::new(
            Url::parse("http://127.0.0.1:8080").unwrap(),
            None,
            Duration::from_secs(2),
        );

        let offer = transport.create_offer().await.unwrap();
        assert_eq!(offer.candidates.len(), 1);

        let answer = endpoint.open(offer).await.unwrap();
        let channel = transport.apply_answer(answer).await.unwrap();

        channel.send(b"ping").await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), channel.recv()).await.unwrap();
        assert_eq!(event, ChannelEvent::Message(Bytes::from_static(b"ping")));

        channel.close().await;
        assert_eq!(channel.recv().await, ChannelEvent::Closed);
        assert!(channel.send(b"late").await.is_err());
    }

    #[tokio::test]
    async fn test_answer_before_offer_is_rejected() {
        let mut transport = UdpTransport::new(
            Url::parse("http://127.0.0.1:8080").unwrap(),
            None,
            Duration::from_secs(2),
        );
        let result = transport.apply_answer(offer()).await;
        assert!(matches!(result, Err(AppError::Signaling(_))));
    }

    #[tokio::test]
    async fn test_offers_beyond_limit_are_refused() {
        let endpoint = localhost_endpoint(Duration::from_secs(5)).with_session_limit(2);
        endpoint.open(offer()).await.unwrap();
        endpoint.open(offer()).await.unwrap();

        let refused = endpoint.open(offer()).await;
        assert!(matches!(refused, Err(AppError::Unavailable(_))));
        assert_eq!(endpoint.active_sessions(), 2);
    }

    #[tokio::test]
    async fn test_failed_bind_frees_session_slot() {
        let taken = bind_in_range(IpAddr::V4(Ipv4Addr::LOCALHOST), None).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let endpoint = UdpEchoEndpoint::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            Some((port, port)),
            None,
            Duration::from_secs(5),
        )
        .with_session_limit(1);

        assert!(endpoint.open(offer()).await.is_err());
        assert_eq!(endpoint.active_sessions(), 0);
    }
}
