//! UDP socket helpers and local address lookup

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};

use crate::constants::{FALLBACK_IP, ROUTE_PROBE_ADDR};
use crate::error::NetworkError;

pub use tokio::net::UdpSocket;

/// Create a non-blocking IPv4 UDP socket bound to `addr`.
///
/// Address reuse is left off so a second responder on the same port fails to
/// bind instead of silently sharing the port. Must be called from within a
/// tokio runtime.
pub fn create_socket(addr: SocketAddr, broadcast: bool) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(NetworkError::SocketOption)?;

    if broadcast {
        socket
            .set_broadcast(true)
            .map_err(NetworkError::SocketOption)?;
    }
    socket
        .set_nonblocking(true)
        .map_err(NetworkError::SocketOption)?;

    socket
        .bind(&addr.into())
        .map_err(|source| NetworkError::BindFailed {
            addr: addr.to_string(),
            source,
        })?;

    let std_socket: StdUdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(NetworkError::SocketOption)
}

/// Best-effort LAN-facing address of this host.
///
/// Connects a throwaway UDP socket towards a public address and reads back the
/// local endpoint the routing table picked. Nothing is sent. The result reflects
/// the default route, not reachability from any particular requester; falls back
/// to loopback when there is no route.
pub fn local_lan_ip() -> IpAddr {
    probe_route().unwrap_or_else(|e| {
        tracing::debug!("LAN address lookup failed, using {}: {}", FALLBACK_IP, e);
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    })
}

fn probe_route() -> Result<IpAddr, NetworkError> {
    let socket = StdUdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .map_err(|e| NetworkError::AddressResolution(e.to_string()))?;
    socket
        .connect(ROUTE_PROBE_ADDR)
        .map_err(|e| NetworkError::AddressResolution(e.to_string()))?;
    let ip = socket
        .local_addr()
        .map_err(|e| NetworkError::AddressResolution(e.to_string()))?
        .ip();

    if ip.is_unspecified() {
        return Err(NetworkError::AddressResolution(
            "routing returned an unspecified address".to_string(),
        ));
    }
    Ok(ip)
}

/// Host name of this machine, or `unknown` if it cannot be read
pub fn local_hostname() -> String {
    system_hostname()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for `buf.len()` bytes and gethostname writes
    // at most that many.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..len]).into_owned())
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_socket_ephemeral() {
        let socket = create_socket((Ipv4Addr::LOCALHOST, 0).into(), false).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_port_conflict_is_an_error() {
        let first = create_socket((Ipv4Addr::LOCALHOST, 0).into(), false).unwrap();
        let taken = first.local_addr().unwrap();

        let second = create_socket(taken, false);
        assert!(matches!(second, Err(NetworkError::BindFailed { .. })));
    }

    #[test]
    fn test_local_lan_ip_is_usable() {
        let ip = local_lan_ip();
        assert!(!ip.is_unspecified());
    }

    #[test]
    fn test_hostname_has_no_nul() {
        let name = local_hostname();
        assert!(!name.is_empty());
        assert!(!name.contains('\0'));
    }
}
