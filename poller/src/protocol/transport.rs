use super::QueryError;
use log::debug;
use shared::Endpoint;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{lookup_host, UdpSocket};

/// Resolves the endpoint and returns a UDP socket connected to it.
///
/// Connecting filters out datagrams from other peers and surfaces ICMP
/// port-unreachable as an error on receive.
pub(crate) async fn connect(endpoint: &Endpoint) -> Result<UdpSocket, QueryError> {
    let target = resolve(endpoint).await?;
    let local = if target.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(target).await?;
    debug!("Querying {} via {}", endpoint.address(), target);
    Ok(socket)
}

async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, QueryError> {
    let mut addrs = lookup_host((endpoint.host.as_str(), endpoint.port)).await?;
    addrs.next().ok_or_else(|| {
        QueryError::Unreachable(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address for {}", endpoint.host),
        ))
    })
}
