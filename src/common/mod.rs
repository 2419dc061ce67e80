pub mod mapping;
pub mod messages;
pub mod options;
pub mod parsing;
pub mod response;

pub use self::options::SearchOptions;

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

/// The address of the local interface that routes towards `remote`.
///
/// Connecting a UDP socket sends nothing, it only selects a route.
pub fn local_address_for(remote: SocketAddr) -> io::Result<IpAddr> {
    let unspecified = match remote {
        SocketAddr::V4(..) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(..) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0))?;
    socket.connect(remote)?;
    Ok(socket.local_addr()?.ip())
}

#[test]
fn test_local_address_for_loopback() {
    let address = local_address_for("127.0.0.1:1900".parse().unwrap()).unwrap();
    assert_eq!(address, IpAddr::V4(Ipv4Addr::LOCALHOST));
}
