use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::str;
use std::sync::Arc;
use std::time::Instant;

use url::Url;

use crate::common::{local_address_for, messages, parsing, SearchOptions};
use crate::errors::SearchError;
use crate::gateway::{ControlPoint, Gateway};

pub(crate) const MAX_RESPONSE_SIZE: usize = 1500;

/// A device that answered a search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    /// URL of the device description
    pub location: Url,
    /// Address of the local interface that reaches the device
    pub address: IpAddr,
}

/// Finds devices on the local network.
pub trait Discovery {
    /// Announcements of one search.
    type Subscription: Subscription;
    /// Handle to a found device.
    type Device: ControlPoint;

    /// Start searching for devices of type `search_target`.
    fn search(&self, search_target: &str) -> Result<Self::Subscription, SearchError>;

    /// Build a handle to the device described at `location`.
    fn connect(&self, location: &Url) -> Result<Self::Device, SearchError>;
}

/// The announcements of one running search.
pub trait Subscription {
    /// Wait for the next announcement.
    ///
    /// Returns `Ok(None)` once `deadline` has passed or the subscription has
    /// ended. `None` as deadline waits forever.
    fn next_before(&mut self, deadline: Option<Instant>) -> Result<Option<Announcement>, SearchError>;

    /// Stop the search. Nothing is yielded afterwards.
    fn end(&mut self);
}

/// SSDP discovery over a single UDP socket.
///
/// The socket lives as long as the `Ssdp` and is shared by its searches.
#[derive(Debug)]
pub struct Ssdp {
    socket: Arc<UdpSocket>,
    broadcast_address: SocketAddr,
}

impl Ssdp {
    /// Bind the discovery socket.
    pub fn new(options: &SearchOptions) -> Result<Ssdp, SearchError> {
        let socket = UdpSocket::bind(options.bind_addr)?;
        debug!("bound discovery socket on {:?}", socket.local_addr());
        Ok(Ssdp {
            socket: Arc::new(socket),
            broadcast_address: options.broadcast_address,
        })
    }

    /// Release the discovery socket.
    pub fn close(self) {
        debug!("closing discovery socket on {:?}", self.socket.local_addr());
    }
}

impl Discovery for Ssdp {
    type Subscription = SsdpSubscription;
    type Device = Gateway;

    fn search(&self, search_target: &str) -> Result<SsdpSubscription, SearchError> {
        debug!(
            "sending broadcast request to: {} on interface: {:?}",
            self.broadcast_address,
            self.socket.local_addr()
        );
        drain(&self.socket)?;
        let request = messages::format_search_request(search_target);
        self.socket.send_to(request.as_bytes(), self.broadcast_address)?;
        Ok(SsdpSubscription {
            socket: Arc::clone(&self.socket),
            search_target: search_target.to_string(),
            ended: false,
        })
    }

    fn connect(&self, location: &Url) -> Result<Gateway, SearchError> {
        Gateway::from_location(location)
    }
}

/// Announcements received on the socket of an [`Ssdp`].
#[derive(Debug)]
pub struct SsdpSubscription {
    socket: Arc<UdpSocket>,
    search_target: String,
    ended: bool,
}

impl Subscription for SsdpSubscription {
    fn next_before(&mut self, deadline: Option<Instant>) -> Result<Option<Announcement>, SearchError> {
        let mut buff = [0u8; MAX_RESPONSE_SIZE];
        while !self.ended {
            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            self.socket.set_read_timeout(timeout)?;
            let (n, from) = match self.socket.recv_from(&mut buff) {
                Ok(received) => received,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                    continue
                }
                Err(e) => return Err(e.into()),
            };
            match handle_broadcast_resp(&self.search_target, from, &buff[..n]) {
                Ok(Some(announcement)) => return Ok(Some(announcement)),
                Ok(None) => continue,
                Err(e) => debug!("ignoring broadcast response from {}: {}", from, e),
            }
        }
        Ok(None)
    }

    fn end(&mut self) {
        if !self.ended {
            debug!("ending search for {}", self.search_target);
            self.ended = true;
        }
    }
}

// Drop answers still queued from earlier searches.
fn drain(socket: &UdpSocket) -> Result<(), SearchError> {
    let mut buff = [0u8; MAX_RESPONSE_SIZE];
    socket.set_nonblocking(true)?;
    let result = loop {
        match socket.recv_from(&mut buff) {
            Ok((_, from)) => debug!("dropping stale broadcast response from {}", from),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    socket.set_nonblocking(false)?;
    Ok(result?)
}

// Handle a UDP response message
pub(crate) fn handle_broadcast_resp(
    search_target: &str,
    from: SocketAddr,
    data: &[u8],
) -> Result<Option<Announcement>, SearchError> {
    debug!("handling broadcast response from: {}", from);

    let text = str::from_utf8(data)?;
    let response = parsing::parse_search_result(text)?;
    if !response.matches(search_target) {
        debug!(
            "dropping response from {} for {:?}",
            from, response.search_target
        );
        return Ok(None);
    }

    Ok(Some(Announcement {
        location: response.location,
        address: local_address_for(from)?,
    }))
}

#[test]
fn test_handle_broadcast_resp() {
    let from: SocketAddr = "127.0.0.1:1900".parse().unwrap();
    let data = b"HTTP/1.1 200 OK\r\nST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\nLOCATION: http://127.0.0.1:5000/rootDesc.xml\r\n\r\n";
    let announcement = handle_broadcast_resp(messages::IGD_SEARCH_TARGET, from, data)
        .unwrap()
        .unwrap();
    assert_eq!(announcement.location.as_str(), "http://127.0.0.1:5000/rootDesc.xml");
    assert_eq!(announcement.address, "127.0.0.1".parse::<IpAddr>().unwrap());

    let other = b"HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\nLOCATION: http://127.0.0.1:5000/rootDesc.xml\r\n\r\n";
    assert_eq!(
        handle_broadcast_resp(messages::IGD_SEARCH_TARGET, from, other).unwrap(),
        None
    );
    assert!(handle_broadcast_resp(messages::IGD_SEARCH_TARGET, from, b"NOTIFY * HTTP/1.1\r\n\r\n").is_err());
}

#[test]
fn test_subscription_receives_announcement() {
    use std::time::Duration;

    let gateway = UdpSocket::bind("127.0.0.1:0").unwrap();
    let options = SearchOptions {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        broadcast_address: gateway.local_addr().unwrap(),
        timeout: Some(Duration::from_secs(5)),
    };
    let ssdp = Ssdp::new(&options).unwrap();
    let mut subscription = ssdp.search(messages::IGD_SEARCH_TARGET).unwrap();

    let mut buff = [0u8; MAX_RESPONSE_SIZE];
    let (n, from) = gateway.recv_from(&mut buff).unwrap();
    assert!(str::from_utf8(&buff[..n]).unwrap().starts_with("M-SEARCH"));
    gateway
        .send_to(
            b"HTTP/1.1 200 OK\r\nST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\nLOCATION: http://127.0.0.1:5000/rootDesc.xml\r\n\r\n",
            from,
        )
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let announcement = subscription.next_before(Some(deadline)).unwrap().unwrap();
    assert_eq!(announcement.location.as_str(), "http://127.0.0.1:5000/rootDesc.xml");

    subscription.end();
    assert_eq!(subscription.next_before(None).unwrap(), None);
}

#[test]
fn test_subscription_times_out() {
    use std::time::Duration;

    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let options = SearchOptions {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        broadcast_address: silent.local_addr().unwrap(),
        timeout: None,
    };
    let ssdp = Ssdp::new(&options).unwrap();
    let mut subscription = ssdp.search(messages::IGD_SEARCH_TARGET).unwrap();
    let deadline = Instant::now() + Duration::from_millis(50);
    assert_eq!(subscription.next_before(Some(deadline)).unwrap(), None);
}

#[test]
fn test_search_ignores_answers_to_earlier_search() {
    use std::time::Duration;

    let gateway = UdpSocket::bind("127.0.0.1:0").unwrap();
    let options = SearchOptions {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        broadcast_address: gateway.local_addr().unwrap(),
        timeout: None,
    };
    let ssdp = Ssdp::new(&options).unwrap();
    let mut first = ssdp.search(messages::IGD_SEARCH_TARGET).unwrap();

    let mut buff = [0u8; MAX_RESPONSE_SIZE];
    let (_, from) = gateway.recv_from(&mut buff).unwrap();
    for name in &["a", "b"] {
        let answer = format!(
            "HTTP/1.1 200 OK\r\nST: {}\r\nLOCATION: http://127.0.0.1:5001/{}.xml\r\n\r\n",
            messages::IGD_SEARCH_TARGET,
            name
        );
        gateway.send_to(answer.as_bytes(), from).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    let announcement = first.next_before(Some(deadline)).unwrap().unwrap();
    assert_eq!(announcement.location.as_str(), "http://127.0.0.1:5001/a.xml");
    first.end();
    // let the second answer land in the socket buffer
    std::thread::sleep(Duration::from_millis(50));

    let mut second = ssdp.search(messages::IGD_SEARCH_TARGET).unwrap();
    let deadline = Instant::now() + Duration::from_millis(200);
    assert_eq!(second.next_before(Some(deadline)).unwrap(), None);
}
