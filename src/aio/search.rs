use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::prelude::*;
use hyper::client::HttpConnector;
use hyper::Client;
use tokio::io::ReadBuf;
use tokio::net::UdpSocket;
use url::Url;

use super::gateway::{ControlPoint, Gateway};
use crate::common::{messages, SearchOptions};
use crate::errors::SearchError;
use crate::search::{handle_broadcast_resp, Announcement, MAX_RESPONSE_SIZE};

/// Finds devices on the local network, asynchronously.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Announcements of one search.
    type Subscription: Subscription;
    /// Handle to a found device.
    type Device: ControlPoint;

    /// Start searching for devices of type `search_target`.
    async fn search(&self, search_target: &str) -> Result<Self::Subscription, SearchError>;

    /// Build a handle to the device described at `location`.
    async fn connect(&self, location: &Url) -> Result<Self::Device, SearchError>;
}

/// The announcements of one running search.
pub trait Subscription: Stream<Item = Result<Announcement, SearchError>> + Unpin + Send {
    /// Stop the search. The stream yields nothing afterwards.
    fn end(&mut self);
}

/// SSDP discovery over a single UDP socket.
#[derive(Debug)]
pub struct Ssdp {
    socket: Arc<UdpSocket>,
    broadcast_address: SocketAddr,
    client: Client<HttpConnector>,
}

impl Ssdp {
    /// Bind the discovery socket.
    pub async fn new(options: &SearchOptions) -> Result<Ssdp, SearchError> {
        let socket = UdpSocket::bind(&options.bind_addr).await?;
        debug!("bound discovery socket on {:?}", socket.local_addr());
        Ok(Ssdp {
            socket: Arc::new(socket),
            broadcast_address: options.broadcast_address,
            client: Client::new(),
        })
    }

    /// Release the discovery socket.
    pub fn close(self) {
        debug!("closing discovery socket on {:?}", self.socket.local_addr());
    }
}

#[async_trait]
impl Discovery for Ssdp {
    type Subscription = SsdpSubscription;
    type Device = Gateway;

    async fn search(&self, search_target: &str) -> Result<SsdpSubscription, SearchError> {
        debug!(
            "sending broadcast request to: {} on interface: {:?}",
            self.broadcast_address,
            self.socket.local_addr()
        );
        drain(&self.socket)?;
        let request = messages::format_search_request(search_target);
        self.socket.send_to(request.as_bytes(), &self.broadcast_address).await?;
        Ok(SsdpSubscription {
            socket: Arc::clone(&self.socket),
            search_target: search_target.to_string(),
            ended: false,
        })
    }

    async fn connect(&self, location: &Url) -> Result<Gateway, SearchError> {
        Gateway::from_location(self.client.clone(), location).await
    }
}

// Drop answers still queued from earlier searches.
fn drain(socket: &UdpSocket) -> Result<(), SearchError> {
    let mut buff = [0u8; MAX_RESPONSE_SIZE];
    loop {
        match socket.try_recv_from(&mut buff) {
            Ok((_, from)) => debug!("dropping stale broadcast response from {}", from),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Announcements received on the socket of an [`Ssdp`].
#[derive(Debug)]
pub struct SsdpSubscription {
    socket: Arc<UdpSocket>,
    search_target: String,
    ended: bool,
}

impl Stream for SsdpSubscription {
    type Item = Result<Announcement, SearchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut buff = [0u8; MAX_RESPONSE_SIZE];
        while !this.ended {
            let mut buf = ReadBuf::new(&mut buff);
            let from = match this.socket.poll_recv_from(cx, &mut buf) {
                Poll::Ready(Ok(from)) => from,
                Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(err.into()))),
                Poll::Pending => return Poll::Pending,
            };
            match handle_broadcast_resp(&this.search_target, from, buf.filled()) {
                Ok(Some(announcement)) => return Poll::Ready(Some(Ok(announcement))),
                Ok(None) => continue,
                Err(e) => debug!("ignoring broadcast response from {}: {}", from, e),
            }
        }
        Poll::Ready(None)
    }
}

impl Subscription for SsdpSubscription {
    fn end(&mut self) {
        if !self.ended {
            debug!("ending search for {}", self.search_target);
            self.ended = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_subscription_receives_announcement() {
        let gateway = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let options = SearchOptions {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            broadcast_address: gateway.local_addr().unwrap(),
            timeout: Some(Duration::from_secs(5)),
        };
        let ssdp = Ssdp::new(&options).await.unwrap();
        let mut subscription = ssdp.search(messages::IGD_SEARCH_TARGET).await.unwrap();

        let mut buff = [0u8; MAX_RESPONSE_SIZE];
        let (n, from) = gateway.recv_from(&mut buff).await.unwrap();
        assert!(buff[..n].starts_with(b"M-SEARCH"));
        gateway
            .send_to(b"HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\nLOCATION: http://127.0.0.1:5000/other.xml\r\n\r\n", from)
            .await
            .unwrap();
        gateway
            .send_to(
                b"HTTP/1.1 200 OK\r\nST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\nLOCATION: http://127.0.0.1:5000/rootDesc.xml\r\n\r\n",
                from,
            )
            .await
            .unwrap();

        let announcement = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(announcement.location.as_str(), "http://127.0.0.1:5000/rootDesc.xml");

        subscription.end();
        assert!(subscription.next().await.is_none());
        ssdp.close();
    }

    #[tokio::test]
    async fn test_search_ignores_answers_to_earlier_search() {
        let gateway = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let options = SearchOptions {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            broadcast_address: gateway.local_addr().unwrap(),
            timeout: None,
        };
        let ssdp = Ssdp::new(&options).await.unwrap();
        let mut first = ssdp.search(messages::IGD_SEARCH_TARGET).await.unwrap();

        let mut buff = [0u8; MAX_RESPONSE_SIZE];
        let (_, from) = gateway.recv_from(&mut buff).await.unwrap();
        for name in &["a", "b"] {
            let answer = format!(
                "HTTP/1.1 200 OK\r\nST: {}\r\nLOCATION: http://127.0.0.1:5001/{}.xml\r\n\r\n",
                messages::IGD_SEARCH_TARGET,
                name
            );
            gateway.send_to(answer.as_bytes(), from).await.unwrap();
        }

        let announcement = tokio::time::timeout(Duration::from_secs(5), first.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(announcement.location.as_str(), "http://127.0.0.1:5001/a.xml");
        first.end();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut second = ssdp.search(messages::IGD_SEARCH_TARGET).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_millis(200), second.next()).await;
        assert!(outcome.is_err(), "stale answer reached the second search");
    }
}
