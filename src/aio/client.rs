use std::net::IpAddr;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::time::timeout;

use super::gateway::ControlPoint;
use super::search::{Discovery, Ssdp, Subscription};
use crate::client::Session;
use crate::common::mapping::{self, MappingFilter, PortMapping, Step};
use crate::common::messages;
use crate::common::options::{normalize, Endpoint, PortMappingOptions};
use crate::common::parsing;
use crate::common::response::ActionResponse;
use crate::common::SearchOptions;
use crate::errors::{Error, SearchError};

/// Async UPnP IGD client.
///
/// Every operation searches for the gateway again; nothing is cached between calls.
#[derive(Debug)]
pub struct Client<D = Ssdp> {
    discovery: D,
    timeout: Option<Duration>,
}

impl Client<Ssdp> {
    /// Bind a discovery socket with the default options.
    pub async fn new() -> Result<Client<Ssdp>, SearchError> {
        Client::with_options(SearchOptions::default()).await
    }

    /// Bind a discovery socket with the given options.
    pub async fn with_options(options: SearchOptions) -> Result<Client<Ssdp>, SearchError> {
        let ssdp = Ssdp::new(&options).await?;
        Ok(Client::with_discovery(ssdp, options.timeout))
    }

    /// Release the discovery socket.
    pub fn close(self) {
        self.discovery.close();
    }
}

impl<D: Discovery> Client<D> {
    /// Use a custom discovery service.
    pub fn with_discovery(discovery: D, timeout: Option<Duration>) -> Client<D> {
        Client { discovery, timeout }
    }

    /// How long a search waits for a gateway.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Change how long a search waits for a gateway.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Find the first gateway that answers.
    pub async fn find_gateway(&self) -> Result<Session<D::Device>, Error> {
        let mut subscription = self.discovery.search(messages::IGD_SEARCH_TARGET).await?;
        // `None` when the timer won the race.
        // A timeout too large to represent waits forever.
        let limit = self.timeout.filter(|t| Instant::now().checked_add(*t).is_some());
        let outcome = match limit {
            Some(t) => timeout(t, subscription.next()).await.ok(),
            None => Some(subscription.next().await),
        };
        subscription.end();

        let announcement = match outcome {
            Some(Some(Ok(announcement))) => announcement,
            Some(Some(Err(err))) => return Err(err.into()),
            Some(None) | None => {
                debug!("no gateway answered within {:?}", self.timeout);
                return Err(Error::DiscoveryTimeout);
            }
        };
        debug!(
            "gateway announced at {} (local address {})",
            announcement.location, announcement.address
        );
        let gateway = self.discovery.connect(&announcement.location).await?;
        Ok(Session {
            gateway,
            address: announcement.address,
        })
    }

    /// Ask the gateway to forward `options.public` to `options.private`.
    ///
    /// The private host defaults to the local address that reaches the gateway.
    pub async fn add_port_mapping(&self, options: &PortMappingOptions) -> Result<ActionResponse, Error> {
        let Session { gateway, address } = self.find_gateway().await?;
        let ports = normalize(&options.public, &options.private);
        let args = mapping::add_arguments(options, &ports, address);
        Ok(gateway.run(messages::ADD_PORT_MAPPING, &args).await?)
    }

    /// Remove the mapping of `options.public` for `options.protocol`.
    pub async fn remove_port_mapping(&self, options: &PortMappingOptions) -> Result<ActionResponse, Error> {
        let Session { gateway, .. } = self.find_gateway().await?;
        let ports = normalize(&options.public, &Endpoint::Unspecified);
        let args = mapping::delete_arguments(options, &ports);
        Ok(gateway.run(messages::DELETE_PORT_MAPPING, &args).await?)
    }

    /// List the gateway's port mappings that pass `filter`.
    pub async fn port_mappings(&self, filter: &MappingFilter) -> Result<Vec<PortMapping>, Error> {
        let Session { gateway, address } = self.find_gateway().await?;
        let address = address.to_string();
        let mut mappings = Vec::new();
        let mut index = 0;
        loop {
            let args = mapping::entry_arguments(index);
            let result = gateway.run(messages::GET_GENERIC_PORT_MAPPING_ENTRY, &args).await;
            match mapping::enumeration_step(index, result, &address) {
                Step::Entry(mapping) => mappings.push(mapping),
                Step::Skip => (),
                Step::End => break,
            }
            index += 1;
        }
        Ok(filter.apply(mappings))
    }

    /// Get the external IP address of the gateway.
    pub async fn external_ip(&self) -> Result<IpAddr, Error> {
        let Session { gateway, .. } = self.find_gateway().await?;
        let response = gateway.run(messages::GET_EXTERNAL_IP_ADDRESS, &[]).await?;
        parsing::parse_external_ip_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use async_trait::async_trait;
    use futures::Stream;
    use regex::Regex;
    use url::Url;

    use super::*;
    use crate::client::tests::{announcement, Router, LOCAL_ADDRESS};
    use crate::common::response::Argument;
    use crate::errors::RequestError;
    use crate::search::Announcement;

    #[derive(Clone, Debug)]
    struct FakeGateway(Arc<Mutex<Router>>);

    #[async_trait]
    impl ControlPoint for FakeGateway {
        async fn run(&self, action: &str, args: &[Argument]) -> Result<ActionResponse, RequestError> {
            self.0.lock().unwrap().handle(action, args)
        }
    }

    struct FakeSubscription {
        pending: Option<Announcement>,
        ended: bool,
    }

    impl Stream for FakeSubscription {
        type Item = Result<Announcement, SearchError>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Option<Self::Item>> {
            let this = self.get_mut();
            if this.ended {
                return Poll::Ready(None);
            }
            match this.pending.take() {
                Some(announcement) => Poll::Ready(Some(Ok(announcement))),
                None => Poll::Pending,
            }
        }
    }

    impl Subscription for FakeSubscription {
        fn end(&mut self) {
            self.ended = true;
        }
    }

    struct FakeDiscovery {
        router: Arc<Mutex<Router>>,
        silent: bool,
    }

    #[async_trait]
    impl Discovery for FakeDiscovery {
        type Subscription = FakeSubscription;
        type Device = FakeGateway;

        async fn search(&self, _search_target: &str) -> Result<FakeSubscription, SearchError> {
            Ok(FakeSubscription {
                pending: if self.silent { None } else { Some(announcement()) },
                ended: false,
            })
        }

        async fn connect(&self, _location: &Url) -> Result<FakeGateway, SearchError> {
            Ok(FakeGateway(Arc::clone(&self.router)))
        }
    }

    fn client(router: Router) -> Client<FakeDiscovery> {
        let discovery = FakeDiscovery {
            router: Arc::new(Mutex::new(router)),
            silent: false,
        };
        Client::with_discovery(discovery, Some(Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_find_gateway_times_out() {
        let discovery = FakeDiscovery {
            router: Arc::new(Mutex::new(Router::default())),
            silent: true,
        };
        let client = Client::with_discovery(discovery, Some(Duration::from_millis(50)));
        let started = Instant::now();
        match client.find_gateway().await {
            Err(Error::DiscoveryTimeout) => (),
            other => panic!("unexpected {:?}", other.map(|s| s.address)),
        }
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_find_gateway_with_huge_timeout() {
        let mut client = client(Router::default());
        client.set_timeout(Some(Duration::MAX));
        let session = client.find_gateway().await.unwrap();
        assert_eq!(session.address.to_string(), LOCAL_ADDRESS);
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let client = client(Router::default());
        client
            .add_port_mapping(
                &PortMappingOptions::new(40000u16, 4000u16)
                    .description("node:nat:upnp:search-test")
                    .ttl(0u32),
            )
            .await
            .unwrap();

        let filter = MappingFilter::all()
            .local()
            .description(Regex::new("search-test").unwrap());
        let list = client.port_mappings(&filter).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].private.host, LOCAL_ADDRESS);
        assert!(list[0].enabled);

        client
            .remove_port_mapping(&PortMappingOptions::from(&list[0]))
            .await
            .unwrap();
        assert!(client.port_mappings(&MappingFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_indexed_table() {
        let client = client(Router {
            one_indexed: true,
            ..Router::default()
        });
        client
            .add_port_mapping(&PortMappingOptions::new(5000u16, 5000u16))
            .await
            .unwrap();
        let list = client.port_mappings(&MappingFilter::all()).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].public.port, 5000);
    }

    #[tokio::test]
    async fn test_external_ip() {
        let client = client(Router::default());
        let ip = client.external_ip().await.unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }
}
