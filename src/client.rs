use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::common::mapping::{self, MappingFilter, PortMapping, Step};
use crate::common::messages;
use crate::common::options::{normalize, Endpoint, PortMappingOptions};
use crate::common::parsing;
use crate::common::response::ActionResponse;
use crate::common::SearchOptions;
use crate::errors::{Error, SearchError};
use crate::gateway::ControlPoint;
use crate::search::{Discovery, Ssdp, Subscription};

/// A gateway found for one operation, and the local address that reaches it.
#[derive(Clone, Debug, PartialEq)]
pub struct Session<G> {
    /// Handle to the gateway
    pub gateway: G,
    /// Local interface address the gateway answered on
    pub address: IpAddr,
}

/// Blocking UPnP IGD client.
///
/// Every operation searches for the gateway again; nothing is cached between calls.
#[derive(Debug)]
pub struct Client<D = Ssdp> {
    discovery: D,
    timeout: Option<Duration>,
}

impl Client<Ssdp> {
    /// Bind a discovery socket with the default options.
    pub fn new() -> Result<Client<Ssdp>, SearchError> {
        Client::with_options(SearchOptions::default())
    }

    /// Bind a discovery socket with the given options.
    pub fn with_options(options: SearchOptions) -> Result<Client<Ssdp>, SearchError> {
        let ssdp = Ssdp::new(&options)?;
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
    pub fn find_gateway(&self) -> Result<Session<D::Device>, Error> {
        let mut subscription = self.discovery.search(messages::IGD_SEARCH_TARGET)?;
        // A timeout too large to represent waits forever.
        let deadline = self.timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let outcome = subscription.next_before(deadline);
        subscription.end();

        let announcement = match outcome? {
            Some(announcement) => announcement,
            None => {
                debug!("no gateway answered within {:?}", self.timeout);
                return Err(Error::DiscoveryTimeout);
            }
        };
        debug!(
            "gateway announced at {} (local address {})",
            announcement.location, announcement.address
        );
        let gateway = self.discovery.connect(&announcement.location)?;
        Ok(Session {
            gateway,
            address: announcement.address,
        })
    }

    /// Ask the gateway to forward `options.public` to `options.private`.
    ///
    /// The private host defaults to the local address that reaches the gateway.
    pub fn add_port_mapping(&self, options: &PortMappingOptions) -> Result<ActionResponse, Error> {
        let Session { gateway, address } = self.find_gateway()?;
        let ports = normalize(&options.public, &options.private);
        let args = mapping::add_arguments(options, &ports, address);
        Ok(gateway.run(messages::ADD_PORT_MAPPING, &args)?)
    }

    /// Remove the mapping of `options.public` for `options.protocol`.
    pub fn remove_port_mapping(&self, options: &PortMappingOptions) -> Result<ActionResponse, Error> {
        let Session { gateway, .. } = self.find_gateway()?;
        let ports = normalize(&options.public, &Endpoint::Unspecified);
        let args = mapping::delete_arguments(options, &ports);
        Ok(gateway.run(messages::DELETE_PORT_MAPPING, &args)?)
    }

    /// List the gateway's port mappings that pass `filter`.
    pub fn port_mappings(&self, filter: &MappingFilter) -> Result<Vec<PortMapping>, Error> {
        let Session { gateway, address } = self.find_gateway()?;
        let address = address.to_string();
        let mut mappings = Vec::new();
        let mut index = 0;
        loop {
            let result = gateway.run(messages::GET_GENERIC_PORT_MAPPING_ENTRY, &mapping::entry_arguments(index));
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
    pub fn external_ip(&self) -> Result<IpAddr, Error> {
        let Session { gateway, .. } = self.find_gateway()?;
        let response = gateway.run(messages::GET_EXTERNAL_IP_ADDRESS, &[])?;
        parsing::parse_external_ip_response(&response)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use rand::Rng;
    use regex::Regex;
    use url::Url;

    use super::*;
    use crate::common::response::{Argument, FieldValue, Fields};
    use crate::errors::RequestError;
    use crate::search::Announcement;

    pub const LOCAL_ADDRESS: &str = "192.168.1.20";

    /// An in-memory gateway with a port mapping table.
    #[derive(Debug, Default)]
    pub struct Router {
        pub table: Vec<Fields>,
        /// The table is numbered from 1, index 0 is a fault.
        pub one_indexed: bool,
        /// Answer without a response element from this index on.
        pub empty_from: Option<u32>,
        pub calls: Vec<(String, Vec<Argument>)>,
    }

    fn arg<'a>(args: &'a [Argument], name: &str) -> &'a str {
        args.iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    impl Router {
        pub fn handle(&mut self, action: &str, args: &[Argument]) -> Result<ActionResponse, RequestError> {
            self.calls.push((action.to_string(), args.to_vec()));
            match action {
                "AddPortMapping" => {
                    let mut fields = Fields::new();
                    for (name, value) in args {
                        fields.insert(name.to_string(), FieldValue::from_text(value));
                    }
                    self.table.push(fields);
                    Ok(ActionResponse::new(action, Fields::new()))
                }
                "DeletePortMapping" => {
                    let port = FieldValue::from_text(arg(args, "NewExternalPort"));
                    let protocol = FieldValue::from_text(arg(args, "NewProtocol"));
                    let before = self.table.len();
                    self.table.retain(|entry| {
                        entry.get("NewExternalPort") != Some(&port) || entry.get("NewProtocol") != Some(&protocol)
                    });
                    if self.table.len() == before {
                        return Err(RequestError::ErrorCode(714, "NoSuchEntryInArray".into()));
                    }
                    Ok(ActionResponse::new(action, Fields::new()))
                }
                "GetGenericPortMappingEntry" => {
                    let index: u32 = arg(args, "NewPortMappingIndex").parse().unwrap();
                    if self.empty_from.map_or(false, |from| index >= from) {
                        return Ok(ActionResponse::missing(action));
                    }
                    let position = if self.one_indexed {
                        if index == 0 {
                            return Err(RequestError::ErrorCode(713, "SpecifiedArrayIndexInvalid".into()));
                        }
                        index as usize - 1
                    } else {
                        index as usize
                    };
                    match self.table.get(position) {
                        Some(entry) => Ok(ActionResponse::new(action, entry.clone())),
                        None => Err(RequestError::ErrorCode(713, "SpecifiedArrayIndexInvalid".into())),
                    }
                }
                "GetExternalIPAddress" => {
                    let mut fields = Fields::new();
                    fields.insert("NewExternalIPAddress".into(), FieldValue::from("203.0.113.7"));
                    Ok(ActionResponse::new(action, fields))
                }
                _ => Err(RequestError::ErrorCode(401, "Invalid Action".into())),
            }
        }
    }

    #[derive(Clone, Debug)]
    pub struct FakeGateway(pub Arc<Mutex<Router>>);

    impl ControlPoint for FakeGateway {
        fn run(&self, action: &str, args: &[Argument]) -> Result<ActionResponse, RequestError> {
            self.0.lock().unwrap().handle(action, args)
        }
    }

    #[derive(Debug)]
    pub struct FakeDiscovery {
        pub router: Arc<Mutex<Router>>,
        /// Never announce anything.
        pub silent: bool,
        pub searches: Arc<Mutex<u32>>,
    }

    impl FakeDiscovery {
        pub fn new(router: Router) -> FakeDiscovery {
            FakeDiscovery {
                router: Arc::new(Mutex::new(router)),
                silent: false,
                searches: Arc::new(Mutex::new(0)),
            }
        }

        pub fn silent() -> FakeDiscovery {
            FakeDiscovery {
                silent: true,
                ..FakeDiscovery::new(Router::default())
            }
        }
    }

    pub fn announcement() -> Announcement {
        Announcement {
            location: Url::parse("http://192.168.1.1:5000/rootDesc.xml").unwrap(),
            address: LOCAL_ADDRESS.parse().unwrap(),
        }
    }

    pub struct FakeSubscription {
        pending: Option<Announcement>,
        ended: bool,
    }

    impl Subscription for FakeSubscription {
        fn next_before(&mut self, deadline: Option<Instant>) -> Result<Option<Announcement>, SearchError> {
            if self.ended {
                return Ok(None);
            }
            if let Some(announcement) = self.pending.take() {
                return Ok(Some(announcement));
            }
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
            }
            Ok(None)
        }

        fn end(&mut self) {
            self.ended = true;
        }
    }

    impl Discovery for FakeDiscovery {
        type Subscription = FakeSubscription;
        type Device = FakeGateway;

        fn search(&self, search_target: &str) -> Result<FakeSubscription, SearchError> {
            assert_eq!(search_target, messages::IGD_SEARCH_TARGET);
            *self.searches.lock().unwrap() += 1;
            Ok(FakeSubscription {
                pending: if self.silent { None } else { Some(announcement()) },
                ended: false,
            })
        }

        fn connect(&self, location: &Url) -> Result<FakeGateway, SearchError> {
            assert_eq!(location, &announcement().location);
            Ok(FakeGateway(Arc::clone(&self.router)))
        }
    }

    fn client(router: Router) -> Client<FakeDiscovery> {
        Client::with_discovery(FakeDiscovery::new(router), Some(Duration::from_secs(1)))
    }

    fn random_port() -> u16 {
        rand::thread_rng().gen_range(1024..65535)
    }

    #[test]
    fn test_find_gateway_times_out() {
        let client = Client::with_discovery(FakeDiscovery::silent(), Some(Duration::from_millis(50)));
        let started = Instant::now();
        match client.find_gateway() {
            Err(Error::DiscoveryTimeout) => (),
            other => panic!("unexpected {:?}", other.map(|s| s.address)),
        }
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_find_gateway_with_huge_timeout() {
        let mut client = client(Router::default());
        client.set_timeout(Some(Duration::MAX));
        let session = client.find_gateway().unwrap();
        assert_eq!(session.address.to_string(), LOCAL_ADDRESS);
    }

    #[test]
    fn test_find_gateway() {
        let client = client(Router::default());
        let session = client.find_gateway().unwrap();
        assert_eq!(session.address.to_string(), LOCAL_ADDRESS);
    }

    #[test]
    fn test_every_operation_searches_again() {
        let client = client(Router::default());
        client.external_ip().unwrap();
        client.external_ip().unwrap();
        assert_eq!(*client.discovery.searches.lock().unwrap(), 2);
    }

    #[test]
    fn test_add_then_remove() {
        let client = client(Router::default());
        let public = random_port();
        let options = PortMappingOptions::new(public, random_port()).ttl(0u32);
        client.add_port_mapping(&options).unwrap();
        client.remove_port_mapping(&PortMappingOptions::new(public, None::<u16>)).unwrap();
        assert!(client.discovery.router.lock().unwrap().table.is_empty());
    }

    #[test]
    fn test_add_sends_defaults() {
        let client = client(Router::default());
        client
            .add_port_mapping(&PortMappingOptions::new("8080", 80u16))
            .unwrap();
        let router = client.discovery.router.lock().unwrap();
        let (action, args) = &router.calls[0];
        assert_eq!(action, "AddPortMapping");
        assert_eq!(arg(args, "NewRemoteHost"), "");
        assert_eq!(arg(args, "NewExternalPort"), "8080");
        assert_eq!(arg(args, "NewProtocol"), "TCP");
        assert_eq!(arg(args, "NewInternalClient"), LOCAL_ADDRESS);
        assert_eq!(arg(args, "NewPortMappingDescription"), "node:nat:upnp");
        assert_eq!(arg(args, "NewLeaseDuration"), "1800");
    }

    #[test]
    fn test_remove_missing_mapping_fails() {
        let client = client(Router::default());
        match client.remove_port_mapping(&PortMappingOptions::new(4000u16, None::<u16>)) {
            Err(Error::RemoteActionFailed(RequestError::ErrorCode(714, _))) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_find_mapping_after_add() {
        let client = client(Router::default());
        client
            .add_port_mapping(
                &PortMappingOptions::new(random_port(), random_port())
                    .protocol(crate::PortMappingProtocol::UDP)
                    .description("node:nat:upnp:search-test")
                    .ttl(0u32),
            )
            .unwrap();
        client
            .add_port_mapping(&PortMappingOptions::new(random_port(), random_port()).description("unrelated"))
            .unwrap();

        let filter = MappingFilter::all()
            .local()
            .description(Regex::new("search-test").unwrap());
        let list = client.port_mappings(&filter).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].description.as_deref(), Some("node:nat:upnp:search-test"));
        assert_eq!(list[0].protocol, "udp");
        assert!(list[0].local);
        assert!(list[0].enabled);

        for item in &list {
            client.remove_port_mapping(&PortMappingOptions::from(item)).unwrap();
        }
        assert_eq!(client.discovery.router.lock().unwrap().table.len(), 1);
    }

    #[test]
    fn test_listing_twice_agrees() {
        let client = client(Router::default());
        for _ in 0..3 {
            client
                .add_port_mapping(&PortMappingOptions::new(random_port(), random_port()))
                .unwrap();
        }
        let pairs = |list: Vec<PortMapping>| -> HashSet<(u16, String)> {
            list.into_iter().map(|m| (m.public.port, m.protocol)).collect()
        };
        let first = client.port_mappings(&MappingFilter::all()).unwrap();
        let second = client.port_mappings(&MappingFilter::all()).unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(pairs(first), pairs(second));
    }

    #[test]
    fn test_one_indexed_table() {
        let client = client(Router {
            one_indexed: true,
            ..Router::default()
        });
        client
            .add_port_mapping(&PortMappingOptions::new(5000u16, 5000u16))
            .unwrap();
        client
            .add_port_mapping(&PortMappingOptions::new(5001u16, 5001u16))
            .unwrap();
        let list = client.port_mappings(&MappingFilter::all()).unwrap();
        let ports: Vec<u16> = list.iter().map(|m| m.public.port).collect();
        assert_eq!(ports, vec![5000, 5001]);
    }

    #[test]
    fn test_enumeration_stops_at_missing_element() {
        let client = client(Router {
            empty_from: Some(2),
            ..Router::default()
        });
        for port in 6000u16..6005 {
            client.add_port_mapping(&PortMappingOptions::new(port, port)).unwrap();
        }
        let list = client.port_mappings(&MappingFilter::all()).unwrap();
        assert_eq!(list.len(), 2);
        let router = client.discovery.router.lock().unwrap();
        let queries = router
            .calls
            .iter()
            .filter(|(action, _)| action == "GetGenericPortMappingEntry")
            .count();
        assert_eq!(queries, 3);
    }

    #[test]
    fn test_external_ip() {
        let client = client(Router::default());
        let ip = client.external_ip().unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }
}
