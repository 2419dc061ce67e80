use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;

/// Default lease duration of a new mapping, in seconds.
pub const DEFAULT_TTL: u32 = 60 * 30;

/// Description used when the caller did not provide one.
pub const DEFAULT_DESCRIPTION: &str = "node:nat:upnp";

/// Default timeout for a gateway search.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Gateway search configuration
#[derive(Clone, Debug)]
pub struct SearchOptions {
    /// Bind address for the discovery socket
    pub bind_addr: SocketAddr,
    /// Broadcast address for discovery packets
    pub broadcast_address: SocketAddr,
    /// How long to wait for a gateway to answer, `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 0),
            broadcast_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 1900),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

/// Represents the protocols available for port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortMappingProtocol {
    /// TCP protocol
    TCP,
    /// UDP protocol
    UDP,
}

impl fmt::Display for PortMappingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                PortMappingProtocol::TCP => "TCP",
                PortMappingProtocol::UDP => "UDP",
            }
        )
    }
}

impl FromStr for PortMappingProtocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tcp") {
            Ok(PortMappingProtocol::TCP)
        } else if s.eq_ignore_ascii_case("udp") {
            Ok(PortMappingProtocol::UDP)
        } else {
            Err(())
        }
    }
}

/// Canonical description of one side of a mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Host name or address
    pub host: Option<String>,
    /// Port number
    pub port: Option<u16>,
}

/// One side of a mapping as supplied by a caller.
///
/// Every shape is accepted; [`normalize`] turns it into an [`EndpointSpec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// A bare port number.
    Port(u16),
    /// Text, meaningful only when it is a port number.
    Text(String),
    /// Host and/or port given explicitly.
    Spec(EndpointSpec),
    /// Nothing was given.
    Unspecified,
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unspecified
    }
}

impl Endpoint {
    /// Resolve this input into its canonical form.
    pub fn to_spec(&self) -> EndpointSpec {
        match *self {
            Endpoint::Port(port) => EndpointSpec {
                host: None,
                port: Some(port),
            },
            Endpoint::Text(ref text) => match text.trim().parse::<u16>() {
                Ok(port) => EndpointSpec {
                    host: None,
                    port: Some(port),
                },
                Err(..) => EndpointSpec::default(),
            },
            Endpoint::Spec(ref spec) => spec.clone(),
            Endpoint::Unspecified => EndpointSpec::default(),
        }
    }
}

impl From<u16> for Endpoint {
    fn from(port: u16) -> Endpoint {
        Endpoint::Port(port)
    }
}

impl From<&str> for Endpoint {
    fn from(text: &str) -> Endpoint {
        Endpoint::Text(text.to_string())
    }
}

impl From<String> for Endpoint {
    fn from(text: String) -> Endpoint {
        Endpoint::Text(text)
    }
}

impl From<EndpointSpec> for Endpoint {
    fn from(spec: EndpointSpec) -> Endpoint {
        Endpoint::Spec(spec)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Endpoint {
        Endpoint::Spec(EndpointSpec {
            host: Some(addr.ip().to_string()),
            port: Some(addr.port()),
        })
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Endpoint {
        Endpoint::from(SocketAddr::V4(addr))
    }
}

impl<T: Into<Endpoint>> From<Option<T>> for Endpoint {
    fn from(value: Option<T>) -> Endpoint {
        value.map(Into::into).unwrap_or(Endpoint::Unspecified)
    }
}

/// Both sides of a mapping in canonical form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedEndpoints {
    /// The public side, on the gateway
    pub remote: EndpointSpec,
    /// The private side, on the local network
    pub internal: EndpointSpec,
}

/// Turn caller supplied endpoints into canonical specs.
///
/// Never fails: shapes that carry no usable information become empty specs.
pub fn normalize(public: &Endpoint, private: &Endpoint) -> NormalizedEndpoints {
    NormalizedEndpoints {
        remote: public.to_spec(),
        internal: private.to_spec(),
    }
}

/// Lease duration as supplied by a caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lease {
    /// A number of seconds.
    Seconds(u32),
    /// Text, meaningful only when it is a number of seconds.
    Text(String),
}

impl From<u32> for Lease {
    fn from(seconds: u32) -> Lease {
        Lease::Seconds(seconds)
    }
}

impl From<Duration> for Lease {
    fn from(duration: Duration) -> Lease {
        Lease::Seconds(duration.as_secs().min(u64::from(u32::MAX)) as u32)
    }
}

impl From<&str> for Lease {
    fn from(text: &str) -> Lease {
        Lease::Text(text.to_string())
    }
}

/// The lease duration to request, falling back to [`DEFAULT_TTL`].
pub fn resolve_ttl(ttl: Option<&Lease>) -> u32 {
    match ttl {
        Some(Lease::Seconds(seconds)) => *seconds,
        Some(Lease::Text(text)) => parse_seconds(text).unwrap_or(DEFAULT_TTL),
        None => DEFAULT_TTL,
    }
}

// Fractional seconds are truncated, the wire format only takes whole ones.
fn parse_seconds(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<u32>() {
        return Some(seconds);
    }
    match text.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => Some(seconds.min(f64::from(u32::MAX)) as u32),
        _ => None,
    }
}

/// Parameters of an add or remove mapping request.
///
/// Removal only reads `public` and `protocol`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortMappingOptions {
    /// The public side of the mapping
    pub public: Endpoint,
    /// The private side, the host defaults to our own address
    pub private: Endpoint,
    /// Defaults to TCP
    pub protocol: Option<PortMappingProtocol>,
    /// Defaults to [`DEFAULT_DESCRIPTION`]
    pub description: Option<String>,
    /// Defaults to [`DEFAULT_TTL`]
    pub ttl: Option<Lease>,
}

impl PortMappingOptions {
    /// Map `public` on the gateway to `private` on the local network.
    pub fn new<P, L>(public: P, private: L) -> PortMappingOptions
    where
        P: Into<Endpoint>,
        L: Into<Endpoint>,
    {
        PortMappingOptions {
            public: public.into(),
            private: private.into(),
            ..Default::default()
        }
    }

    /// Set the protocol.
    pub fn protocol(mut self, protocol: PortMappingProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Set the description.
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the lease duration.
    pub fn ttl<T: Into<Lease>>(mut self, ttl: T) -> Self {
        self.ttl = Some(ttl.into());
        self
    }

    pub(crate) fn protocol_or_default(&self) -> PortMappingProtocol {
        self.protocol.unwrap_or(PortMappingProtocol::TCP)
    }

    pub(crate) fn description_or_default(&self) -> &str {
        match self.description {
            Some(ref description) if !description.is_empty() => description,
            _ => DEFAULT_DESCRIPTION,
        }
    }
}

#[test]
fn test_normalize_port() {
    let ports = normalize(&Endpoint::from(80u16), &Endpoint::Unspecified);
    assert_eq!(ports.remote.port, Some(80));
    assert_eq!(ports.remote.host, None);
    assert_eq!(ports.internal, EndpointSpec::default());
}

#[test]
fn test_normalize_numeric_text() {
    let ports = normalize(&Endpoint::from("80"), &Endpoint::from("8080"));
    assert_eq!(ports.remote, EndpointSpec { host: None, port: Some(80) });
    assert_eq!(ports.internal, EndpointSpec { host: None, port: Some(8080) });
}

#[test]
fn test_normalize_spec_is_kept() {
    let spec = EndpointSpec {
        host: Some("10.0.0.2".into()),
        port: None,
    };
    let ports = normalize(&Endpoint::Unspecified, &Endpoint::from(spec.clone()));
    assert_eq!(ports.internal, spec);
}

#[test]
fn test_normalize_garbage_is_empty() {
    let ports = normalize(&Endpoint::from("http"), &Endpoint::from("99999"));
    assert_eq!(ports.remote, EndpointSpec::default());
    assert_eq!(ports.internal, EndpointSpec::default());
    assert_eq!(Endpoint::from(None::<u16>), Endpoint::Unspecified);
}

#[test]
fn test_resolve_ttl() {
    assert_eq!(resolve_ttl(None), 1800);
    assert_eq!(resolve_ttl(Some(&Lease::Seconds(0))), 0);
    assert_eq!(resolve_ttl(Some(&Lease::from("120"))), 120);
    assert_eq!(resolve_ttl(Some(&Lease::from("two minutes"))), 1800);
    assert_eq!(resolve_ttl(Some(&Lease::from("1.5"))), 1);
    assert_eq!(resolve_ttl(Some(&Lease::from("-3"))), 1800);
    assert_eq!(resolve_ttl(Some(&Lease::from("NaN"))), 1800);
}

#[test]
fn test_protocol_parse() {
    assert_eq!("tcp".parse(), Ok(PortMappingProtocol::TCP));
    assert_eq!("UDP".parse(), Ok(PortMappingProtocol::UDP));
    assert!("sctp".parse::<PortMappingProtocol>().is_err());
    assert_eq!(PortMappingProtocol::UDP.to_string(), "UDP");
}
