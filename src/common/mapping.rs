use std::convert::TryFrom;
use std::net::IpAddr;

use regex::Regex;

use crate::common::options::{resolve_ttl, Endpoint, EndpointSpec, NormalizedEndpoints, PortMappingOptions};
use crate::common::response::{ActionResponse, Argument, FieldValue, Fields};
use crate::errors::RequestError;

/// Host and port of one side of an existing mapping.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MappingEndpoint {
    /// Host name or address, empty when the gateway gave none
    pub host: String,
    /// Port number
    pub port: u16,
}

/// One entry of the gateway's port mapping table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortMapping {
    /// The side facing the internet
    pub public: MappingEndpoint,
    /// The side on the local network
    pub private: MappingEndpoint,
    /// Lower-cased protocol name, `tcp` or `udp` on well behaved gateways
    pub protocol: String,
    /// Whether the gateway reported the mapping as enabled
    pub enabled: bool,
    /// The description, `None` when the gateway reported a non-text value
    pub description: Option<String>,
    /// Remaining lease duration in seconds
    pub ttl: u32,
    /// Whether the mapping forwards to the address we reached the gateway from
    pub local: bool,
}

impl PortMapping {
    /// Build an entry from the output arguments of `GetGenericPortMappingEntry`.
    ///
    /// `address` is the local address of the current session.
    pub fn from_fields(fields: &Fields, address: &str) -> Result<PortMapping, String> {
        let private_host = match fields.get("NewInternalClient") {
            Some(value) => value.to_string(),
            None => String::new(),
        };
        let mapping = PortMapping {
            public: MappingEndpoint {
                host: fields
                    .get("NewRemoteHost")
                    .and_then(FieldValue::as_text)
                    .unwrap_or("")
                    .to_string(),
                port: number_field(fields, "NewExternalPort")?,
            },
            private: MappingEndpoint {
                port: number_field(fields, "NewInternalPort")?,
                host: private_host,
            },
            protocol: match fields.get("NewProtocol") {
                Some(value) => value.to_string().to_lowercase(),
                None => return Err("NewProtocol is missing".into()),
            },
            enabled: matches!(fields.get("NewEnabled"), Some(FieldValue::Integer(1, _))),
            description: fields
                .get("NewPortMappingDescription")
                .and_then(FieldValue::as_text)
                .map(str::to_string),
            ttl: number_field(fields, "NewLeaseDuration")?,
            local: false,
        };
        Ok(PortMapping {
            local: mapping.private.host == address,
            ..mapping
        })
    }
}

fn number_field<T: TryFrom<i64>>(fields: &Fields, name: &str) -> Result<T, String> {
    let value = fields.get(name).ok_or_else(|| format!("{} is missing", name))?;
    value
        .as_integer()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| format!("{} is invalid: {:?}", name, value))
}

impl From<&PortMapping> for PortMappingOptions {
    fn from(mapping: &PortMapping) -> PortMappingOptions {
        let host = if mapping.public.host.is_empty() {
            None
        } else {
            Some(mapping.public.host.clone())
        };
        PortMappingOptions {
            public: Endpoint::Spec(EndpointSpec {
                host,
                port: Some(mapping.public.port),
            }),
            private: Endpoint::Spec(EndpointSpec {
                host: Some(mapping.private.host.clone()),
                port: Some(mapping.private.port),
            }),
            protocol: mapping.protocol.parse().ok(),
            description: mapping.description.clone(),
            ttl: Some(mapping.ttl.into()),
        }
    }
}

/// How to match the description of a mapping.
#[derive(Clone, Debug)]
pub enum DescriptionFilter {
    /// The description contains this text.
    Contains(String),
    /// The description matches this pattern.
    Matches(Regex),
}

impl DescriptionFilter {
    fn is_active(&self) -> bool {
        match *self {
            DescriptionFilter::Contains(ref text) => !text.is_empty(),
            DescriptionFilter::Matches(..) => true,
        }
    }

    fn accepts(&self, description: &str) -> bool {
        match *self {
            DescriptionFilter::Contains(ref text) => description.contains(text.as_str()),
            DescriptionFilter::Matches(ref pattern) => pattern.is_match(description),
        }
    }
}

impl From<&str> for DescriptionFilter {
    fn from(text: &str) -> DescriptionFilter {
        DescriptionFilter::Contains(text.to_string())
    }
}

impl From<Regex> for DescriptionFilter {
    fn from(pattern: Regex) -> DescriptionFilter {
        DescriptionFilter::Matches(pattern)
    }
}

/// Which mappings to keep when listing.
#[derive(Clone, Debug, Default)]
pub struct MappingFilter {
    /// Only mappings that forward to this host
    pub local: bool,
    /// Only mappings with a matching text description
    pub description: Option<DescriptionFilter>,
}

impl MappingFilter {
    /// Keep every mapping.
    pub fn all() -> MappingFilter {
        MappingFilter::default()
    }

    /// Keep only mappings that forward to this host.
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Keep only mappings whose description matches.
    pub fn description<D: Into<DescriptionFilter>>(mut self, description: D) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Keep the mappings that pass this filter, in order.
    pub fn apply(&self, mut mappings: Vec<PortMapping>) -> Vec<PortMapping> {
        if self.local {
            mappings.retain(|mapping| mapping.local);
        }
        if let Some(ref filter) = self.description {
            if filter.is_active() {
                mappings.retain(|mapping| match mapping.description {
                    Some(ref description) => filter.accepts(description),
                    None => false,
                });
            }
        }
        mappings
    }
}

/// What to do after querying one index of the mapping table.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Keep this entry and query the next index.
    Entry(PortMapping),
    /// Nothing usable at this index, query the next one.
    Skip,
    /// The table has ended.
    End,
}

/// Decide how the answer for `index` affects enumeration.
///
/// A failure at index 0 is tolerated because some gateways number their
/// table from 1. Any later failure, or an answer without the response
/// element, ends the table.
pub fn enumeration_step(index: u32, result: Result<ActionResponse, RequestError>, address: &str) -> Step {
    let response = match result {
        Ok(response) => response,
        Err(err) if index == 0 => {
            debug!("ignoring error at mapping index 0: {}", err);
            return Step::Skip;
        }
        Err(err) => {
            debug!("mapping table ended at index {}: {}", index, err);
            return Step::End;
        }
    };
    let fields = match response.fields() {
        Some(fields) => fields,
        None => {
            debug!("mapping table ended at index {}: no response element", index);
            return Step::End;
        }
    };
    match PortMapping::from_fields(fields, address) {
        Ok(mapping) => Step::Entry(mapping),
        Err(reason) => {
            warn!("skipping malformed mapping at index {}: {}", index, reason);
            Step::Skip
        }
    }
}

/// Arguments of `GetGenericPortMappingEntry` for `index`.
pub fn entry_arguments(index: u32) -> Vec<Argument> {
    vec![("NewPortMappingIndex", index.to_string())]
}

fn render<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// Arguments of `AddPortMapping`, the internal host defaulting to `address`.
pub fn add_arguments(options: &PortMappingOptions, ports: &NormalizedEndpoints, address: IpAddr) -> Vec<Argument> {
    let internal_host = match ports.internal.host {
        Some(ref host) if !host.is_empty() => host.clone(),
        _ => address.to_string(),
    };
    vec![
        ("NewRemoteHost", render(&ports.remote.host)),
        ("NewExternalPort", render(&ports.remote.port)),
        ("NewProtocol", options.protocol_or_default().to_string()),
        ("NewInternalPort", render(&ports.internal.port)),
        ("NewInternalClient", internal_host),
        ("NewEnabled", "1".to_string()),
        ("NewPortMappingDescription", options.description_or_default().to_string()),
        ("NewLeaseDuration", resolve_ttl(options.ttl.as_ref()).to_string()),
    ]
}

/// Arguments of `DeletePortMapping`.
pub fn delete_arguments(options: &PortMappingOptions, ports: &NormalizedEndpoints) -> Vec<Argument> {
    vec![
        ("NewRemoteHost", render(&ports.remote.host)),
        ("NewExternalPort", render(&ports.remote.port)),
        ("NewProtocol", options.protocol_or_default().to_string()),
    ]
}

#[cfg(test)]
fn entry_fields(description: FieldValue, enabled: FieldValue) -> Fields {
    let mut fields = Fields::new();
    fields.insert("NewRemoteHost".into(), FieldValue::from(""));
    fields.insert("NewExternalPort".into(), FieldValue::from(8080i64));
    fields.insert("NewProtocol".into(), FieldValue::from("TCP"));
    fields.insert("NewInternalPort".into(), FieldValue::from("80"));
    fields.insert("NewInternalClient".into(), FieldValue::from("192.168.1.20"));
    fields.insert("NewEnabled".into(), enabled);
    fields.insert("NewPortMappingDescription".into(), description);
    fields.insert("NewLeaseDuration".into(), FieldValue::from(0i64));
    fields
}

#[test]
fn test_mapping_from_fields() {
    let fields = entry_fields(FieldValue::from("web"), FieldValue::from(1i64));
    let mapping = PortMapping::from_fields(&fields, "192.168.1.20").unwrap();
    assert_eq!(mapping.public, MappingEndpoint { host: "".into(), port: 8080 });
    assert_eq!(mapping.private, MappingEndpoint { host: "192.168.1.20".into(), port: 80 });
    assert_eq!(mapping.protocol, "tcp");
    assert!(mapping.enabled);
    assert_eq!(mapping.description.as_deref(), Some("web"));
    assert_eq!(mapping.ttl, 0);
    assert!(mapping.local);

    let other = PortMapping::from_fields(&fields, "192.168.1.21").unwrap();
    assert!(!other.local);
}

#[test]
fn test_enabled_only_for_integer_one() {
    let fields = entry_fields(FieldValue::from("web"), FieldValue::from("1"));
    assert!(!PortMapping::from_fields(&fields, "").unwrap().enabled);
    let fields = entry_fields(FieldValue::from("web"), FieldValue::from(0i64));
    assert!(!PortMapping::from_fields(&fields, "").unwrap().enabled);
}

#[test]
fn test_non_text_description_and_host() {
    let mut fields = entry_fields(FieldValue::from(42i64), FieldValue::from(1i64));
    fields.insert("NewRemoteHost".into(), FieldValue::from(5i64));
    let mapping = PortMapping::from_fields(&fields, "").unwrap();
    assert_eq!(mapping.description, None);
    assert_eq!(mapping.public.host, "");
}

#[test]
fn test_numeric_description_is_text() {
    let text = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
<s:Body>
<u:GetGenericPortMappingEntryResponse xmlns:u="urn:schemas-upnp-org:service:WANIPConnection:1">
<NewRemoteHost></NewRemoteHost>
<NewExternalPort>8080</NewExternalPort>
<NewProtocol>UDP</NewProtocol>
<NewInternalPort>080</NewInternalPort>
<NewInternalClient>192.168.1.20</NewInternalClient>
<NewEnabled>1</NewEnabled>
<NewPortMappingDescription>2024</NewPortMappingDescription>
<NewLeaseDuration>0</NewLeaseDuration>
</u:GetGenericPortMappingEntryResponse>
</s:Body>
</s:Envelope>"#;
    let response =
        crate::common::parsing::parse_response(text.to_string(), "GetGenericPortMappingEntry").unwrap();
    let step = enumeration_step(0, Ok(response), "192.168.1.20");
    let mapping = match step {
        Step::Entry(mapping) => mapping,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(mapping.description.as_deref(), Some("2024"));
    assert_eq!(mapping.private.port, 80);
    assert!(mapping.enabled);
    assert_eq!(mapping.protocol, "udp");

    let kept = MappingFilter::all().description("2024").apply(vec![mapping]);
    assert_eq!(kept.len(), 1);
}

#[test]
fn test_invalid_numbers_are_rejected() {
    let mut fields = entry_fields(FieldValue::from("web"), FieldValue::from(1i64));
    fields.insert("NewExternalPort".into(), FieldValue::from(70000i64));
    assert!(PortMapping::from_fields(&fields, "").is_err());

    let mut fields = entry_fields(FieldValue::from("web"), FieldValue::from(1i64));
    fields.insert("NewLeaseDuration".into(), FieldValue::from(-1i64));
    assert!(PortMapping::from_fields(&fields, "").is_err());

    let mut fields = entry_fields(FieldValue::from("web"), FieldValue::from(1i64));
    fields.remove("NewInternalPort");
    assert!(PortMapping::from_fields(&fields, "").is_err());
}

#[test]
fn test_filter() {
    let fields = entry_fields(FieldValue::from("node:nat:upnp:search-test"), FieldValue::from(1i64));
    let local = PortMapping::from_fields(&fields, "192.168.1.20").unwrap();
    let remote = PortMapping {
        local: false,
        description: Some("other".into()),
        ..local.clone()
    };
    let opaque = PortMapping {
        description: None,
        ..local.clone()
    };
    let all = vec![local.clone(), remote.clone(), opaque.clone()];

    assert_eq!(MappingFilter::all().apply(all.clone()).len(), 3);
    assert_eq!(MappingFilter::all().local().apply(all.clone()), vec![local.clone(), opaque.clone()]);
    assert_eq!(
        MappingFilter::all().description("search-test").apply(all.clone()),
        vec![local.clone()]
    );
    let pattern = Regex::new("^oth").unwrap();
    assert_eq!(MappingFilter::all().description(pattern).apply(all.clone()), vec![remote]);
    assert_eq!(MappingFilter::all().description("").apply(all.clone()).len(), 3);
}

#[test]
fn test_enumeration_step() {
    let error = || Err(RequestError::ErrorCode(713, "SpecifiedArrayIndexInvalid".into()));
    assert_eq!(enumeration_step(0, error(), ""), Step::Skip);
    assert_eq!(enumeration_step(1, error(), ""), Step::End);
    assert_eq!(
        enumeration_step(0, Ok(ActionResponse::missing("GetGenericPortMappingEntry")), ""),
        Step::End
    );

    let fields = entry_fields(FieldValue::from("web"), FieldValue::from(1i64));
    match enumeration_step(3, Ok(ActionResponse::new("GetGenericPortMappingEntry", fields)), "") {
        Step::Entry(mapping) => assert_eq!(mapping.public.port, 8080),
        other => panic!("unexpected {:?}", other),
    }

    let mut fields = entry_fields(FieldValue::from("web"), FieldValue::from(1i64));
    fields.remove("NewProtocol");
    assert_eq!(
        enumeration_step(3, Ok(ActionResponse::new("GetGenericPortMappingEntry", fields)), ""),
        Step::Skip
    );
}

#[test]
fn test_add_arguments_defaults() {
    let options = PortMappingOptions::new(8080u16, 80u16);
    let ports = crate::common::options::normalize(&options.public, &options.private);
    let args = add_arguments(&options, &ports, "192.168.1.20".parse().unwrap());
    let names: Vec<&str> = args.iter().map(|(name, _)| *name).collect();
    assert_eq!(
        names,
        vec![
            "NewRemoteHost",
            "NewExternalPort",
            "NewProtocol",
            "NewInternalPort",
            "NewInternalClient",
            "NewEnabled",
            "NewPortMappingDescription",
            "NewLeaseDuration",
        ]
    );
    let values: Vec<&str> = args.iter().map(|(_, value)| value.as_str()).collect();
    assert_eq!(
        values,
        vec!["", "8080", "TCP", "80", "192.168.1.20", "1", "node:nat:upnp", "1800"]
    );
}

#[test]
fn test_remove_options_from_mapping() {
    let fields = entry_fields(FieldValue::from("web"), FieldValue::from(1i64));
    let mapping = PortMapping::from_fields(&fields, "").unwrap();
    let options = PortMappingOptions::from(&mapping);
    let ports = crate::common::options::normalize(&options.public, &options.private);
    let args = delete_arguments(&options, &ports);
    assert_eq!(
        args,
        vec![
            ("NewRemoteHost", String::new()),
            ("NewExternalPort", "8080".to_string()),
            ("NewProtocol", "TCP".to_string()),
        ]
    );
}
