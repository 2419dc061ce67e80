use std::io;
use std::net::IpAddr;

use url::Url;
use xmltree::{Element, XMLNode};

use crate::common::response::{ActionResponse, FieldValue, Fields};
use crate::errors::{Error, RequestError, SearchError};

const WAN_CONNECTION_SERVICES: [&str; 2] = [
    "urn:schemas-upnp-org:service:WANIPConnection:1",
    "urn:schemas-upnp-org:service:WANPPPConnection:1",
];

/// What a device said in answer to a search.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResponse {
    /// URL of the device description
    pub location: Url,
    /// The search target the device answered for, if it said
    pub search_target: Option<String>,
}

impl SearchResponse {
    /// Whether this answers a search for `search_target`.
    pub fn matches(&self, search_target: &str) -> bool {
        match self.search_target {
            Some(ref st) => st == search_target,
            None => true,
        }
    }
}

// Parse the result.
pub fn parse_search_result(text: &str) -> Result<SearchResponse, SearchError> {
    use SearchError::InvalidResponse;

    let mut location = None;
    let mut search_target = None;
    for line in text.lines() {
        let line = line.trim();
        let colon = match line.find(':') {
            Some(colon) => colon,
            None => continue,
        };
        let name = line[..colon].trim();
        let value = line[colon + 1..].trim();
        if name.eq_ignore_ascii_case("location") {
            location = Some(Url::parse(value).map_err(|_| InvalidResponse)?);
        } else if name.eq_ignore_ascii_case("st") {
            search_target = Some(value.to_string());
        }
    }
    match location {
        Some(location) => Ok(SearchResponse {
            location,
            search_target,
        }),
        None => Err(InvalidResponse),
    }
}

/// The WAN connection service of a device.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlService {
    /// Type of the service, used to qualify action names
    pub service_type: String,
    /// Absolute URL actions are posted to
    pub control_url: Url,
}

pub fn parse_control_url<R>(location: &Url, resp: R) -> Result<ControlService, SearchError>
where
    R: io::Read,
{
    let root = Element::parse(resp)?;

    let device = root.get_child("device").ok_or(SearchError::InvalidResponse)?;
    let (service_type, control_url) = parse_control_url_scan_device(device)?;
    Ok(ControlService {
        service_type,
        control_url: location.join(&control_url)?,
    })
}

fn child_elements<'a>(element: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    element.children.iter().filter_map(move |node| match node {
        XMLNode::Element(e) if e.name == name => Some(e),
        _ => None,
    })
}

fn child_text(element: &Element, name: &str) -> Option<String> {
    element
        .get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
}

fn parse_control_url_scan_device(device: &Element) -> Result<(String, String), SearchError> {
    if let Some(service_list) = device.get_child("serviceList") {
        for service in child_elements(service_list, "service") {
            let service_type = match child_text(service, "serviceType") {
                Some(service_type) => service_type,
                None => continue,
            };
            if WAN_CONNECTION_SERVICES.contains(&service_type.as_str()) {
                if let Some(control_url) = child_text(service, "controlURL") {
                    return Ok((service_type, control_url));
                }
            }
        }
    }

    let device_list = device.get_child("deviceList").ok_or(SearchError::InvalidResponse)?;
    for sub_device in child_elements(device_list, "device") {
        if let Ok(found) = parse_control_url_scan_device(sub_device) {
            return Ok(found);
        }
    }

    Err(SearchError::InvalidResponse)
}

/// Parse the SOAP answer to `action`.
///
/// A body without the `<action>Response` element and without a fault is not an
/// error here; the caller decides what an absent element means.
pub fn parse_response(text: String, action: &str) -> Result<ActionResponse, RequestError> {
    let mut xml = match Element::parse(text.as_bytes()) {
        Ok(xml) => xml,
        Err(..) => return Err(RequestError::InvalidResponse(text)),
    };
    let body = match xml.get_mut_child("Body") {
        Some(body) => body,
        None => return Err(RequestError::InvalidResponse(text)),
    };
    let ok = format!("{}Response", action);
    if let Some(ok) = body.take_child(ok.as_str()) {
        let mut fields = Fields::new();
        for node in &ok.children {
            if let XMLNode::Element(field) = node {
                let value = field.get_text().map(|t| FieldValue::from_text(&t));
                fields.insert(field.name.clone(), value.unwrap_or_else(|| FieldValue::Text(String::new())));
            }
        }
        return Ok(ActionResponse::new(action, fields));
    }
    let upnp_error = match body
        .get_child("Fault")
        .and_then(|e| e.get_child("detail"))
        .and_then(|e| e.get_child("UPnPError"))
    {
        Some(upnp_error) => upnp_error,
        None if body.get_child("Fault").is_some() => return Err(RequestError::InvalidResponse(text)),
        None => return Ok(ActionResponse::missing(action)),
    };

    match (child_text(upnp_error, "errorCode"), child_text(upnp_error, "errorDescription")) {
        (Some(et), dt) => match et.parse::<u16>() {
            Ok(en) => Err(RequestError::ErrorCode(en, dt.unwrap_or_default())),
            Err(..) => Err(RequestError::InvalidResponse(text)),
        },
        _ => Err(RequestError::InvalidResponse(text)),
    }
}

pub fn parse_external_ip_response(response: &ActionResponse) -> Result<IpAddr, Error> {
    if !response.is_present() {
        return Err(Error::MalformedResponse(format!(
            "no {}Response element",
            response.action()
        )));
    }
    match response.get("NewExternalIPAddress") {
        Some(FieldValue::Text(text)) => text
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| Error::MalformedResponse(format!("invalid external address {:?}", text))),
        Some(other) => Err(Error::MalformedResponse(format!("invalid external address {:?}", other))),
        None => Err(Error::MalformedResponse("NewExternalIPAddress is missing".into())),
    }
}

#[test]
fn test_parse_search_result_case_insensitivity() {
    assert!(parse_search_result("location:http://0.0.0.0:0/control_url").is_ok());
    assert!(parse_search_result("LOCATION:http://0.0.0.0:0/control_url").is_ok());
}

#[test]
fn test_parse_search_result_ok() {
    let result = parse_search_result(
        "HTTP/1.1 200 OK\r\nCACHE-CONTROL: max-age=120\r\nST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\nLOCATION: http://192.168.0.1:5000/rootDesc.xml\r\n\r\n",
    )
    .unwrap();
    assert_eq!(result.location.as_str(), "http://192.168.0.1:5000/rootDesc.xml");
    assert!(result.matches("urn:schemas-upnp-org:device:InternetGatewayDevice:1"));
    assert!(!result.matches("urn:schemas-upnp-org:service:WANIPConnection:1"));
}

#[test]
fn test_parse_search_result_without_st_matches_anything() {
    let result = parse_search_result("location: http://10.0.0.1/desc.xml").unwrap();
    assert_eq!(result.search_target, None);
    assert!(result.matches("urn:schemas-upnp-org:device:InternetGatewayDevice:1"));
}

#[test]
fn test_parse_search_result_fail() {
    assert!(parse_search_result("content-type:http://0.0.0.0:0/control_url").is_err());
    assert!(parse_search_result("location: not a url").is_err());
}

#[test]
fn test_parse_device1() {
    let text = r#"<?xml version="1.0" encoding="UTF-8"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
   <specVersion>
      <major>1</major>
      <minor>0</minor>
   </specVersion>
   <device>
      <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
      <serviceList>
         <service>
            <serviceType>urn:schemas-upnp-org:service:Layer3Forwarding:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:Layer3Forwarding1</serviceId>
            <controlURL>/ctl/L3F</controlURL>
         </service>
      </serviceList>
      <deviceList>
         <device>
            <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
            <serviceList>
               <service>
                  <serviceType>urn:schemas-upnp-org:service:WANCommonInterfaceConfig:1</serviceType>
                  <controlURL>/ctl/CmnIfCfg</controlURL>
               </service>
            </serviceList>
            <deviceList>
               <device>
                  <deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
                  <serviceList>
                     <service>
                        <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
                        <serviceId>urn:upnp-org:serviceId:WANIPConn1</serviceId>
                        <controlURL>/ctl/IPConn</controlURL>
                     </service>
                  </serviceList>
               </device>
            </deviceList>
         </device>
      </deviceList>
   </device>
</root>"#;

    let location = Url::parse("http://192.168.0.1:5000/rootDesc.xml").unwrap();
    let service = parse_control_url(&location, text.as_bytes()).unwrap();
    assert_eq!(service.service_type, "urn:schemas-upnp-org:service:WANIPConnection:1");
    assert_eq!(service.control_url.as_str(), "http://192.168.0.1:5000/ctl/IPConn");
}

#[test]
fn test_parse_device_ppp() {
    let text = r#"<root><device><serviceList><service>
        <serviceType>urn:schemas-upnp-org:service:WANPPPConnection:1</serviceType>
        <controlURL>http://10.0.0.1:49000/upnp/control/WANPPPConn1</controlURL>
    </service></serviceList></device></root>"#;
    let location = Url::parse("http://10.0.0.1:49000/igddesc.xml").unwrap();
    let service = parse_control_url(&location, text.as_bytes()).unwrap();
    assert_eq!(service.service_type, "urn:schemas-upnp-org:service:WANPPPConnection:1");
    assert_eq!(service.control_url.as_str(), "http://10.0.0.1:49000/upnp/control/WANPPPConn1");
}

#[test]
fn test_parse_device_without_wan_service() {
    let text = r#"<root><device><serviceList><service>
        <serviceType>urn:schemas-upnp-org:service:Layer3Forwarding:1</serviceType>
        <controlURL>/ctl/L3F</controlURL>
    </service></serviceList></device></root>"#;
    let location = Url::parse("http://10.0.0.1/desc.xml").unwrap();
    assert!(parse_control_url(&location, text.as_bytes()).is_err());
}

#[test]
fn test_parse_response_fields() {
    let text = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body>
<u:GetGenericPortMappingEntryResponse xmlns:u="urn:schemas-upnp-org:service:WANIPConnection:1">
<NewRemoteHost></NewRemoteHost>
<NewExternalPort>8080</NewExternalPort>
<NewProtocol>TCP</NewProtocol>
<NewInternalClient>192.168.0.10</NewInternalClient>
<NewEnabled>1</NewEnabled>
</u:GetGenericPortMappingEntryResponse>
</s:Body>
</s:Envelope>"#;
    let response = parse_response(text.to_string(), "GetGenericPortMappingEntry").unwrap();
    assert!(response.is_present());
    assert_eq!(response.get("NewRemoteHost"), Some(&FieldValue::Text(String::new())));
    assert_eq!(response.get("NewExternalPort").and_then(FieldValue::as_integer), Some(8080));
    assert_eq!(response.get("NewProtocol"), Some(&FieldValue::Text("TCP".into())));
    assert_eq!(response.get("NewEnabled"), Some(&FieldValue::Integer(1, Some("1".into()))));
}

#[test]
fn test_parse_response_fault() {
    let text = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
<s:Body>
<s:Fault>
<faultcode>s:Client</faultcode>
<faultstring>UPnPError</faultstring>
<detail>
<UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
<errorCode>713</errorCode>
<errorDescription>SpecifiedArrayIndexInvalid</errorDescription>
</UPnPError>
</detail>
</s:Fault>
</s:Body>
</s:Envelope>"#;
    match parse_response(text.to_string(), "GetGenericPortMappingEntry") {
        Err(RequestError::ErrorCode(713, ref description)) => assert_eq!(description, "SpecifiedArrayIndexInvalid"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_parse_response_without_response_element() {
    let text = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body></s:Body></s:Envelope>"#;
    let response = parse_response(text.to_string(), "GetExternalIPAddress").unwrap();
    assert!(!response.is_present());
    assert!(parse_response("not xml".to_string(), "GetExternalIPAddress").is_err());
}

#[test]
fn test_parse_external_ip_response() {
    let mut fields = Fields::new();
    fields.insert("NewExternalIPAddress".into(), FieldValue::from("203.0.113.7"));
    let response = ActionResponse::new("GetExternalIPAddress", fields);
    assert_eq!(
        parse_external_ip_response(&response).unwrap(),
        "203.0.113.7".parse::<IpAddr>().unwrap()
    );

    match parse_external_ip_response(&ActionResponse::missing("GetExternalIPAddress")) {
        Err(Error::MalformedResponse(..)) => (),
        other => panic!("unexpected {:?}", other),
    }
}
