use std::fmt;
use std::hash::{Hash, Hasher};

use url::Url;

use crate::common::messages;
use crate::common::parsing::{self, ControlService};
use crate::common::response::{ActionResponse, Argument};
use crate::errors::{RequestError, SearchError};
use crate::soap;

/// Something that runs actions on a gateway.
pub trait ControlPoint {
    /// Run `action` with its input arguments, in order.
    ///
    /// Fails when the gateway answers with a fault or cannot be reached. An
    /// answer without the response element is returned as
    /// [`ActionResponse::missing`].
    fn run(&self, action: &str, args: &[Argument]) -> Result<ActionResponse, RequestError>;
}

/// This structure represents a gateway found by the search functions.
#[derive(Clone, Debug)]
pub struct Gateway {
    /// URL of the device description
    pub location: Url,
    /// The WAN connection service actions are sent to
    pub service: ControlService,
}

impl Gateway {
    /// Fetch the device description at `location` and find its WAN connection service.
    pub fn from_location(location: &Url) -> Result<Gateway, SearchError> {
        debug!("requesting control url from: {}", location);
        let body = attohttpc::get(location.as_str()).send()?.bytes()?;
        let service = parsing::parse_control_url(location, body.as_slice())?;
        debug!("received control url from: {} (url: {})", location, service.control_url);
        Ok(Gateway {
            location: location.clone(),
            service,
        })
    }
}

impl ControlPoint for Gateway {
    fn run(&self, action: &str, args: &[Argument]) -> Result<ActionResponse, RequestError> {
        debug!("running {} on {}", action, self);
        let header = messages::format_action_header(&self.service.service_type, action);
        let body = messages::format_action_message(&self.service.service_type, action, args);
        let text = soap::send(self.service.control_url.as_str(), soap::Action::new(&header), &body)?;
        parsing::parse_response(text, action)
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.service.control_url)
    }
}

impl PartialEq for Gateway {
    fn eq(&self, other: &Gateway) -> bool {
        self.location == other.location && self.service == other.service
    }
}

impl Eq for Gateway {}

impl Hash for Gateway {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
        self.service.control_url.hash(state);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use super::*;
    use crate::common::response::FieldValue;

    pub const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
        <deviceList>
          <device>
            <serviceList>
              <service>
                <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
                <controlURL>/ctl/IPConn</controlURL>
              </service>
            </serviceList>
          </device>
        </deviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    pub const EXTERNAL_IP: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body>
<u:GetExternalIPAddressResponse xmlns:u="urn:schemas-upnp-org:service:WANIPConnection:1">
<NewExternalIPAddress>203.0.113.7</NewExternalIPAddress>
</u:GetExternalIPAddressResponse>
</s:Body>
</s:Envelope>"#;

    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buff = [0u8; 1024];
        let header_end = loop {
            let n = stream.read(&mut buff).unwrap();
            assert!(n > 0, "connection closed before the request ended");
            data.extend_from_slice(&buff[..n]);
            if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break end + 4;
            }
        };
        let head = String::from_utf8_lossy(&data[..header_end]).to_string();
        let length = head
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(2, ':');
                match (parts.next(), parts.next()) {
                    (Some(name), Some(value)) if name.eq_ignore_ascii_case("content-length") => {
                        value.trim().parse::<usize>().ok()
                    }
                    _ => None,
                }
            })
            .next()
            .unwrap_or(0);
        while data.len() < header_end + length {
            let n = stream.read(&mut buff).unwrap();
            assert!(n > 0, "connection closed before the body ended");
            data.extend_from_slice(&buff[..n]);
        }
        String::from_utf8_lossy(&data).to_string()
    }

    /// Serve one canned response per connection, in order, and hand back the requests.
    pub fn serve(responses: Vec<&'static str>) -> (Url, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let location = Url::parse(&format!("http://{}/rootDesc.xml", listener.local_addr().unwrap())).unwrap();
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for body in responses {
                let (mut stream, _) = listener.accept().unwrap();
                requests.push(read_request(&mut stream));
                write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                )
                .unwrap();
            }
            requests
        });
        (location, handle)
    }

    #[test]
    fn test_gateway_runs_action() {
        let (location, server) = serve(vec![DESCRIPTION, EXTERNAL_IP]);
        let gateway = Gateway::from_location(&location).unwrap();
        assert_eq!(gateway.service.control_url.path(), "/ctl/IPConn");

        let response = gateway.run("GetExternalIPAddress", &[]).unwrap();
        assert_eq!(
            response.get("NewExternalIPAddress"),
            Some(&FieldValue::Text("203.0.113.7".into()))
        );

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /rootDesc.xml"));
        assert!(requests[1].starts_with("POST /ctl/IPConn"));
        assert!(requests[1].contains("urn:schemas-upnp-org:service:WANIPConnection:1#GetExternalIPAddress"));
        assert!(requests[1].contains("<u:GetExternalIPAddress"));
    }
}
