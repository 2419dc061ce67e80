use crate::common::response::Argument;

pub const IGD_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:InternetGatewayDevice:1";

pub const ADD_PORT_MAPPING: &str = "AddPortMapping";
pub const DELETE_PORT_MAPPING: &str = "DeletePortMapping";
pub const GET_GENERIC_PORT_MAPPING_ENTRY: &str = "GetGenericPortMappingEntry";
pub const GET_EXTERNAL_IP_ADDRESS: &str = "GetExternalIPAddress";

pub fn format_search_request(search_target: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r
HOST: 239.255.255.250:1900\r
ST: {}\r
MAN: \"ssdp:discover\"\r
MX: 3\r\n\r\n",
        search_target
    )
}

pub fn format_action_header(service_type: &str, action: &str) -> String {
    format!("\"{}#{}\"", service_type, action)
}

pub fn format_action_message(service_type: &str, action: &str, args: &[Argument]) -> String {
    let mut body = String::new();
    for (name, value) in args {
        body.push_str(&format!("\n        <{0}>{1}</{0}>", name, escape(value)));
    }
    format!(
        "<?xml version=\"1.0\"?>
<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">
<s:Body>
    <u:{action} xmlns:u=\"{service}\">{body}
    </u:{action}>
</s:Body>
</s:Envelope>",
        action = action,
        service = service_type,
        body = body,
    )
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[test]
fn test_search_request_target() {
    let request = format_search_request(IGD_SEARCH_TARGET);
    assert!(request.starts_with("M-SEARCH * HTTP/1.1\r\n"));
    assert!(request.contains("\r\nST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\n"));
    assert!(request.ends_with("\r\n\r\n"));
}

#[test]
fn test_action_message_keeps_argument_order() {
    let service = "urn:schemas-upnp-org:service:WANIPConnection:1";
    let args = [
        ("NewRemoteHost", String::new()),
        ("NewExternalPort", "80".to_string()),
        ("NewProtocol", "TCP".to_string()),
    ];
    let message = format_action_message(service, DELETE_PORT_MAPPING, &args);
    let host = message.find("<NewRemoteHost></NewRemoteHost>").unwrap();
    let port = message.find("<NewExternalPort>80</NewExternalPort>").unwrap();
    let protocol = message.find("<NewProtocol>TCP</NewProtocol>").unwrap();
    assert!(host < port && port < protocol);
    assert!(message.contains("<u:DeletePortMapping xmlns:u=\"urn:schemas-upnp-org:service:WANIPConnection:1\">"));
}

#[test]
fn test_action_message_escapes_values() {
    let args = [("NewPortMappingDescription", "a<b & c".to_string())];
    let message = format_action_message("urn:x", ADD_PORT_MAPPING, &args);
    assert!(message.contains("<NewPortMappingDescription>a&lt;b &amp; c</NewPortMappingDescription>"));
}

#[test]
fn test_action_header() {
    assert_eq!(
        format_action_header("urn:schemas-upnp-org:service:WANIPConnection:1", GET_EXTERNAL_IP_ADDRESS),
        "\"urn:schemas-upnp-org:service:WANIPConnection:1#GetExternalIPAddress\""
    );
}
