use std::fmt;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::{Client, Uri};
use url::Url;

use super::soap;
use crate::common::messages;
use crate::common::parsing::{self, ControlService};
use crate::common::response::{ActionResponse, Argument};
use crate::errors::{RequestError, SearchError};

/// Something that runs actions on a gateway, asynchronously.
#[async_trait]
pub trait ControlPoint: Send + Sync {
    /// Run `action` with its input arguments, in order.
    ///
    /// See [`crate::ControlPoint::run`].
    async fn run(&self, action: &str, args: &[Argument]) -> Result<ActionResponse, RequestError>;
}

/// This structure represents a gateway found by the search functions.
#[derive(Clone, Debug)]
pub struct Gateway {
    /// URL of the device description
    pub location: Url,
    /// The WAN connection service actions are sent to
    pub service: ControlService,
    client: Client<HttpConnector>,
}

impl Gateway {
    /// Fetch the device description at `location` and find its WAN connection service.
    pub async fn from_location(client: Client<HttpConnector>, location: &Url) -> Result<Gateway, SearchError> {
        let uri: Uri = location.as_str().parse()?;
        debug!("requesting control url from: {}", uri);

        let resp = client.get(uri).await?;
        let body: Bytes = hyper::body::to_bytes(resp.into_body()).await?;
        let service = parsing::parse_control_url(location, body.as_ref())?;
        debug!("received control url from: {} (url: {})", location, service.control_url);

        Ok(Gateway {
            location: location.clone(),
            service,
            client,
        })
    }
}

#[async_trait]
impl ControlPoint for Gateway {
    async fn run(&self, action: &str, args: &[Argument]) -> Result<ActionResponse, RequestError> {
        debug!("running {} on {}", action, self);
        let header = messages::format_action_header(&self.service.service_type, action);
        let body = messages::format_action_message(&self.service.service_type, action, args);
        let text = soap::send_async(
            &self.client,
            self.service.control_url.as_str(),
            soap::Action::new(&header),
            &body,
        )
        .await?;
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
mod tests {
    use super::*;
    use crate::common::response::FieldValue;
    use crate::gateway::tests::{serve, DESCRIPTION, EXTERNAL_IP};

    #[tokio::test]
    async fn test_gateway_runs_action() {
        let (location, server) = serve(vec![DESCRIPTION, EXTERNAL_IP]);
        let gateway = Gateway::from_location(Client::new(), &location).await.unwrap();
        assert_eq!(gateway.service.control_url.path(), "/ctl/IPConn");

        let response = gateway.run("GetExternalIPAddress", &[]).await.unwrap();
        assert_eq!(
            response.get("NewExternalIPAddress"),
            Some(&FieldValue::Text("203.0.113.7".into()))
        );

        let requests = tokio::task::spawn_blocking(move || server.join().unwrap())
            .await
            .unwrap();
        assert!(requests[1].starts_with("POST /ctl/IPConn"));
        assert!(requests[1].contains("#GetExternalIPAddress"));
    }
}
