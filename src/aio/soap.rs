use hyper::client::HttpConnector;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Body, Client, Request};

use crate::errors::RequestError;

#[derive(Clone, Debug)]
pub struct Action(String);

impl Action {
    pub fn new(action: &str) -> Action {
        Action(action.into())
    }
}

const HEADER_NAME: &str = "SOAPAction";

pub async fn send_async(
    client: &Client<HttpConnector>,
    url: &str,
    action: Action,
    body: &str,
) -> Result<String, RequestError> {
    let req = Request::builder()
        .uri(url)
        .method("POST")
        .header(HEADER_NAME, action.0)
        .header(CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
        .header(CONTENT_LENGTH, body.len() as u64)
        .body(Body::from(body.to_string()))?;

    let resp = client.request(req).await?;
    let bytes = hyper::body::to_bytes(resp.into_body()).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}
