use crate::errors::RequestError;

#[derive(Clone, Debug)]
pub struct Action(String);

impl Action {
    pub fn new(action: &str) -> Action {
        Action(action.into())
    }
}

const HEADER_NAME: &str = "SOAPAction";

pub fn send(url: &str, action: Action, body: &str) -> Result<String, RequestError> {
    Ok(attohttpc::post(url)
        .header(HEADER_NAME, action.0)
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .text(body)
        .send()?
        .text()?)
}
