use std::error;
use std::fmt;
use std::io;
use std::str;
use std::string::FromUtf8Error;

/// Errors that can occur when sending an action to the gateway.
#[derive(Debug)]
pub enum RequestError {
    /// attohttpc error
    AttoHttpError(attohttpc::Error),
    /// Hyper Error
    #[cfg(feature = "aio")]
    HyperError(hyper::Error),
    /// http crate error type
    #[cfg(feature = "aio")]
    HttpError(http::Error),
    /// IO Error
    IoError(io::Error),
    /// The response from the gateway could not be parsed.
    InvalidResponse(String),
    /// The gateway returned an unhandled error code and description.
    ErrorCode(u16, String),
    /// The response body was not valid UTF-8.
    Utf8Error(FromUtf8Error),
}

/// Errors that can occur while searching for a gateway and reading its description.
#[derive(Debug)]
pub enum SearchError {
    /// Http/Hyper error
    HttpError(attohttpc::Error),
    /// Unable to process the response
    InvalidResponse,
    /// IO Error
    IoError(io::Error),
    /// UTF-8 decoding error
    Utf8Error(str::Utf8Error),
    /// XML processing error
    XmlError(xmltree::ParseError),
    /// The location or control URL could not be parsed
    UrlError(url::ParseError),
    /// Error parsing URI
    #[cfg(feature = "aio")]
    InvalidUri(http::uri::InvalidUri),
    /// Hyper Error
    #[cfg(feature = "aio")]
    HyperError(hyper::Error),
}

/// Errors returned by the operations of `Client`.
#[derive(Debug)]
pub enum Error {
    /// No gateway answered the search within the configured timeout.
    DiscoveryTimeout,
    /// The search itself failed.
    Search(SearchError),
    /// The gateway rejected an action or could not be reached.
    RemoteActionFailed(RequestError),
    /// The gateway answered without the expected response element or field.
    MalformedResponse(String),
}

impl From<attohttpc::Error> for RequestError {
    fn from(err: attohttpc::Error) -> RequestError {
        RequestError::AttoHttpError(err)
    }
}

impl From<io::Error> for RequestError {
    fn from(err: io::Error) -> RequestError {
        RequestError::IoError(err)
    }
}

impl From<FromUtf8Error> for RequestError {
    fn from(err: FromUtf8Error) -> RequestError {
        RequestError::Utf8Error(err)
    }
}

#[cfg(feature = "aio")]
impl From<hyper::Error> for RequestError {
    fn from(err: hyper::Error) -> RequestError {
        RequestError::HyperError(err)
    }
}

#[cfg(feature = "aio")]
impl From<http::Error> for RequestError {
    fn from(err: http::Error) -> RequestError {
        RequestError::HttpError(err)
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RequestError::AttoHttpError(ref e) => write!(f, "HTTP error {}", e),
            RequestError::InvalidResponse(ref e) => write!(f, "Invalid response from gateway: {}", e),
            RequestError::IoError(ref e) => write!(f, "IO error. {}", e),
            RequestError::ErrorCode(n, ref e) => write!(f, "Gateway response error {}: {}", n, e),
            RequestError::Utf8Error(ref e) => write!(f, "UTF-8 error: {}", e),
            #[cfg(feature = "aio")]
            RequestError::HyperError(ref e) => write!(f, "Hyper Error: {}", e),
            #[cfg(feature = "aio")]
            RequestError::HttpError(ref e) => write!(f, "Http Error: {}", e),
        }
    }
}

impl error::Error for RequestError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            RequestError::AttoHttpError(ref e) => Some(e),
            RequestError::InvalidResponse(..) => None,
            RequestError::IoError(ref e) => Some(e),
            RequestError::ErrorCode(..) => None,
            RequestError::Utf8Error(ref e) => Some(e),
            #[cfg(feature = "aio")]
            RequestError::HyperError(ref e) => Some(e),
            #[cfg(feature = "aio")]
            RequestError::HttpError(ref e) => Some(e),
        }
    }
}

impl From<attohttpc::Error> for SearchError {
    fn from(err: attohttpc::Error) -> SearchError {
        SearchError::HttpError(err)
    }
}

impl From<io::Error> for SearchError {
    fn from(err: io::Error) -> SearchError {
        SearchError::IoError(err)
    }
}

impl From<str::Utf8Error> for SearchError {
    fn from(err: str::Utf8Error) -> SearchError {
        SearchError::Utf8Error(err)
    }
}

impl From<xmltree::ParseError> for SearchError {
    fn from(err: xmltree::ParseError) -> SearchError {
        SearchError::XmlError(err)
    }
}

impl From<url::ParseError> for SearchError {
    fn from(err: url::ParseError) -> SearchError {
        SearchError::UrlError(err)
    }
}

#[cfg(feature = "aio")]
impl From<http::uri::InvalidUri> for SearchError {
    fn from(err: http::uri::InvalidUri) -> SearchError {
        SearchError::InvalidUri(err)
    }
}

#[cfg(feature = "aio")]
impl From<hyper::Error> for SearchError {
    fn from(err: hyper::Error) -> SearchError {
        SearchError::HyperError(err)
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SearchError::HttpError(ref e) => write!(f, "HTTP error {}", e),
            SearchError::InvalidResponse => write!(f, "Invalid response"),
            SearchError::IoError(ref e) => write!(f, "IO error: {}", e),
            SearchError::Utf8Error(ref e) => write!(f, "UTF-8 error: {}", e),
            SearchError::XmlError(ref e) => write!(f, "XML error: {}", e),
            SearchError::UrlError(ref e) => write!(f, "URL error: {}", e),
            #[cfg(feature = "aio")]
            SearchError::InvalidUri(ref e) => write!(f, "InvalidUri Error: {}", e),
            #[cfg(feature = "aio")]
            SearchError::HyperError(ref e) => write!(f, "Hyper Error: {}", e),
        }
    }
}

impl error::Error for SearchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            SearchError::HttpError(ref e) => Some(e),
            SearchError::InvalidResponse => None,
            SearchError::IoError(ref e) => Some(e),
            SearchError::Utf8Error(ref e) => Some(e),
            SearchError::XmlError(ref e) => Some(e),
            SearchError::UrlError(ref e) => Some(e),
            #[cfg(feature = "aio")]
            SearchError::InvalidUri(ref e) => Some(e),
            #[cfg(feature = "aio")]
            SearchError::HyperError(ref e) => Some(e),
        }
    }
}

impl From<SearchError> for Error {
    fn from(err: SearchError) -> Error {
        Error::Search(err)
    }
}

impl From<RequestError> for Error {
    fn from(err: RequestError) -> Error {
        Error::RemoteActionFailed(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::DiscoveryTimeout => write!(f, "No gateway answered the search before the timeout"),
            Error::Search(ref e) => write!(f, "Search error. {}", e),
            Error::RemoteActionFailed(ref e) => write!(f, "Request error. {}", e),
            Error::MalformedResponse(ref e) => write!(f, "Malformed response from gateway: {}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::DiscoveryTimeout => None,
            Error::Search(ref e) => Some(e),
            Error::RemoteActionFailed(ref e) => Some(e),
            Error::MalformedResponse(..) => None,
        }
    }
}
