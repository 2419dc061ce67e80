use std::collections::HashMap;
use std::fmt;

/// A single output argument of an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    /// The value was an integer, with the text it was read from, if any.
    Integer(i64, Option<String>),
    /// Any other value, kept verbatim.
    Text(String),
}

impl FieldValue {
    /// Interpret the raw text of an output argument.
    ///
    /// Text that parses fully as a base-10 integer becomes `Integer`, keeping
    /// the text itself.
    pub fn from_text(text: &str) -> FieldValue {
        match text.trim().parse::<i64>() {
            Ok(n) => FieldValue::Integer(n, Some(text.to_string())),
            Err(..) => FieldValue::Text(text.to_string()),
        }
    }

    /// The value as text, if it was read from text.
    pub fn as_text(&self) -> Option<&str> {
        match *self {
            FieldValue::Text(ref s) => Some(s),
            FieldValue::Integer(_, ref raw) => raw.as_deref(),
        }
    }

    /// The value as an integer, accepting base-10 text as well.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            FieldValue::Integer(n, _) => Some(n),
            FieldValue::Text(ref s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldValue::Integer(_, Some(ref raw)) => f.write_str(raw),
            FieldValue::Integer(n, None) => write!(f, "{}", n),
            FieldValue::Text(ref s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> FieldValue {
        FieldValue::Integer(n, None)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }
}

/// Output arguments keyed by argument name.
pub type Fields = HashMap<String, FieldValue>;

/// An input argument of an action: name and already rendered value.
pub type Argument = (&'static str, String);

/// The answer of a gateway to one action.
///
/// `fields` is `None` when the SOAP body did not contain the
/// `<ActionName>Response` element.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionResponse {
    action: String,
    fields: Option<Fields>,
}

impl ActionResponse {
    /// A response carrying the given output arguments.
    pub fn new(action: &str, fields: Fields) -> ActionResponse {
        ActionResponse {
            action: action.to_string(),
            fields: Some(fields),
        }
    }

    /// A response without the expected response element.
    pub fn missing(action: &str) -> ActionResponse {
        ActionResponse {
            action: action.to_string(),
            fields: None,
        }
    }

    /// Name of the action this answers.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Whether the response element was present.
    pub fn is_present(&self) -> bool {
        self.fields.is_some()
    }

    /// All output arguments, if the response element was present.
    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }

    /// Get one output argument.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.as_ref().and_then(|fields| fields.get(field))
    }
}

#[test]
fn test_field_value_from_text() {
    assert_eq!(FieldValue::from_text("1"), FieldValue::Integer(1, Some("1".into())));
    assert_eq!(FieldValue::from_text(" 8080 ").as_integer(), Some(8080));
    assert_eq!(FieldValue::from_text("192.168.1.2"), FieldValue::Text("192.168.1.2".into()));
    assert_eq!(FieldValue::from_text(""), FieldValue::Text("".into()));
}

#[test]
fn test_field_value_keeps_numeric_text() {
    let value = FieldValue::from_text("007");
    assert_eq!(value.as_integer(), Some(7));
    assert_eq!(value.as_text(), Some("007"));
    assert_eq!(value.to_string(), "007");
    assert_eq!(FieldValue::from(7i64).as_text(), None);
    assert_eq!(FieldValue::from(7i64).to_string(), "7");
}

#[test]
fn test_field_value_as_integer() {
    assert_eq!(FieldValue::from(7i64).as_integer(), Some(7));
    assert_eq!(FieldValue::from("42").as_integer(), Some(42));
    assert_eq!(FieldValue::from("TCP").as_integer(), None);
}

#[test]
fn test_missing_response() {
    let response = ActionResponse::missing("GetExternalIPAddress");
    assert!(!response.is_present());
    assert_eq!(response.get("NewExternalIPAddress"), None);
}
