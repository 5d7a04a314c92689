//! List-call filters in the backend's JSON query syntax.

use serde::Serialize;
use serde_json::Value;

pub const ATTRIBUTE_CREATED_AT: &str = "$createdAt";
pub const ATTRIBUTE_UPDATED_AT: &str = "$updatedAt";

#[derive(Clone, PartialEq, Debug)]
pub enum Query {
    Equal { attribute: String, values: Vec<Value> },
    OrderDesc(String),
    OrderAsc(String),
    Limit(u32),
    CursorAfter(String),
    Search { attribute: String, term: String },
}

#[derive(Serialize)]
struct EncodedQuery<'a> {
    method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    attribute: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    values: Vec<Value>,
}

impl Query {
    pub fn equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Equal {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    pub fn order_desc(attribute: impl Into<String>) -> Self {
        Query::OrderDesc(attribute.into())
    }

    pub fn order_asc(attribute: impl Into<String>) -> Self {
        Query::OrderAsc(attribute.into())
    }

    #[must_use]
    pub fn limit(limit: u32) -> Self {
        Query::Limit(limit)
    }

    pub fn cursor_after(document_id: impl Into<String>) -> Self {
        Query::CursorAfter(document_id.into())
    }

    pub fn search(attribute: impl Into<String>, term: impl Into<String>) -> Self {
        Query::Search {
            attribute: attribute.into(),
            term: term.into(),
        }
    }

    fn encoded(&self) -> EncodedQuery<'_> {
        let (method, attribute, values) = match self {
            Query::Equal { attribute, values } => ("equal", Some(attribute), values.clone()),
            Query::OrderDesc(attribute) => ("orderDesc", Some(attribute), vec![]),
            Query::OrderAsc(attribute) => ("orderAsc", Some(attribute), vec![]),
            Query::Limit(limit) => ("limit", None, vec![Value::from(*limit)]),
            Query::CursorAfter(id) => ("cursorAfter", None, vec![Value::from(id.as_str())]),
            Query::Search { attribute, term } => {
                ("search", Some(attribute), vec![Value::from(term.as_str())])
            }
        };

        EncodedQuery {
            method,
            attribute: attribute.map(String::as_str),
            values,
        }
    }

    /// The query as sent in a `queries[]` parameter.
    pub fn to_query_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.encoded())
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{ATTRIBUTE_UPDATED_AT, Query};

    #[test]
    fn encodes_methods() {
        assert_eq!(
            Query::equal("accountId", "abc").to_query_string().unwrap(),
            r#"{"method":"equal","attribute":"accountId","values":["abc"]}"#
        );
        assert_eq!(
            Query::order_desc(ATTRIBUTE_UPDATED_AT)
                .to_query_string()
                .unwrap(),
            r#"{"method":"orderDesc","attribute":"$updatedAt"}"#
        );
        assert_eq!(
            Query::limit(20).to_query_string().unwrap(),
            r#"{"method":"limit","values":[20]}"#
        );
        assert_eq!(
            Query::cursor_after("65a1").to_query_string().unwrap(),
            r#"{"method":"cursorAfter","values":["65a1"]}"#
        );
        assert_eq!(
            Query::search("caption", "sunset").to_query_string().unwrap(),
            r#"{"method":"search","attribute":"caption","values":["sunset"]}"#
        );
    }
}
