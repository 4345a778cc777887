// GraphQL request and response shapes

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TransportError;

/// Error code servers put in `extensions.code` when the credential is rejected
pub const UNAUTHENTICATED_CODE: &str = "UNAUTHENTICATED";

/// A GraphQL operation on its way to the server
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub operation_name: String,
    pub query: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,

    /// Per-request headers, not part of the JSON body
    #[serde(skip)]
    pub headers: HeaderMap,
}

impl GraphQLRequest {
    pub fn new(operation_name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            query: query.into(),
            variables: Map::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Whether an authorization header is already attached
    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(AUTHORIZATION)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Set `authorization: {scheme} {token}`, replacing any previous value
    pub fn set_authorization(&mut self, scheme: &str, token: &str) -> Result<(), TransportError> {
        let value = HeaderValue::from_str(&format!("{} {}", scheme, token))
            .map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// One entry of the `errors` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
    /// `extensions.code`, if the server sent one
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(|v| v.as_str())
    }

    pub fn is_unauthenticated(&self) -> bool {
        self.code() == Some(UNAUTHENTICATED_CODE)
    }
}

/// JSON body of a GraphQL response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphQLBody {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

/// Parsed response plus the HTTP status it arrived with
#[derive(Debug, Clone)]
pub struct GraphQLResponse {
    pub status: u16,
    pub data: Option<Value>,
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    pub fn from_body(status: u16, body: GraphQLBody) -> Self {
        Self {
            status,
            data: body.data,
            errors: body.errors,
        }
    }

    /// True if any error carries the UNAUTHENTICATED code, even when data is partially populated
    pub fn is_unauthenticated(&self) -> bool {
        self.errors.iter().any(GraphQLError::is_unauthenticated)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn to_body(&self) -> GraphQLBody {
        GraphQLBody {
            data: self.data.clone(),
            errors: self.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: Value) -> GraphQLResponse {
        GraphQLResponse::from_body(200, serde_json::from_value(body).unwrap())
    }

    #[test]
    fn test_request_serializes_camel_case_without_headers() {
        let mut request = GraphQLRequest::new("GetViewer", "query GetViewer { viewer { id } }");
        request.set_authorization("JWT", "abc").unwrap();

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["operationName"], "GetViewer");
        assert!(body.get("variables").is_none());
        assert!(body.get("headers").is_none());
        assert_eq!(request.authorization(), Some("JWT abc"));
    }

    #[test]
    fn test_set_authorization_replaces_existing() {
        let mut request = GraphQLRequest::new("Op", "query Op { a }");
        request.set_authorization("JWT", "old").unwrap();
        request.set_authorization("Bearer", "new").unwrap();
        assert_eq!(request.authorization(), Some("Bearer new"));
        assert_eq!(request.headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_set_authorization_rejects_control_characters() {
        let mut request = GraphQLRequest::new("Op", "query Op { a }");
        let err = request.set_authorization("JWT", "bad\ntoken").unwrap_err();
        assert!(matches!(err, TransportError::InvalidHeader(_)));
        assert!(!request.has_authorization());
    }

    #[test]
    fn test_unauthenticated_among_multiple_errors() {
        let response = parse(json!({
            "data": { "viewer": { "id": "1" }, "secret": null },
            "errors": [
                { "message": "not found", "extensions": { "code": "NOT_FOUND" } },
                { "message": "login required", "extensions": { "code": "UNAUTHENTICATED" } }
            ]
        }));
        assert!(response.is_unauthenticated());
        assert!(response.data.is_some());
    }

    #[test]
    fn test_other_errors_are_not_unauthenticated() {
        let response = parse(json!({
            "errors": [
                { "message": "boom" },
                { "message": "forbidden", "extensions": { "code": "FORBIDDEN" } }
            ]
        }));
        assert!(response.has_errors());
        assert!(!response.is_unauthenticated());
        assert_eq!(response.errors[1].code(), Some("FORBIDDEN"));
    }

    #[test]
    fn test_success_body_without_errors() {
        let response = parse(json!({ "data": { "ok": true } }));
        assert!(!response.has_errors());
        assert_eq!(response.to_body().data, Some(json!({ "ok": true })));
    }
}
