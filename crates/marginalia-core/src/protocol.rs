//! Message Protocol Types
//!
//! JSON envelopes exchanged with the native messaging host. Requests carry
//! an `action` tag, a payload, a protocol version, and a correlation id
//! stamped by the dispatcher; responses echo the version and correlation id
//! of the request that produced them.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version string of the message format.
///
/// Stamped on every outbound request. Inbound responses carrying a
/// different version are logged but still delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageVersion(String);

impl MessageVersion {
    /// The version this relay speaks.
    pub const CURRENT_STR: &'static str = "0.1.0";

    /// Current protocol version.
    pub fn current() -> Self {
        MessageVersion(Self::CURRENT_STR.to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for MessageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id tying a request to its response messages.
///
/// A 128-bit random value rendered as a string. Generated once per
/// exchange and never reused while that exchange is in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random id.
    pub fn fresh() -> Self {
        CorrelationId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        CorrelationId(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages sent from the relay to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub version: MessageVersion,
    #[serde(flatten)]
    pub action: Action,
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,
}

/// Actions a UI surface can ask the host to perform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action")]
pub enum Action {
    #[serde(rename = "saveRequest")]
    SaveRequest { payload: SavePayload },
    #[serde(rename = "removeRequest")]
    RemoveRequest { payload: RemovePayload },
    #[serde(rename = "searchRequest")]
    SearchRequest { payload: SearchPayload },
}

impl Action {
    /// The wire name of this action, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Action::SaveRequest { .. } => "saveRequest",
            Action::RemoveRequest { .. } => "removeRequest",
            Action::SearchRequest { .. } => "searchRequest",
        }
    }
}

/// Payload for `saveRequest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavePayload {
    pub url: String,
    pub title: String,
    #[serde(rename = "innerText")]
    pub inner_text: String,
}

/// Payload for `removeRequest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemovePayload {
    pub url: String,
}

/// Payload for `searchRequest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchPayload {
    pub query: String,
    #[serde(rename = "pageNum")]
    pub page_num: u32,
    #[serde(rename = "pageLength")]
    pub page_length: u32,
}

/// Messages sent from the host to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub version: MessageVersion,
    #[serde(flatten)]
    pub action: ResponseAction,
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,
}

impl Response {
    /// Completion-policy kind of this response.
    pub fn kind(&self) -> ResponseKind {
        self.action.kind()
    }
}

/// Actions the host can send back.
///
/// A search result arrives as a header followed by `pageLength` site
/// messages; everything else is complete in a single message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action")]
pub enum ResponseAction {
    #[serde(rename = "saveResponse")]
    SaveResponse { payload: () },
    #[serde(rename = "removeResponse")]
    RemoveResponse { payload: () },
    #[serde(rename = "searchResponseHeader")]
    SearchResponseHeader { payload: SearchHeaderPayload },
    #[serde(rename = "searchResponseSite")]
    SearchResponseSite { payload: SitePayload },
}

impl ResponseAction {
    /// The wire name of this action, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseAction::SaveResponse { .. } => "saveResponse",
            ResponseAction::RemoveResponse { .. } => "removeResponse",
            ResponseAction::SearchResponseHeader { .. } => "searchResponseHeader",
            ResponseAction::SearchResponseSite { .. } => "searchResponseSite",
        }
    }

    /// Completion-policy kind of this action.
    pub fn kind(&self) -> ResponseKind {
        match self {
            ResponseAction::SaveResponse { .. } | ResponseAction::RemoveResponse { .. } => {
                ResponseKind::Singleton
            }
            ResponseAction::SearchResponseHeader { payload } => ResponseKind::PaginatedHeader {
                expected: payload.page_length as usize,
            },
            ResponseAction::SearchResponseSite { .. } => ResponseKind::PaginatedItem,
        }
    }
}

/// How a response participates in reassembly.
///
/// The first response received for an exchange fixes the completion policy
/// for that exchange: a singleton completes it immediately, a header opens
/// a paginated collection of `expected` items, and an item is only valid
/// after a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Complete in one physical message.
    Singleton,
    /// Declares how many item messages follow.
    PaginatedHeader { expected: usize },
    /// One element of a paginated result.
    PaginatedItem,
}

/// Payload for `searchResponseHeader`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHeaderPayload {
    pub query: String,
    #[serde(rename = "pageNum")]
    pub page_num: u32,
    #[serde(rename = "pageLength")]
    pub page_length: u32,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Payload for `searchResponseSite`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SitePayload {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// The logical result handed back to the original caller.
///
/// Either the single response object (singleton exchanges) or the ordered
/// list of site payloads reassembled from a paginated exchange.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Outcome {
    Singleton(Response),
    Search(SearchResults),
}

/// Ordered site payloads from one search exchange.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResults {
    pub inner: Vec<SitePayload>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_distinct() {
        let ids: Vec<CorrelationId> = (0..1000).map(|_| CorrelationId::fresh()).collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_request_wire_format() {
        let request = Request {
            version: MessageVersion::current(),
            action: Action::SearchRequest {
                payload: SearchPayload {
                    query: "foo".to_string(),
                    page_num: 0,
                    page_length: 2,
                },
            },
            correlation_id: CorrelationId::from("id-1".to_string()),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["version"], "0.1.0");
        assert_eq!(json["action"], "searchRequest");
        assert_eq!(json["payload"]["query"], "foo");
        assert_eq!(json["payload"]["pageNum"], 0);
        assert_eq!(json["payload"]["pageLength"], 2);
        assert_eq!(json["correlationId"], "id-1");
    }

    #[test]
    fn test_save_request_wire_format() {
        let request = Request {
            version: MessageVersion::current(),
            action: Action::SaveRequest {
                payload: SavePayload {
                    url: "https://example.com".to_string(),
                    title: "Example".to_string(),
                    inner_text: "body text".to_string(),
                },
            },
            correlation_id: CorrelationId::fresh(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["action"], "saveRequest");
        assert_eq!(json["payload"]["innerText"], "body text");
    }

    #[test]
    fn test_response_parse_singleton() {
        let raw = r#"{
            "version": "0.1.0",
            "action": "saveResponse",
            "payload": null,
            "correlationId": "abc"
        }"#;

        let response: Response = serde_json::from_str(raw).unwrap();
        assert_eq!(response.kind(), ResponseKind::Singleton);
        assert_eq!(response.correlation_id.as_str(), "abc");
    }

    #[test]
    fn test_response_parse_header() {
        let raw = r#"{
            "version": "0.1.0",
            "action": "searchResponseHeader",
            "payload": { "query": "foo", "pageNum": 0, "pageLength": 3, "hasMore": false },
            "correlationId": "abc"
        }"#;

        let response: Response = serde_json::from_str(raw).unwrap();
        assert_eq!(response.kind(), ResponseKind::PaginatedHeader { expected: 3 });
        match response.action {
            ResponseAction::SearchResponseHeader { payload } => {
                assert_eq!(payload.page_length, 3);
                assert!(!payload.has_more);
            }
            other => panic!("unexpected action: {}", other.name()),
        }
    }

    #[test]
    fn test_response_parse_site() {
        let raw = r#"{
            "version": "0.1.0",
            "action": "searchResponseSite",
            "payload": { "url": "https://a", "title": "A", "snippet": "..." },
            "correlationId": "abc"
        }"#;

        let response: Response = serde_json::from_str(raw).unwrap();
        assert_eq!(response.kind(), ResponseKind::PaginatedItem);
    }

    #[test]
    fn test_action_names() {
        let save = Action::SaveRequest {
            payload: SavePayload {
                url: String::new(),
                title: String::new(),
                inner_text: String::new(),
            },
        };
        assert_eq!(save.name(), "saveRequest");

        let remove = Action::RemoveRequest {
            payload: RemovePayload { url: String::new() },
        };
        assert_eq!(remove.name(), "removeRequest");
    }

    #[test]
    fn test_outcome_serializes_search_results() {
        let outcome = Outcome::Search(SearchResults {
            inner: vec![SitePayload {
                url: "https://a".to_string(),
                title: "A".to_string(),
                snippet: "...".to_string(),
            }],
        });

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["inner"][0]["url"], "https://a");
    }
}
