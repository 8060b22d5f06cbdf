/// Expo push provider client
///
/// Speaks the Expo push HTTP API: batched message submission returning one
/// ticket per token, and a receipts endpoint for best-effort delivery
/// confirmation. Success at this layer means the provider acknowledged
/// receipt (ticket status "ok"), not that the end device displayed anything.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Provider hard limit per request
const MAX_BATCH: usize = 100;

/// One push message addressed to a single device token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

impl PushMessage {
    pub fn new(to: String, title: &str, body: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            to,
            title: title.to_string(),
            body: body.to_string(),
            data,
            sound: Some("default".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketDetails {
    #[serde(default)]
    pub error: Option<String>,
}

/// Per-token response from the batch endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushTicket {
    pub status: TicketStatus,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<TicketDetails>,
}

impl PushTicket {
    pub fn ok(id: String) -> Self {
        Self {
            status: TicketStatus::Ok,
            id: Some(id),
            message: None,
            details: None,
        }
    }

    pub fn error(message: String, code: Option<String>) -> Self {
        Self {
            status: TicketStatus::Error,
            id: None,
            message: Some(message),
            details: code.map(|error| TicketDetails { error: Some(error) }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TicketStatus::Ok
    }

    /// Terminal provider verdict: the token will never work again and should
    /// be retired in the device directory.
    pub fn is_device_gone(&self) -> bool {
        self.details
            .as_ref()
            .and_then(|d| d.error.as_deref())
            .map(|e| e == "DeviceNotRegistered")
            .unwrap_or(false)
    }
}

/// Delivery receipt fetched after the fact; failures here are logged only
#[derive(Debug, Clone, Deserialize)]
pub struct PushReceipt {
    pub status: TicketStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<TicketDetails>,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    data: Vec<PushTicket>,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    data: std::collections::HashMap<String, PushReceipt>,
}

#[derive(Debug, Serialize)]
struct ReceiptRequest {
    ids: Vec<String>,
}

/// Expo tokens look like `ExponentPushToken[xxxxxxxx]` (older SDKs emit
/// `ExpoPushToken[...]`). Anything else never reaches the provider.
pub fn is_valid_push_token(token: &str) -> bool {
    let inner = token
        .strip_prefix("ExponentPushToken[")
        .or_else(|| token.strip_prefix("ExpoPushToken["));

    matches!(inner, Some(rest) if rest.len() > 1 && rest.ends_with(']'))
}

/// Seam for the provider transport, so dispatch can be exercised without the
/// network.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Submit messages; returns one ticket per message, in order
    async fn send_batch(&self, messages: Vec<PushMessage>) -> Result<Vec<PushTicket>, String>;

    /// Fetch delivery receipts for previously returned ticket ids
    async fn check_receipts(&self, ticket_ids: Vec<String>)
        -> Result<Vec<(String, PushReceipt)>, String>;
}

pub struct ExpoPushClient {
    http: reqwest::Client,
    endpoint: String,
    receipt_endpoint: String,
    batch_size: usize,
}

impl ExpoPushClient {
    pub fn new(endpoint: String, receipt_endpoint: String, batch_size: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            receipt_endpoint,
            batch_size: batch_size.clamp(1, MAX_BATCH),
        }
    }

    async fn post_chunk(&self, chunk: &[PushMessage]) -> Result<Vec<PushTicket>, String> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&chunk)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("push endpoint returned {}", response.status()));
        }

        let parsed: PushResponse = response.json().await.map_err(|e| e.to_string())?;
        if parsed.data.len() != chunk.len() {
            warn!(
                expected = chunk.len(),
                got = parsed.data.len(),
                "push provider returned a ticket count mismatch"
            );
        }

        Ok(parsed.data)
    }
}

#[async_trait]
impl PushProvider for ExpoPushClient {
    async fn send_batch(&self, messages: Vec<PushMessage>) -> Result<Vec<PushTicket>, String> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        // Chunks go out concurrently; one failed chunk must not sink the
        // others, so its tickets are synthesized as errors to keep the
        // result aligned with the input.
        let chunks: Vec<&[PushMessage]> = messages.chunks(self.batch_size).collect();
        let results = futures::future::join_all(chunks.iter().map(|c| self.post_chunk(c))).await;

        let mut tickets = Vec::with_capacity(messages.len());
        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(mut chunk_tickets) => tickets.append(&mut chunk_tickets),
                Err(e) => {
                    warn!(error = %e, size = chunk.len(), "push chunk failed");
                    for _ in 0..chunk.len() {
                        tickets.push(PushTicket::error(e.clone(), None));
                    }
                }
            }
        }

        Ok(tickets)
    }

    async fn check_receipts(
        &self,
        ticket_ids: Vec<String>,
    ) -> Result<Vec<(String, PushReceipt)>, String> {
        if ticket_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(&self.receipt_endpoint)
            .json(&ReceiptRequest { ids: ticket_ids })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("receipt endpoint returned {}", response.status()));
        }

        let parsed: ReceiptResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(parsed.data.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_token_formats() {
        assert!(is_valid_push_token("ExponentPushToken[abc123XYZ]"));
        assert!(is_valid_push_token("ExpoPushToken[abc123XYZ]"));
    }

    #[test]
    fn test_invalid_token_formats() {
        assert!(!is_valid_push_token(""));
        assert!(!is_valid_push_token("ExponentPushToken[]"));
        assert!(!is_valid_push_token("ExponentPushToken[abc"));
        assert!(!is_valid_push_token("abc123"));
        // an FCM-style registration token is not an Expo token
        assert!(!is_valid_push_token("dGhpcyBpcyBub3QgYW4gZXhwbyB0b2tlbg"));
        assert!(!is_valid_push_token("PushToken[abc]"));
    }

    #[test]
    fn test_ticket_response_parsing() {
        let body = r#"{
            "data": [
                {"status": "ok", "id": "ticket-1"},
                {"status": "error", "message": "not registered", "details": {"error": "DeviceNotRegistered"}}
            ]
        }"#;

        let parsed: PushResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert!(parsed.data[0].is_ok());
        assert!(!parsed.data[0].is_device_gone());
        assert!(!parsed.data[1].is_ok());
        assert!(parsed.data[1].is_device_gone());
    }

    #[test]
    fn test_receipt_response_parsing() {
        let body = r#"{
            "data": {
                "ticket-1": {"status": "ok"},
                "ticket-2": {"status": "error", "message": "mailbox full", "details": {"error": "MessageRateExceeded"}}
            }
        }"#;

        let parsed: ReceiptResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data["ticket-1"].status, TicketStatus::Ok);
        assert_eq!(parsed.data["ticket-2"].status, TicketStatus::Error);
    }

    #[test]
    fn test_push_message_serialization_skips_empty_fields() {
        let msg = PushMessage {
            to: "ExponentPushToken[x1]".to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            data: None,
            sound: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("data"));
        assert!(!json.contains("sound"));
    }

    #[test]
    fn test_batch_size_is_clamped_to_provider_limit() {
        let client = ExpoPushClient::new("http://x".into(), "http://y".into(), 5000);
        assert_eq!(client.batch_size, MAX_BATCH);

        let client = ExpoPushClient::new("http://x".into(), "http://y".into(), 0);
        assert_eq!(client.batch_size, 1);
    }

    #[test]
    fn test_synthesized_error_ticket() {
        let ticket = PushTicket::error("timeout".into(), None);
        assert!(!ticket.is_ok());
        assert!(!ticket.is_device_gone());
        assert_eq!(ticket.message.as_deref(), Some("timeout"));
    }
}
