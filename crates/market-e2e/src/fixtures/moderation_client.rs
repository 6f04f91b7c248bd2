//! Moderation service client fixture.

use super::gateway::{GatewayClient, GatewayError};
use crate::seed::{ProductId, ProductStatus, UserId};
use crate::services::MODERATION_SERVICE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkModerationRequest {
    pub product_ids: Vec<ProductId>,
    pub action: ModerationAction,
}

/// Result of a single moderation decision.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResult {
    pub product_id: ProductId,
    pub new_status: ProductStatus,

    #[serde(default)]
    pub reason: Option<String>,
}

/// A product waiting in the moderation queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingProduct {
    pub id: ProductId,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub status: Option<ProductStatus>,
}

/// Client for the moderation service behind the gateway.
pub struct ModerationClient {
    gateway: GatewayClient,
}

impl ModerationClient {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            gateway: GatewayClient::new(gateway_url, &MODERATION_SERVICE),
        }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// `GET /moderation/products?moderatorId=&page=&pageSize=`.
    ///
    /// The payload shape varies between versions, so it is returned raw.
    pub async fn pending_queue(
        &self,
        moderator_id: UserId,
        page: u32,
        page_size: u32,
    ) -> Result<serde_json::Value, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway.get("/moderation/products").query(&[
                    ("moderatorId", moderator_id.0),
                    ("page", i64::from(page)),
                    ("pageSize", i64::from(page_size)),
                ]),
                StatusCode::OK,
            )
            .await
    }

    pub async fn pending_product(
        &self,
        moderator_id: UserId,
        product_id: ProductId,
    ) -> Result<PendingProduct, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .get(&format!("/moderation/products/{}", product_id))
                    .query(&[("moderatorId", moderator_id)]),
                StatusCode::OK,
            )
            .await
    }

    /// `POST /moderation/products/{id}/approve?moderatorId=`, expects 200.
    pub async fn approve(
        &self,
        moderator_id: UserId,
        product_id: ProductId,
    ) -> Result<ModerationResult, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .post(&format!("/moderation/products/{}/approve", product_id))
                    .query(&[("moderatorId", moderator_id)]),
                StatusCode::OK,
            )
            .await
    }

    /// `POST /moderation/products/{id}/reject?moderatorId=`, expects 200.
    pub async fn reject(
        &self,
        moderator_id: UserId,
        product_id: ProductId,
        reason: &str,
    ) -> Result<ModerationResult, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .post(&format!("/moderation/products/{}/reject", product_id))
                    .query(&[("moderatorId", moderator_id)])
                    .json(&RejectRequest {
                        reason: reason.to_string(),
                    }),
                StatusCode::OK,
            )
            .await
    }

    /// `POST /moderation/bulk?moderatorId=`, expects 200 with one result per
    /// product.
    pub async fn bulk(
        &self,
        moderator_id: UserId,
        request: &BulkModerationRequest,
    ) -> Result<Vec<ModerationResult>, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .post("/moderation/bulk")
                    .query(&[("moderatorId", moderator_id)])
                    .json(request),
                StatusCode::OK,
            )
            .await
    }

    pub async fn moderator_history(&self, moderator_id: UserId) -> Result<serde_json::Value, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .get("/moderation/history")
                    .query(&[("moderatorId", moderator_id)]),
                StatusCode::OK,
            )
            .await
    }

    pub async fn product_history(&self, product_id: ProductId) -> Result<serde_json::Value, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .get(&format!("/moderation/products/{}/history", product_id)),
                StatusCode::OK,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_bulk_request_serialization() {
        let request = BulkModerationRequest {
            product_ids: vec![ProductId(1), ProductId(2)],
            action: ModerationAction::Approve,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({ "productIds": [1, 2], "action": "APPROVE" }));
    }

    #[test]
    fn test_reject_result_deserialization() {
        let json = r#"{"productId": 4, "newStatus": "REJECTED", "reason": "Invalid description"}"#;
        let result: ModerationResult = serde_json::from_str(json).unwrap();

        assert_eq!(result.product_id, ProductId(4));
        assert_eq!(result.new_status, ProductStatus::Rejected);
        assert_eq!(result.reason.as_deref(), Some("Invalid description"));
    }

    #[tokio::test]
    async fn test_approve_targets_product_path() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/moderation-service/api/moderation/products/31/approve"))
            .and(query_param("moderatorId", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "productId": 31,
                "newStatus": "APPROVED"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = ModerationClient::new(&mock_server.uri())
            .approve(UserId(2), ProductId(31))
            .await
            .unwrap();
        assert_eq!(result.new_status, ProductStatus::Approved);
        assert_eq!(result.reason, None);
    }
}
