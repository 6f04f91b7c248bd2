//! Order service client fixture (cart and orders).

use super::gateway::{GatewayClient, GatewayError, Page};
use crate::seed::{ProductId, UserId};
use crate::services::ORDER_SERVICE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateCartItemRequest {
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: i64,
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    #[serde(default)]
    pub user_id: Option<UserId>,

    pub items: Vec<CartItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub delivery_address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: i64,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub delivery_address: Option<String>,
}

/// Client for the order service behind the gateway.
pub struct OrderClient {
    gateway: GatewayClient,
}

impl OrderClient {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            gateway: GatewayClient::new(gateway_url, &ORDER_SERVICE),
        }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// `GET /cart?userId=`, expects 200.
    pub async fn cart(&self, user_id: UserId) -> Result<CartResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway.get("/cart").query(&[("userId", user_id)]),
                StatusCode::OK,
            )
            .await
    }

    /// `POST /cart/items?userId=`, expects 200 with the updated cart.
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartResponse, GatewayError> {
        let request = AddCartItemRequest {
            product_id,
            quantity,
        };
        self.gateway
            .expect_json(
                self.gateway
                    .post("/cart/items")
                    .query(&[("userId", user_id)])
                    .json(&request),
                StatusCode::OK,
            )
            .await
    }

    /// `PUT /cart/items/{id}?userId=`, expects 200 with the updated cart.
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: i64,
        quantity: u32,
    ) -> Result<CartResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .put(&format!("/cart/items/{}", item_id))
                    .query(&[("userId", user_id)])
                    .json(&UpdateCartItemRequest { quantity }),
                StatusCode::OK,
            )
            .await
    }

    /// `DELETE /cart/items/{id}?userId=`, expects 200.
    pub async fn remove_item(&self, user_id: UserId, item_id: i64) -> Result<(), GatewayError> {
        self.gateway
            .expect_status(
                self.gateway
                    .delete(&format!("/cart/items/{}", item_id))
                    .query(&[("userId", user_id)]),
                StatusCode::OK,
            )
            .await
    }

    /// `DELETE /cart?userId=`, expects 204.
    pub async fn clear_cart(&self, user_id: UserId) -> Result<(), GatewayError> {
        self.gateway
            .expect_status(
                self.gateway.delete("/cart").query(&[("userId", user_id)]),
                StatusCode::NO_CONTENT,
            )
            .await
    }

    /// `POST /orders?userId=`, expects 201.
    pub async fn create_order(
        &self,
        user_id: UserId,
        delivery_address: &str,
    ) -> Result<OrderResponse, GatewayError> {
        let request = CreateOrderRequest {
            delivery_address: delivery_address.to_string(),
        };
        self.gateway
            .expect_json(
                self.gateway
                    .post("/orders")
                    .query(&[("userId", user_id)])
                    .json(&request),
                StatusCode::CREATED,
            )
            .await
    }

    pub async fn list_orders(
        &self,
        user_id: UserId,
        page: u32,
        page_size: u32,
    ) -> Result<Page<OrderResponse>, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway.get("/orders").query(&[
                    ("userId", user_id.0),
                    ("page", i64::from(page)),
                    ("pageSize", i64::from(page_size)),
                ]),
                StatusCode::OK,
            )
            .await
    }

    pub async fn get_order(&self, user_id: UserId, order_id: i64) -> Result<OrderResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .get(&format!("/orders/{}", order_id))
                    .query(&[("userId", user_id)]),
                StatusCode::OK,
            )
            .await
    }

    /// Status of `GET /cart?userId=` for an arbitrary (possibly invalid) id.
    pub async fn cart_status(&self, raw_user_id: i64) -> Result<StatusCode, GatewayError> {
        self.gateway
            .status_of(self.gateway.get("/cart").query(&[("userId", raw_user_id)]))
            .await
    }
}
