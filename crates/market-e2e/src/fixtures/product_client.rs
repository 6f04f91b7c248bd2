//! Product service client fixture (shops and products).

use super::gateway::{GatewayClient, GatewayError, Page};
use crate::seed::{ProductId, ProductStatus, ShopId, UserId};
use crate::services::PRODUCT_SERVICE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Request body for `POST /shops`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShopRequest {
    pub name: String,
    pub description: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopResponse {
    pub id: ShopId,
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub seller_id: UserId,
}

/// Request body for `POST /products`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub price: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    pub shop_id: ShopId,
}

impl CreateProductRequest {
    /// Minimal product: name, price and shop only.
    pub fn minimal(name: impl Into<String>, price: f64, shop_id: ShopId) -> Self {
        Self {
            name: name.into(),
            description: None,
            price,
            image_url: None,
            shop_id,
        }
    }
}

/// Request body for `PUT /products/{id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub price: f64,

    #[serde(default)]
    pub shop_id: Option<ShopId>,

    #[serde(default)]
    pub seller_id: Option<UserId>,

    #[serde(default)]
    pub status: Option<ProductStatus>,
}

/// Client for the product service behind the gateway.
pub struct ProductClient {
    gateway: GatewayClient,
}

impl ProductClient {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            gateway: GatewayClient::new(gateway_url, &PRODUCT_SERVICE),
        }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// `POST /shops?sellerId=`, expects 201.
    pub async fn create_shop(
        &self,
        seller_id: UserId,
        request: &CreateShopRequest,
    ) -> Result<ShopResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .post("/shops")
                    .query(&[("sellerId", seller_id)])
                    .json(request),
                StatusCode::CREATED,
            )
            .await
    }

    pub async fn get_shop(&self, shop_id: ShopId) -> Result<ShopResponse, GatewayError> {
        self.gateway
            .expect_json(self.gateway.get(&format!("/shops/{}", shop_id)), StatusCode::OK)
            .await
    }

    pub async fn list_shops(&self, page: u32, page_size: u32) -> Result<Page<ShopResponse>, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .get("/shops")
                    .query(&[("page", page), ("pageSize", page_size)]),
                StatusCode::OK,
            )
            .await
    }

    pub async fn shop_products(
        &self,
        shop_id: ShopId,
        page: u32,
        page_size: u32,
    ) -> Result<Page<ProductResponse>, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .get(&format!("/shops/{}/products", shop_id))
                    .query(&[("page", page), ("pageSize", page_size)]),
                StatusCode::OK,
            )
            .await
    }

    /// `POST /products?sellerId=`, expects 201.
    pub async fn create_product(
        &self,
        seller_id: UserId,
        request: &CreateProductRequest,
    ) -> Result<ProductResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .post("/products")
                    .query(&[("sellerId", seller_id)])
                    .json(request),
                StatusCode::CREATED,
            )
            .await
    }

    pub async fn get_product(&self, product_id: ProductId) -> Result<ProductResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway.get(&format!("/products/{}", product_id)),
                StatusCode::OK,
            )
            .await
    }

    /// Status of `GET /products/{id}`, for existence and error-path checks.
    pub async fn get_product_status(&self, product_id: i64) -> Result<StatusCode, GatewayError> {
        self.gateway
            .status_of(self.gateway.get(&format!("/products/{}", product_id)))
            .await
    }

    pub async fn list_products(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Page<ProductResponse>, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .get("/products")
                    .query(&[("page", page), ("pageSize", page_size)]),
                StatusCode::OK,
            )
            .await
    }

    pub async fn search_products(
        &self,
        keywords: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<ProductResponse>, GatewayError> {
        let page = page.to_string();
        let page_size = page_size.to_string();
        self.gateway
            .expect_json(
                self.gateway.get("/products/search").query(&[
                    ("keywords", keywords),
                    ("page", page.as_str()),
                    ("pageSize", page_size.as_str()),
                ]),
                StatusCode::OK,
            )
            .await
    }

    pub async fn pending_products(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Page<ProductResponse>, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .get("/products/pending")
                    .query(&[("page", page), ("pageSize", page_size)]),
                StatusCode::OK,
            )
            .await
    }

    /// `PUT /products/{id}?userId=`, expects 200.
    pub async fn update_product(
        &self,
        product_id: ProductId,
        user_id: UserId,
        request: &UpdateProductRequest,
    ) -> Result<ProductResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .put(&format!("/products/{}", product_id))
                    .query(&[("userId", user_id)])
                    .json(request),
                StatusCode::OK,
            )
            .await
    }

    /// `DELETE /products/{id}?userId=`, expects 204.
    pub async fn delete_product(&self, product_id: ProductId, user_id: UserId) -> Result<(), GatewayError> {
        self.gateway
            .expect_status(
                self.gateway
                    .delete(&format!("/products/{}", product_id))
                    .query(&[("userId", user_id)]),
                StatusCode::NO_CONTENT,
            )
            .await
    }
}
