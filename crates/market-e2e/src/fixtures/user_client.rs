//! User service client fixture.

use super::gateway::{GatewayClient, GatewayError};
use crate::seed::{unique_token, UserId};
use crate::services::USER_SERVICE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Request body for `POST /users/register`.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterUserRequest {
    /// A registration with a collision-free username and email.
    pub fn unique(prefix: &str) -> Self {
        let username = format!("{}_{}", prefix, unique_token());
        Self {
            email: format!("{}@example.com", username),
            username,
            password: "Test12345!".to_string(),
            first_name: "New".to_string(),
            last_name: "User".to_string(),
        }
    }
}

impl std::fmt::Debug for RegisterUserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterUserRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

/// Request body for `PUT /users/me`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,
}

/// Client for the user service behind the gateway.
pub struct UserClient {
    gateway: GatewayClient,
}

impl UserClient {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            gateway: GatewayClient::new(gateway_url, &USER_SERVICE),
        }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// `POST /users/register`, expects 201.
    pub async fn register(&self, request: &RegisterUserRequest) -> Result<UserResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway.post("/users/register").json(request),
                StatusCode::CREATED,
            )
            .await
    }

    /// `GET /users/{id}`, expects 200.
    pub async fn get(&self, user_id: UserId) -> Result<UserResponse, GatewayError> {
        self.gateway
            .expect_json(self.gateway.get(&format!("/users/{}", user_id)), StatusCode::OK)
            .await
    }

    /// Status of `GET /users/{id}`, for existence checks.
    pub async fn get_status(&self, user_id: UserId) -> Result<StatusCode, GatewayError> {
        self.gateway
            .status_of(self.gateway.get(&format!("/users/{}", user_id)))
            .await
    }

    /// `GET /users/username/{username}`, expects 200.
    pub async fn get_by_username(&self, username: &str) -> Result<UserResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway.get(&format!("/users/username/{}", username)),
                StatusCode::OK,
            )
            .await
    }

    /// `GET /users/me?userId=`, expects 200.
    pub async fn me(&self, user_id: UserId) -> Result<UserResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway.get("/users/me").query(&[("userId", user_id)]),
                StatusCode::OK,
            )
            .await
    }

    /// `PUT /users/me?userId=`, expects 200.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        request: &UpdateProfileRequest,
    ) -> Result<UserResponse, GatewayError> {
        self.gateway
            .expect_json(
                self.gateway
                    .put("/users/me")
                    .query(&[("userId", user_id)])
                    .json(request),
                StatusCode::OK,
            )
            .await
    }

    /// `DELETE /users/{id}`, expects 204.
    pub async fn delete(&self, user_id: UserId) -> Result<(), GatewayError> {
        self.gateway
            .expect_status(
                self.gateway.delete(&format!("/users/{}", user_id)),
                StatusCode::NO_CONTENT,
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
    fn test_register_request_serializes_camel_case() {
        let request = RegisterUserRequest::unique("newuser");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["firstName"], "New");
        assert_eq!(json["lastName"], "User");
        assert!(json["username"].as_str().unwrap().starts_with("newuser_"));
    }

    #[test]
    fn test_register_request_debug_redacts_password() {
        let request = RegisterUserRequest::unique("newuser");
        let debug_output = format!("{:?}", request);

        assert!(!debug_output.contains("Test12345!"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains(&request.username));
    }

    #[test]
    fn test_user_response_without_optional_fields() {
        let user: UserResponse =
            serde_json::from_str(r#"{"id": 12, "username": "u", "email": "u@example.com"}"#).unwrap();
        assert_eq!(user.id, UserId(12));
        assert!(user.roles.is_empty());
        assert_eq!(user.first_name, None);
    }

    #[tokio::test]
    async fn test_me_sends_user_id_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user-service/api/users/me"))
            .and(query_param("userId", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 42,
                "username": "e2e_user_abc",
                "email": "e2e_user_abc@example.com"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let me = UserClient::new(&mock_server.uri()).me(UserId(42)).await.unwrap();
        assert_eq!(me.id, UserId(42));
    }

    #[tokio::test]
    async fn test_delete_requires_no_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/user-service/api/users/9"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let result = UserClient::new(&mock_server.uri()).delete(UserId(9)).await;
        assert!(matches!(
            result,
            Err(GatewayError::UnexpectedStatus { expected: 204, status: 200, .. })
        ));
    }
}
