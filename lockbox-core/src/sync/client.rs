//! Remote webservice interface consumed by the sync engine and the session.
//!
//! Transport is not part of this crate. Implementations translate each call
//! into a request and report the HTTP status and decoded body back; a status
//! of `0` means the request never produced a response.

use crate::database::{Item, ItemAuthorization, User};
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::warn;

/// Status used for transport-level failures (no HTTP response)
pub const STATUS_TRANSPORT_FAILURE: u16 = 0;

/// Structured result of a single webservice call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebserviceResponse<T> {
    pub status: u16,
    pub body: Option<T>,
}

impl<T> WebserviceResponse<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    pub fn status(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn transport_failure() -> Self {
        Self::status(STATUS_TRANSPORT_FAILURE)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body of a successful call made during synchronization.
    ///
    /// Any non-success status or a missing body fails the pass for `entity`.
    pub fn into_sync_result(self, entity: &str) -> Result<T> {
        match (self.is_success(), self.body) {
            (true, Some(body)) => Ok(body),
            (true, None) => Err(Error::SynchronizationFailed {
                entity: entity.to_string(),
                reason: format!("status {} without a body", self.status),
            }),
            (false, _) => {
                warn!("Webservice call for {} failed with status {}", entity, self.status);
                Err(Error::SynchronizationFailed {
                    entity: entity.to_string(),
                    reason: format!("status {}", self.status),
                })
            }
        }
    }

    /// Body of a successful account-level request (token, registration,
    /// password change), mapping the REST-layer refusals to their own errors.
    pub fn into_request_result(self, entity: &str) -> Result<T> {
        match self.status {
            401 => Err(Error::RequestUnauthorized),
            403 => Err(Error::RequestForbidden),
            409 => Err(Error::RequestConflicted),
            _ => self.into_sync_result(entity),
        }
    }
}

/// Endpoints of the vault webservice.
///
/// Every authenticated call takes the bearer token returned by
/// [`get_token`](Webservice::get_token).
#[async_trait]
pub trait Webservice: Send + Sync {
    /// Exchange a username and the base64 local authentication hash for a token
    async fn get_token(
        &self,
        username: &str,
        authentication_hash: &str,
    ) -> WebserviceResponse<String>;

    /// Create a new account from a complete user row
    async fn register_user(&self, user: &User) -> WebserviceResponse<User>;

    async fn get_user_details(&self, token: &str, username: &str) -> WebserviceResponse<User>;
    async fn get_users(&self, token: &str) -> WebserviceResponse<Vec<User>>;
    async fn add_users(&self, token: &str, users: &[User]) -> WebserviceResponse<Vec<User>>;
    async fn update_users(&self, token: &str, users: &[User]) -> WebserviceResponse<Vec<User>>;

    async fn get_items(&self, token: &str) -> WebserviceResponse<Vec<Item>>;
    async fn add_items(&self, token: &str, items: &[Item]) -> WebserviceResponse<Vec<Item>>;
    async fn update_items(&self, token: &str, items: &[Item]) -> WebserviceResponse<Vec<Item>>;

    async fn get_item_authorizations(
        &self,
        token: &str,
    ) -> WebserviceResponse<Vec<ItemAuthorization>>;
    async fn add_item_authorizations(
        &self,
        token: &str,
        authorizations: &[ItemAuthorization],
    ) -> WebserviceResponse<Vec<ItemAuthorization>>;
    async fn update_item_authorizations(
        &self,
        token: &str,
        authorizations: &[ItemAuthorization],
    ) -> WebserviceResponse<Vec<ItemAuthorization>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_with_body() {
        let response = WebserviceResponse::ok(vec![1, 2, 3]);
        assert!(response.is_success());
        assert_eq!(response.into_sync_result("items").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_success_without_body_fails() {
        let response: WebserviceResponse<Vec<u8>> = WebserviceResponse::status(204);
        assert!(matches!(
            response.into_sync_result("items"),
            Err(Error::SynchronizationFailed { entity, .. }) if entity == "items"
        ));
    }

    #[test]
    fn test_transport_failure() {
        let response: WebserviceResponse<String> = WebserviceResponse::transport_failure();
        assert!(!response.is_success());
        assert!(matches!(
            response.into_sync_result("users"),
            Err(Error::SynchronizationFailed { .. })
        ));
    }

    #[test]
    fn test_request_status_mapping() {
        let unauthorized: WebserviceResponse<String> = WebserviceResponse::status(401);
        let forbidden: WebserviceResponse<String> = WebserviceResponse::status(403);
        let conflicted: WebserviceResponse<String> = WebserviceResponse::status(409);
        let server_error: WebserviceResponse<String> = WebserviceResponse::status(500);

        assert!(matches!(
            unauthorized.into_request_result("token"),
            Err(Error::RequestUnauthorized)
        ));
        assert!(matches!(
            forbidden.into_request_result("token"),
            Err(Error::RequestForbidden)
        ));
        assert!(matches!(
            conflicted.into_request_result("user"),
            Err(Error::RequestConflicted)
        ));
        assert!(matches!(
            server_error.into_request_result("user"),
            Err(Error::SynchronizationFailed { .. })
        ));
    }

    #[test]
    fn test_unauthorized_during_sync_is_sync_failure() {
        let response: WebserviceResponse<Vec<u8>> = WebserviceResponse::status(401);
        assert!(matches!(
            response.into_sync_result("items"),
            Err(Error::SynchronizationFailed { .. })
        ));
    }
}
