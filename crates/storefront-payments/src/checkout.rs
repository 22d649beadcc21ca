//! Creem Checkout Types
//!
//! Hosted checkout: the storefront asks Creem for a session, redirects the
//! user to `checkout_url`, and learns about the payment later through the
//! `checkout.completed` / `subscription.paid` webhooks.

use serde::{Deserialize, Serialize};
use storefront_core::UserSession;

/// Metadata echoed back in webhook payloads
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    pub email: String,
    pub name: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Request to create a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Product to purchase
    pub product_id: String,

    /// Echoed as `object.request_id` on `checkout.completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// URL to redirect after successful payment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CheckoutMetadata>,
}

impl CheckoutRequest {
    /// Checkout for the signed-in user.
    ///
    /// The user id goes into both `request_id` and the metadata so one-time
    /// and recurring webhooks can be attributed.
    pub fn for_user(
        product_id: impl Into<String>,
        user: &UserSession,
        success_url: Option<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            request_id: Some(user.user_id.clone()),
            success_url,
            metadata: Some(CheckoutMetadata {
                email: user.email.clone(),
                name: user.name.clone(),
                user_id: user.user_id.clone(),
            }),
        }
    }
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Creem checkout id
    pub id: String,

    /// URL to redirect user to
    pub checkout_url: String,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub mode: Option<String>,

    #[serde(default)]
    pub success_url: Option<String>,
}

/// Body of a customer portal request
#[derive(Clone, Debug, Serialize)]
pub(crate) struct CustomerPortalRequest<'a> {
    pub customer_id: &'a str,
}

/// Customer portal login link
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct CustomerPortalLink {
    pub customer_portal_link: String,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_checkout_request_for_user() {
        let user = UserSession::new("user_42", "ada@example.com", "Ada", Duration::hours(1));
        let request = CheckoutRequest::for_user("prod_1", &user, Some("https://shop/ok".into()));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["product_id"], "prod_1");
        assert_eq!(json["request_id"], "user_42");
        assert_eq!(json["success_url"], "https://shop/ok");
        assert_eq!(json["metadata"]["userId"], "user_42");
        assert_eq!(json["metadata"]["email"], "ada@example.com");
    }

    #[test]
    fn test_checkout_request_omits_missing_success_url() {
        let user = UserSession::new("user_42", "ada@example.com", "Ada", Duration::hours(1));
        let json = serde_json::to_value(CheckoutRequest::for_user("prod_1", &user, None)).unwrap();
        assert!(json.get("success_url").is_none());
    }
}
