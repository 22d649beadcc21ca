//! Creem API Client
//!
//! `PaymentProvider` is the seam the server talks to; `CreemClient` is the
//! production implementation over `reqwest`.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::checkout::{CheckoutRequest, CheckoutSession, CustomerPortalLink, CustomerPortalRequest};
use crate::error::{PaymentError, Result};
use crate::product::{PageRequest, PricingTable, ProductPage};

const TEST_API_URL: &str = "https://test-api.creem.io";
const LIVE_API_URL: &str = "https://api.creem.io";

/// Creem environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CreemEnvironment {
    #[default]
    Test,
    Live,
}

impl CreemEnvironment {
    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Test => TEST_API_URL,
            Self::Live => LIVE_API_URL,
        }
    }
}

impl std::str::FromStr for CreemEnvironment {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Self::Test),
            "live" | "prod" | "production" => Ok(Self::Live),
            other => Err(PaymentError::Config(format!("unknown CREEM_ENV: {other}"))),
        }
    }
}

/// Creem client configuration
#[derive(Clone, Debug)]
pub struct CreemConfig {
    /// Secret API key (`x-api-key`)
    pub api_key: String,

    /// API base URL
    pub base_url: String,
}

impl CreemConfig {
    pub fn new(api_key: impl Into<String>, environment: CreemEnvironment) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: environment.base_url().into(),
        }
    }

    /// Create from an arbitrary variable source.
    ///
    /// Reads `CREEM_API_KEY`, `CREEM_ENV` and `CREEM_URL`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("CREEM_API_KEY")
            .ok_or_else(|| PaymentError::Config("CREEM_API_KEY not set".into()))?;
        let environment = non_empty("CREEM_ENV")
            .map(|env| env.parse::<CreemEnvironment>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            base_url: non_empty("CREEM_URL").unwrap_or_else(|| environment.base_url().into()),
            api_key,
        })
    }
}

/// Payment provider trait (Strategy pattern)
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// List catalogue products
    async fn search_products(&self, page: PageRequest) -> Result<ProductPage>;

    /// Create a hosted checkout session
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Generate a customer portal login link
    async fn customer_portal_link(&self, customer_id: &str) -> Result<String>;

    /// Cancel a subscription at the provider.
    ///
    /// The local row changes only when the `subscription.canceled` webhook
    /// arrives.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()>;

    /// Fetch a hosted pricing table
    async fn pricing_table(&self, table_id: &str) -> Result<PricingTable>;
}

/// Creem REST client
pub struct CreemClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl CreemClient {
    /// Create a new Creem client
    pub fn new(config: &CreemConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| PaymentError::Config(format!("invalid Creem URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PaymentError::Config(format!("invalid Creem URL: {base_url}")));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL; segments are percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header("x-api-key", &self.api_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(status, &response.text().await.unwrap_or_default());
            tracing::warn!(%method, path = url.path(), status = status.as_u16(), %message, "Creem request failed");
            return Err(PaymentError::Provider { status: status.as_u16(), message });
        }

        Ok(response.json().await?)
    }
}

/// Pull the human-readable message out of a Creem error body
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| match &v["message"] {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => v["error"].as_str().map(String::from),
    });

    message
        .filter(|m| !m.is_empty())
        .or_else(|| (!body.is_empty()).then(|| body.to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string())
}

#[async_trait]
impl PaymentProvider for CreemClient {
    async fn search_products(&self, page: PageRequest) -> Result<ProductPage> {
        let page = page.normalized();
        let mut url = self.endpoint(&["v1", "products", "search"]);
        url.query_pairs_mut()
            .append_pair("page_number", &page.page_number.to_string())
            .append_pair("page_size", &page.page_size.to_string());

        self.send::<(), _>(Method::GET, url, None).await
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let url = self.endpoint(&["v1", "checkouts"]);
        let session: CheckoutSession = self.send(Method::POST, url, Some(request)).await?;

        tracing::info!(
            checkout_id = %session.id,
            product_id = %request.product_id,
            "Created checkout session"
        );
        Ok(session)
    }

    async fn customer_portal_link(&self, customer_id: &str) -> Result<String> {
        let url = self.endpoint(&["v1", "customers", "billing"]);
        let body = CustomerPortalRequest { customer_id };
        let link: CustomerPortalLink = self.send(Method::POST, url, Some(&body)).await?;
        Ok(link.customer_portal_link)
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        let url = self.endpoint(&["v1", "subscriptions", subscription_id, "cancel"]);
        let _: serde_json::Value = self.send::<(), _>(Method::POST, url, None).await?;

        tracing::info!(subscription_id = %subscription_id, "Requested subscription cancellation");
        Ok(())
    }

    async fn pricing_table(&self, table_id: &str) -> Result<PricingTable> {
        let url = self.endpoint(&["v1", "pricing-table", table_id]);
        self.send::<(), _>(Method::GET, url, None).await
    }
}
