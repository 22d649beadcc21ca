//! Products & Pricing
//!
//! Shapes of the Creem product catalogue as the storefront consumes it.

use serde::{Deserialize, Serialize};

/// Billing discriminator carried by webhook payloads.
///
/// Only the exact string `"recurring"` is recurring; everything else is
/// treated as a one-time payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum BillingType {
    Recurring,
    OneTime,
}

impl BillingType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recurring => "recurring",
            Self::OneTime => "onetime",
        }
    }
}

impl Serialize for BillingType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<String> for BillingType {
    fn from(s: String) -> Self {
        if s == "recurring" { Self::Recurring } else { Self::OneTime }
    }
}

/// Recurring billing period, kept exactly as Creem sent it.
///
/// Pricing tables use short codes (`one-m`, `one-y`), the product API the
/// long ones (`every-month`, `every-year`). Both are relayed untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillingPeriod(String);

impl BillingPeriod {
    /// The code as received
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Human-readable label for pricing cards
    pub fn display(&self) -> &'static str {
        match self.0.as_str() {
            "every-three-months" | "three-m" => "Every 3 Months",
            "every-six-months" | "six-m" => "Every 6 Months",
            "every-year" | "one-y" => "Yearly",
            "once" => "One-time",
            _ => "Monthly",
        }
    }
}

impl From<String> for BillingPeriod {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A product in the Creem catalogue.
///
/// Only the fields the storefront reads are typed; everything else rides
/// along in `extra` so the catalogue is relayed as Creem returned it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Price in minor units (cents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,

    /// ISO currency code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_period: Option<BillingPeriod>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Product {
    pub fn is_recurring(&self) -> bool {
        self.billing_type.as_deref() == Some("recurring")
    }

    /// Price formatted for display, e.g. `$ 29.00`
    pub fn display_price(&self) -> String {
        crate::format::format_money(self.price, self.currency.as_deref())
    }
}

/// Pagination block of a product search
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub total_records: u64,
    pub total_pages: u64,
    pub current_page: u64,
    #[serde(default)]
    pub next_page: Option<u64>,
    #[serde(default)]
    pub prev_page: Option<u64>,
}

/// One page of products
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Page selector for product searches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default = "PageRequest::default_number")]
    pub page_number: u32,
    #[serde(default = "PageRequest::default_size")]
    pub page_size: u32,
}

impl PageRequest {
    /// Upper bound accepted for `page_size`
    pub const MAX_SIZE: u32 = 100;

    const fn default_number() -> u32 {
        1
    }

    const fn default_size() -> u32 {
        Self::MAX_SIZE
    }

    /// Clamp to values Creem accepts
    pub fn normalized(self) -> Self {
        Self {
            page_number: self.page_number.max(1),
            page_size: self.page_size.clamp(1, Self::MAX_SIZE),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_number: Self::default_number(),
            page_size: Self::default_size(),
        }
    }
}

/// Product as listed in a hosted pricing table
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PricingTableProduct {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_period: Option<BillingPeriod>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PricingTableProduct {
    /// Price formatted for display, e.g. `€ 9.00`
    pub fn display_price(&self) -> String {
        crate::format::format_money(self.price, self.currency.as_deref())
    }
}

/// Hosted pricing table
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PricingTable {
    pub id: String,

    #[serde(default)]
    pub products: Vec<PricingTableProduct>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_billing_type_discriminator() {
        let parse = |s: &str| serde_json::from_value::<BillingType>(json!(s)).unwrap();
        assert_eq!(parse("recurring"), BillingType::Recurring);
        assert_eq!(parse("onetime"), BillingType::OneTime);
        assert_eq!(parse("one-time"), BillingType::OneTime);
        assert_eq!(parse("Recurring"), BillingType::OneTime);
    }

    #[test]
    fn test_billing_period_display() {
        let period = |s: &str| BillingPeriod::from(s.to_string());
        assert_eq!(period("one-m").display(), "Monthly");
        assert_eq!(period("every-three-months").display(), "Every 3 Months");
        assert_eq!(period("six-m").display(), "Every 6 Months");
        assert_eq!(period("one-y").display(), "Yearly");
        assert_eq!(period("fortnightly").display(), "Monthly");
    }

    #[test]
    fn test_billing_period_keeps_code() {
        for code in ["one-y", "every-year", "three-m", "fortnightly"] {
            let period: BillingPeriod = serde_json::from_value(json!(code)).unwrap();
            assert_eq!(period.code(), code);
            assert_eq!(serde_json::to_value(&period).unwrap(), json!(code));
        }
    }

    #[test]
    fn test_product_page_parses_creem_payload() {
        let payload = json!({
            "items": [{
                "id": "prod_1",
                "name": "Pro",
                "description": "Everything",
                "price": 2900,
                "currency": "USD",
                "billing_type": "recurring",
                "billing_period": "every-month",
                "status": "active",
                "mode": "test",
                "created_at": "2024-11-05T10:00:00.000Z"
            }],
            "pagination": {
                "total_records": 1,
                "total_pages": 1,
                "current_page": 1,
                "next_page": null,
                "prev_page": null
            }
        });

        let page: ProductPage = serde_json::from_value(payload).unwrap();
        let product = &page.items[0];
        assert!(product.is_recurring());
        assert_eq!(product.billing_period.as_ref().map(BillingPeriod::code), Some("every-month"));
        assert_eq!(product.display_price(), "$ 29.00");
        assert_eq!(page.pagination.total_records, 1);
    }

    #[test]
    fn test_product_relayed_unchanged() {
        let raw = json!({
            "id": "prod_1",
            "object": "product",
            "name": "Pro",
            "price": 2900,
            "currency": "USD",
            "billing_type": "recurring",
            "billing_period": "every-year",
            "features": [{ "id": "feat_1", "description": "Priority support" }],
            "created_at": "2024-11-05T10:00:00.000Z"
        });

        let product: Product = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&product).unwrap(), raw);
    }

    #[test]
    fn test_product_with_sparse_fields() {
        let product: Product =
            serde_json::from_value(json!({ "id": "prod_2", "price": null, "currency": "USD" })).unwrap();
        assert!(!product.is_recurring());
        assert_eq!(product.display_price(), "$ 0.00");
        assert_eq!(
            serde_json::to_value(&product).unwrap(),
            json!({ "id": "prod_2", "currency": "USD" })
        );
    }

    #[test]
    fn test_page_request_normalized() {
        let page = PageRequest { page_number: 0, page_size: 500 }.normalized();
        assert_eq!(page, PageRequest { page_number: 1, page_size: 100 });
    }

    #[test]
    fn test_pricing_table_relayed_unchanged() {
        let raw = json!({
            "id": "pt_1",
            "storeId": "sto_1",
            "products": [
                {"id": "a", "name": "Starter", "price": 900, "currency": "EUR",
                 "billing_period": "one-m", "payment_type": "recurring",
                 "payment_link": "https://pay/a", "features": ["Docs"]},
                {"id": "b", "name": "Advanced", "price": 1900, "currency": "EUR",
                 "billing_period": "one-y", "payment_type": "recurring",
                 "payment_link": "https://pay/b", "featured": true,
                 "tax_behavior": "inclusive"}
            ]
        });

        let table: PricingTable = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(table.products[1].billing_period.as_ref().map(BillingPeriod::display), Some("Yearly"));
        assert_eq!(table.products[0].display_price(), "€ 9.00");
        assert_eq!(serde_json::to_value(&table).unwrap(), raw);
    }
}
