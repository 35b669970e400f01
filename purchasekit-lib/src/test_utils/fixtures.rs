//! Raw payload fixtures mirroring what the native bridges emit.

use crate::provider::{RawProduct, RawPurchase, RawPurchaseError};
use chrono::Utc;
use serde_json::json;

/// Collection of commonly used test fixtures.
pub struct TestFixtures;

impl TestFixtures {
    /// One-time product skus used across tests.
    pub const IN_APP_SKUS: &'static [&'static str] = &[
        "dev.purchasekit.coins.100",
        "dev.purchasekit.coins.500",
        "dev.purchasekit.premium.unlock",
    ];

    /// Subscription skus used across tests.
    pub const SUBSCRIPTION_SKUS: &'static [&'static str] = &[
        "dev.purchasekit.premium.monthly",
        "dev.purchasekit.premium.yearly",
    ];

    /// Get an in-app sku.
    pub fn in_app_sku(index: usize) -> &'static str {
        Self::IN_APP_SKUS[index % Self::IN_APP_SKUS.len()]
    }

    /// Get a subscription sku.
    pub fn subscription_sku(index: usize) -> &'static str {
        Self::SUBSCRIPTION_SKUS[index % Self::SUBSCRIPTION_SKUS.len()]
    }
}

/// Current time in epoch milliseconds, as the bridges report timestamps.
pub fn now_millis() -> f64 {
    Utc::now().timestamp_millis() as f64
}

/// A StoreKit one-time product payload.
pub fn ios_product(sku: &str) -> RawProduct {
    RawProduct {
        id: sku.to_string(),
        title: format!("{sku} title"),
        description: format!("{sku} description"),
        product_type: Some("in-app".to_string()),
        platform: Some("ios".to_string()),
        display_name_ios: Some(format!("{sku} display name")),
        display_price: Some("$0.99".to_string()),
        currency: Some("USD".to_string()),
        price: Some(0.99),
        is_family_shareable_ios: Some(false),
        type_ios: Some("CONSUMABLE".to_string()),
        ..RawProduct::default()
    }
}

/// A StoreKit auto-renewable subscription payload.
pub fn ios_subscription(sku: &str) -> RawProduct {
    RawProduct {
        id: sku.to_string(),
        title: format!("{sku} title"),
        description: format!("{sku} description"),
        product_type: Some("subs".to_string()),
        platform: Some("ios".to_string()),
        display_name_ios: Some(format!("{sku} display name")),
        display_price: Some("$9.99".to_string()),
        currency: Some("USD".to_string()),
        price: Some(9.99),
        type_ios: Some("AUTO_RENEWABLE_SUBSCRIPTION".to_string()),
        subscription_period_unit_ios: Some("MONTH".to_string()),
        subscription_period_number_of_units_ios: Some(json!(1)),
        ..RawProduct::default()
    }
}

/// A Play Billing one-time product payload.
pub fn android_product(sku: &str) -> RawProduct {
    RawProduct {
        id: sku.to_string(),
        title: format!("{sku} title"),
        description: format!("{sku} description"),
        product_type: Some("in-app".to_string()),
        platform: Some("android".to_string()),
        name_android: Some(format!("{sku} name")),
        display_price: Some("$0.99".to_string()),
        currency: Some("USD".to_string()),
        price: Some(0.99),
        one_time_purchase_offer_details_android: Some(json!({
            "formattedPrice": "$0.99",
            "priceCurrencyCode": "USD",
            "priceAmountMicros": "990000"
        })),
        ..RawProduct::default()
    }
}

/// A Play Billing subscription payload with one base-plan offer.
pub fn android_subscription(sku: &str) -> RawProduct {
    RawProduct {
        id: sku.to_string(),
        title: format!("{sku} title"),
        description: format!("{sku} description"),
        product_type: Some("subs".to_string()),
        platform: Some("android".to_string()),
        name_android: Some(format!("{sku} name")),
        display_price: Some("$9.99".to_string()),
        currency: Some("USD".to_string()),
        price: Some(9.99),
        subscription_offer_details_android: Some(json!([{
            "basePlanId": "monthly",
            "offerToken": format!("offer-token-{sku}"),
            "offerTags": [],
            "pricingPhases": {
                "pricingPhaseList": [{
                    "billingCycleCount": 0,
                    "billingPeriod": "P1M",
                    "formattedPrice": "$9.99",
                    "priceAmountMicros": "9990000",
                    "priceCurrencyCode": "USD",
                    "recurrenceMode": 1
                }]
            }
        }])),
        ..RawProduct::default()
    }
}

/// A finished StoreKit transaction payload.
pub fn ios_purchase(transaction_id: &str, sku: &str) -> RawPurchase {
    RawPurchase {
        id: Some(transaction_id.to_string()),
        product_id: Some(sku.to_string()),
        transaction_date: Some(now_millis()),
        purchase_state: Some(json!("purchased")),
        quantity: Some(1),
        platform: Some("ios".to_string()),
        environment_ios: Some("Production".to_string()),
        ..RawPurchase::default()
    }
}

/// A StoreKit subscription transaction expiring `expires_in_ms` from now
/// (negative values produce an already-expired transaction).
pub fn ios_subscription_purchase(transaction_id: &str, sku: &str, expires_in_ms: i64) -> RawPurchase {
    RawPurchase {
        id: Some(transaction_id.to_string()),
        product_id: Some(sku.to_string()),
        transaction_date: Some(now_millis()),
        purchase_state: Some(json!("purchased")),
        is_auto_renewing: Some(true),
        platform: Some("ios".to_string()),
        expiration_date_ios: Some(now_millis() + expires_in_ms as f64),
        environment_ios: Some("Production".to_string()),
        ..RawPurchase::default()
    }
}

/// A purchased Play Billing transaction payload.
pub fn android_purchase(order_id: &str, sku: &str) -> RawPurchase {
    RawPurchase {
        id: Some(order_id.to_string()),
        product_id: Some(sku.to_string()),
        transaction_date: Some(now_millis()),
        purchase_state: Some(json!("purchased")),
        purchase_token: Some(format!("token-{order_id}")),
        quantity: Some(1),
        platform: Some("android".to_string()),
        purchase_state_android: Some(json!(1)),
        is_acknowledged_android: Some(false),
        package_name_android: Some("dev.purchasekit.testapp".to_string()),
        ..RawPurchase::default()
    }
}

/// A Play Billing subscription transaction payload.
pub fn android_subscription_purchase(order_id: &str, sku: &str, auto_renewing: bool) -> RawPurchase {
    RawPurchase {
        auto_renewing_android: Some(auto_renewing),
        is_auto_renewing: Some(auto_renewing),
        ..android_purchase(order_id, sku)
    }
}

/// A purchase failure payload with the given native code.
pub fn purchase_error(code: &str, sku: &str) -> RawPurchaseError {
    RawPurchaseError {
        code: Some(code.to_string()),
        message: Some(format!("native failure: {code}")),
        product_id: Some(sku.to_string()),
    }
}
