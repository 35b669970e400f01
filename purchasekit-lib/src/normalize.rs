//! Payload normalization.
//!
//! The native bridges disagree about spellings, number/string typing and
//! whether nested payloads arrive parsed or JSON-encoded. Everything here is
//! total: malformed input degrades to a safe default with a warning, it never
//! panics and never errors. Consumers downstream of this module only see the
//! canonical shapes.

use crate::errors::{ErrorCode, PurchaseError};
use crate::product::{
    DiscountIos, OneTimePurchaseOfferDetailsAndroid, PaymentModeIos, PricingPhaseAndroid,
    PricingPhasesAndroid, Product, ProductAndroid, ProductCommon, ProductIos, ProductType,
    ProductTypeIos, SubscriptionOfferDetailsAndroid, SubscriptionPeriodIos,
};
use crate::provider::{
    RawActiveSubscription, RawProduct, RawPurchase, RawPurchaseError, RawSubscriptionStatus,
};
use crate::purchase::{
    ActiveSubscription, Purchase, PurchaseAndroid, PurchaseCommon, PurchaseIos, PurchaseOfferIos,
    PurchaseState, RenewalInfoIos, SubscriptionStateIos, SubscriptionStatusIos,
};
use crate::IapPlatform;
use serde_json::{Map, Value};
use tracing::warn;

/// Convert a raw product payload into the typed model.
pub fn normalize_product(raw: RawProduct) -> Product {
    let platform = IapPlatform::from_tag(raw.platform.as_deref().unwrap_or_default());
    let product_type = ProductType::from_tag(raw.product_type.as_deref().unwrap_or_default());
    let common = build_product_common(&raw, product_type);

    match platform {
        IapPlatform::Ios => Product::Ios(normalize_product_ios(common, &raw)),
        IapPlatform::Android => Product::Android(normalize_product_android(common, &raw)),
    }
}

/// Convert a raw purchase payload into the typed model.
pub fn normalize_purchase(raw: RawPurchase) -> Purchase {
    let platform = IapPlatform::from_tag(raw.platform.as_deref().unwrap_or_default());
    let common = build_purchase_common(&raw);

    match platform {
        IapPlatform::Ios => Purchase::Ios(PurchaseIos {
            common,
            quantity_ios: raw.quantity_ios,
            original_transaction_date_ios: raw.original_transaction_date_ios.map(millis_to_i64),
            original_transaction_identifier_ios: raw.original_transaction_identifier_ios.clone(),
            app_account_token: none_if_empty(raw.app_account_token.clone()),
            expiration_date_ios: raw.expiration_date_ios.map(millis_to_i64),
            environment_ios: none_if_empty(raw.environment_ios.clone()),
            ownership_type_ios: none_if_empty(raw.ownership_type_ios.clone()),
            revocation_date_ios: raw.revocation_date_ios.map(millis_to_i64),
            revocation_reason_ios: raw.revocation_reason_ios.as_ref().and_then(value_to_string),
            offer_ios: raw.offer_ios.as_ref().and_then(parse_purchase_offer),
            currency_code_ios: none_if_empty(raw.currency_code_ios.clone()),
            renewal_info_ios: raw.renewal_info_ios.as_ref().and_then(parse_renewal_info),
        }),
        IapPlatform::Android => Purchase::Android(PurchaseAndroid {
            common,
            purchase_token_android: none_if_empty(raw.purchase_token_android.clone()),
            data_android: none_if_empty(raw.data_android.clone()),
            signature_android: none_if_empty(raw.signature_android.clone()),
            auto_renewing_android: raw.auto_renewing_android,
            purchase_state_android: raw
                .purchase_state_android
                .as_ref()
                .and_then(value_to_i64)
                .map(|code| code as i32),
            is_acknowledged_android: raw.is_acknowledged_android,
            package_name_android: none_if_empty(raw.package_name_android.clone()),
            obfuscated_account_id_android: none_if_empty(raw.obfuscated_account_id_android.clone()),
            obfuscated_profile_id_android: none_if_empty(raw.obfuscated_profile_id_android.clone()),
            developer_payload_android: none_if_empty(raw.developer_payload_android.clone()),
        }),
    }
}

/// Convert a raw purchase failure into the normalized error.
pub fn normalize_purchase_error(raw: RawPurchaseError) -> PurchaseError {
    let code = raw
        .code
        .as_deref()
        .map(ErrorCode::from_native)
        .unwrap_or(ErrorCode::Unknown);
    PurchaseError {
        code,
        message: raw
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Unknown purchase error".to_string()),
        product_id: none_if_empty(raw.product_id),
    }
}

/// Convert a precomputed active-subscription entry into the typed model.
///
/// Bridges only report subscriptions the user currently holds, so a missing
/// `isActive` defaults to true.
pub fn normalize_active_subscription(raw: RawActiveSubscription) -> ActiveSubscription {
    ActiveSubscription {
        product_id: raw.product_id,
        is_active: raw.is_active.unwrap_or(true),
        transaction_id: raw.transaction_id.unwrap_or_default(),
        transaction_date: raw.transaction_date.map(millis_to_i64).unwrap_or(0),
        purchase_token: none_if_empty(raw.purchase_token),
        expiration_date_ios: raw.expiration_date_ios.map(millis_to_i64),
        environment_ios: none_if_empty(raw.environment_ios),
        auto_renewing_android: raw.auto_renewing_android,
        will_expire_soon: raw.will_expire_soon,
        days_until_expiration_ios: raw.days_until_expiration_ios.map(|d| d.round() as i64),
    }
}

/// Convert a raw StoreKit subscription status into the typed model.
pub fn normalize_subscription_status(raw: RawSubscriptionStatus) -> SubscriptionStatusIos {
    let state = match raw.state.as_ref() {
        Some(Value::String(tag)) => SubscriptionStateIos::from_tag(tag),
        Some(Value::Number(n)) => SubscriptionStateIos::from_code(n.as_i64().unwrap_or(0)),
        Some(other) => {
            warn!(state = %other, "unrecognized subscription state payload");
            SubscriptionStateIos::Expired
        }
        None => SubscriptionStateIos::Expired,
    };
    SubscriptionStatusIos {
        state,
        renewal_info: raw.renewal_info.as_ref().and_then(parse_renewal_info),
    }
}

/// Minimal integrity check for a normalized product.
pub fn validate_product(product: &Product) -> bool {
    let common = product.common();
    !common.id.is_empty() && !common.title.is_empty() && !common.description.is_empty()
}

/// Minimal integrity check for a normalized purchase.
pub fn validate_purchase(purchase: &Purchase) -> bool {
    let common = purchase.common();
    !common.id.is_empty() && !common.product_id.is_empty() && common.transaction_date != 0
}

/// Normalize a batch of raw products, dropping entries that fail validation.
pub fn normalize_products(raw: Vec<RawProduct>) -> Vec<Product> {
    raw.into_iter()
        .map(normalize_product)
        .filter(|product| {
            let valid = validate_product(product);
            if !valid {
                warn!(id = product.id(), "dropping invalid product payload");
            }
            valid
        })
        .collect()
}

/// Normalize a batch of raw purchases, dropping entries that fail validation.
pub fn normalize_purchases(raw: Vec<RawPurchase>) -> Vec<Purchase> {
    raw.into_iter()
        .map(normalize_purchase)
        .filter(|purchase| {
            let valid = validate_purchase(purchase);
            if !valid {
                warn!(id = purchase.id(), "dropping invalid purchase payload");
            }
            valid
        })
        .collect()
}

/// Resolve the token used to finalize an Android transaction.
///
/// Checks, in order: the unified `purchaseToken`, `purchaseTokenAndroid`, a
/// `purchaseToken` field inside the `dataAndroid` receipt JSON, then the same
/// field inside `transactionReceipt`. First non-empty match wins.
pub fn resolve_android_purchase_token(purchase: &PurchaseAndroid) -> Option<String> {
    non_empty_owned(purchase.common.purchase_token.as_deref())
        .or_else(|| non_empty_owned(purchase.purchase_token_android.as_deref()))
        .or_else(|| {
            purchase
                .data_android
                .as_deref()
                .and_then(token_from_receipt_json)
        })
        .or_else(|| {
            purchase
                .common
                .transaction_receipt
                .as_deref()
                .and_then(token_from_receipt_json)
        })
}

/// Extract a `purchaseToken` field from a JSON-encoded receipt string.
pub fn token_from_receipt_json(receipt: &str) -> Option<String> {
    let value: Value = serde_json::from_str(receipt).ok()?;
    non_empty_owned(value.get("purchaseToken").and_then(Value::as_str))
}

fn build_product_common(raw: &RawProduct, product_type: ProductType) -> ProductCommon {
    ProductCommon {
        id: raw.id.clone(),
        title: raw.title.clone(),
        description: raw.description.clone(),
        product_type,
        display_price: raw
            .display_price
            .clone()
            .or_else(|| raw.localized_price.clone())
            .unwrap_or_default(),
        currency: raw.currency.clone().unwrap_or_default(),
        price: raw.price,
        debug_description: none_if_empty(raw.debug_description.clone()),
    }
}

fn normalize_product_ios(common: ProductCommon, raw: &RawProduct) -> ProductIos {
    let type_ios = match raw.type_ios.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(tag) => ProductTypeIos::from_tag(tag),
        // Absent type: derive the closest category from the cross-platform type
        None => match common.product_type {
            ProductType::Subs => ProductTypeIos::AutoRenewableSubscription,
            ProductType::InApp => ProductTypeIos::NonConsumable,
        },
    };

    ProductIos {
        display_name_ios: raw
            .display_name_ios
            .clone()
            .or_else(|| raw.display_name.clone())
            .unwrap_or_else(|| common.title.clone()),
        is_family_shareable_ios: raw.is_family_shareable_ios.unwrap_or(false),
        type_ios,
        introductory_price_ios: none_if_empty(raw.introductory_price_ios.clone()),
        introductory_price_as_amount_ios: none_if_empty(
            raw.introductory_price_as_amount_ios.clone(),
        ),
        introductory_price_payment_mode_ios: raw
            .introductory_price_payment_mode_ios
            .as_deref()
            .map(PaymentModeIos::from_tag),
        introductory_price_number_of_periods_ios: raw
            .introductory_price_number_of_periods_ios
            .as_ref()
            .and_then(value_to_string),
        introductory_price_subscription_period_ios: raw
            .introductory_price_subscription_period_ios
            .as_deref()
            .and_then(SubscriptionPeriodIos::from_tag),
        subscription_period_number_of_units_ios: raw
            .subscription_period_number_of_units_ios
            .as_ref()
            .and_then(value_to_string),
        subscription_period_unit_ios: raw
            .subscription_period_unit_ios
            .as_deref()
            .and_then(SubscriptionPeriodIos::from_tag),
        discounts_ios: raw.discounts_ios.as_ref().and_then(parse_discounts),
        common,
    }
}

fn normalize_product_android(common: ProductCommon, raw: &RawProduct) -> ProductAndroid {
    ProductAndroid {
        name_android: raw
            .name_android
            .clone()
            .or_else(|| raw.display_name.clone())
            .unwrap_or_else(|| common.title.clone()),
        one_time_purchase_offer_details_android: raw
            .one_time_purchase_offer_details_android
            .as_ref()
            .and_then(decode_nested)
            .as_ref()
            .and_then(parse_one_time_offer),
        subscription_offer_details_android: parse_subscription_offers(
            raw.subscription_offer_details_android.as_ref(),
        ),
        common,
    }
}

fn build_purchase_common(raw: &RawPurchase) -> PurchaseCommon {
    // Cross-platform state first; when it stays unknown fall back to the
    // numeric Play state.
    let mut state = raw
        .purchase_state
        .as_ref()
        .map(resolve_state_value)
        .unwrap_or(PurchaseState::Unknown);
    if state == PurchaseState::Unknown {
        if let Some(code) = raw.purchase_state_android.as_ref().and_then(value_to_i64) {
            state = PurchaseState::from_android_code(code);
        }
    }

    PurchaseCommon {
        id: raw.id.clone().unwrap_or_default(),
        product_id: raw.product_id.clone().unwrap_or_default(),
        ids: raw.ids.clone(),
        transaction_date: raw.transaction_date.map(millis_to_i64).unwrap_or(0),
        transaction_receipt: none_if_empty(raw.transaction_receipt.clone()),
        purchase_token: none_if_empty(raw.purchase_token.clone()),
        quantity: raw.quantity.unwrap_or(1),
        purchase_state: state,
        is_auto_renewing: raw
            .is_auto_renewing
            .or(raw.auto_renewing_android)
            .unwrap_or(false),
    }
}

fn resolve_state_value(value: &Value) -> PurchaseState {
    match value {
        Value::String(tag) => PurchaseState::from_tag(tag),
        Value::Number(n) => PurchaseState::from_android_code(n.as_i64().unwrap_or(-1)),
        other => {
            warn!(state = %other, "unrecognized purchase state payload");
            PurchaseState::Unknown
        }
    }
}

/// Decode a nested payload that may arrive parsed or as a JSON-encoded string.
fn decode_nested(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => match serde_json::from_str(s) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("discarding undecodable nested payload");
                None
            }
        },
        other => Some(other.clone()),
    }
}

fn parse_discounts(value: &Value) -> Option<Vec<DiscountIos>> {
    let decoded = decode_nested(value)?;
    let array = decoded.as_array()?;
    Some(array.iter().filter_map(parse_discount).collect())
}

fn parse_discount(value: &Value) -> Option<DiscountIos> {
    let obj = value.as_object()?;
    Some(DiscountIos {
        identifier: str_field(obj, "identifier")?,
        discount_type: str_field(obj, "type").unwrap_or_default(),
        number_of_periods: obj
            .get("numberOfPeriods")
            .and_then(value_to_string)
            .unwrap_or_default(),
        price: obj
            .get("price")
            .and_then(value_to_string)
            .unwrap_or_default(),
        localized_price: str_field(obj, "localizedPrice").unwrap_or_default(),
        payment_mode: PaymentModeIos::from_tag(&str_field(obj, "paymentMode").unwrap_or_default()),
        subscription_period: str_field(obj, "subscriptionPeriod").unwrap_or_default(),
    })
}

fn parse_one_time_offer(value: &Value) -> Option<OneTimePurchaseOfferDetailsAndroid> {
    let obj = value.as_object()?;
    Some(OneTimePurchaseOfferDetailsAndroid {
        formatted_price: str_field(obj, "formattedPrice").unwrap_or_default(),
        price_currency_code: str_field(obj, "priceCurrencyCode").unwrap_or_default(),
        price_amount_micros: obj
            .get("priceAmountMicros")
            .and_then(value_to_string)
            .unwrap_or_default(),
    })
}

/// Parse Play subscription offer details. Absent or malformed input yields
/// an empty list so the field is always an array downstream.
fn parse_subscription_offers(value: Option<&Value>) -> Vec<SubscriptionOfferDetailsAndroid> {
    let Some(value) = value else {
        return Vec::new();
    };
    let Some(decoded) = decode_nested(value) else {
        return Vec::new();
    };
    let Some(array) = decoded.as_array() else {
        warn!("subscription offer details payload is not an array");
        return Vec::new();
    };
    array.iter().filter_map(parse_subscription_offer).collect()
}

fn parse_subscription_offer(value: &Value) -> Option<SubscriptionOfferDetailsAndroid> {
    let obj = value.as_object()?;
    Some(SubscriptionOfferDetailsAndroid {
        base_plan_id: str_field(obj, "basePlanId").unwrap_or_default(),
        offer_id: str_field(obj, "offerId"),
        offer_tags: obj
            .get("offerTags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(value_to_string).collect())
            .unwrap_or_default(),
        offer_token: str_field(obj, "offerToken").unwrap_or_default(),
        pricing_phases: obj
            .get("pricingPhases")
            .map(parse_pricing_phases)
            .unwrap_or_default(),
    })
}

fn parse_pricing_phases(value: &Value) -> PricingPhasesAndroid {
    let list = value
        .get("pricingPhaseList")
        .and_then(Value::as_array)
        .map(|phases| phases.iter().filter_map(parse_pricing_phase).collect())
        .unwrap_or_default();
    PricingPhasesAndroid {
        pricing_phase_list: list,
    }
}

fn parse_pricing_phase(value: &Value) -> Option<PricingPhaseAndroid> {
    let obj = value.as_object()?;
    Some(PricingPhaseAndroid {
        billing_cycle_count: obj
            .get("billingCycleCount")
            .and_then(value_to_i64)
            .unwrap_or(0) as i32,
        billing_period: str_field(obj, "billingPeriod").unwrap_or_default(),
        formatted_price: str_field(obj, "formattedPrice").unwrap_or_default(),
        price_amount_micros: obj
            .get("priceAmountMicros")
            .and_then(value_to_string)
            .unwrap_or_default(),
        price_currency_code: str_field(obj, "priceCurrencyCode").unwrap_or_default(),
        recurrence_mode: obj
            .get("recurrenceMode")
            .and_then(value_to_i64)
            .unwrap_or(0) as i32,
    })
}

fn parse_purchase_offer(value: &Value) -> Option<PurchaseOfferIos> {
    let decoded = decode_nested(value)?;
    let obj = decoded.as_object()?;
    Some(PurchaseOfferIos {
        id: str_field(obj, "id").unwrap_or_default(),
        offer_type: str_field(obj, "type").unwrap_or_default(),
        payment_mode: str_field(obj, "paymentMode").unwrap_or_default(),
    })
}

fn parse_renewal_info(value: &Value) -> Option<RenewalInfoIos> {
    let decoded = decode_nested(value)?;
    let obj = decoded.as_object()?;
    Some(RenewalInfoIos {
        auto_renew_preference: str_field(obj, "autoRenewPreference"),
        will_auto_renew: obj
            .get("willAutoRenew")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        renewal_date: obj
            .get("renewalDate")
            .and_then(Value::as_f64)
            .map(millis_to_i64),
        json_representation: str_field(obj, "jsonRepresentation"),
    })
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    non_empty_owned(obj.get(key).and_then(Value::as_str))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn millis_to_i64(millis: f64) -> i64 {
    millis.round() as i64
}

fn none_if_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn non_empty_owned(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_purchase(value: Value) -> RawPurchase {
        serde_json::from_value(value).unwrap()
    }

    fn raw_product(value: Value) -> RawProduct {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_restored_state_collapses_to_purchased() {
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "txn-1",
            "productId": "dev.premium",
            "transactionDate": 1_700_000_000_000.0,
            "purchaseState": "RESTORED",
            "platform": "ios"
        })));

        assert_eq!(purchase.purchase_state(), PurchaseState::Purchased);
        assert_eq!(purchase.platform(), IapPlatform::Ios);
    }

    #[test]
    fn test_deferred_state_collapses_to_pending() {
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "txn-2",
            "productId": "dev.premium",
            "transactionDate": 1_700_000_000_000.0,
            "purchaseState": "deferred",
            "platform": "ios"
        })));

        assert_eq!(purchase.purchase_state(), PurchaseState::Pending);
    }

    #[test]
    fn test_numeric_android_state_re_resolution() {
        // No cross-platform state at all: the numeric Play state decides
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "order-1",
            "productId": "coins",
            "transactionDate": 1_700_000_000_000.0,
            "purchaseStateAndroid": 2,
            "platform": "android"
        })));
        assert_eq!(purchase.purchase_state(), PurchaseState::Pending);

        // Unknown cross-platform state also defers to the numeric one
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "order-2",
            "productId": "coins",
            "transactionDate": 1_700_000_000_000.0,
            "purchaseState": "unknown",
            "purchaseStateAndroid": 1,
            "platform": "android"
        })));
        assert_eq!(purchase.purchase_state(), PurchaseState::Purchased);

        // A resolved cross-platform state wins over the numeric one
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "order-3",
            "productId": "coins",
            "transactionDate": 1_700_000_000_000.0,
            "purchaseState": "purchased",
            "purchaseStateAndroid": 2,
            "platform": "android"
        })));
        assert_eq!(purchase.purchase_state(), PurchaseState::Purchased);
    }

    #[test]
    fn test_platform_defaults_to_android() {
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "x",
            "productId": "y",
            "transactionDate": 1.0,
            "platform": "web"
        })));
        assert_eq!(purchase.platform(), IapPlatform::Android);

        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "x",
            "productId": "y",
            "transactionDate": 1.0
        })));
        assert_eq!(purchase.platform(), IapPlatform::Android);
    }

    #[test]
    fn test_purchase_defaults() {
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "txn",
            "productId": "sku",
            "transactionDate": 1_700_000_000_123.4,
            "platform": "ios"
        })));

        let common = purchase.common();
        assert_eq!(common.quantity, 1);
        assert_eq!(common.transaction_date, 1_700_000_000_123);
        assert_eq!(common.purchase_state, PurchaseState::Unknown);
        assert!(!common.is_auto_renewing);
        assert!(common.purchase_token.is_none());
    }

    #[test]
    fn test_auto_renewing_falls_back_to_android_flag() {
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "order",
            "productId": "premium_monthly",
            "transactionDate": 1.0,
            "autoRenewingAndroid": true,
            "platform": "android"
        })));
        assert!(purchase.is_auto_renewing());
    }

    #[test]
    fn test_token_chain_order() {
        // Unified token wins over everything
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "o1",
            "productId": "p",
            "transactionDate": 1.0,
            "purchaseToken": "unified",
            "purchaseTokenAndroid": "android-specific",
            "platform": "android"
        })));
        let android = purchase.as_android().unwrap();
        assert_eq!(
            resolve_android_purchase_token(android).as_deref(),
            Some("unified")
        );

        // Then the Android-specific field
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "o2",
            "productId": "p",
            "transactionDate": 1.0,
            "purchaseTokenAndroid": "android-specific",
            "platform": "android"
        })));
        assert_eq!(
            resolve_android_purchase_token(purchase.as_android().unwrap()).as_deref(),
            Some("android-specific")
        );
    }

    #[test]
    fn test_token_recovered_from_receipt_json() {
        let data = json!({"purchaseToken": "from-data", "orderId": "o3"}).to_string();
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "o3",
            "productId": "p",
            "transactionDate": 1.0,
            "dataAndroid": data,
            "platform": "android"
        })));
        assert_eq!(
            resolve_android_purchase_token(purchase.as_android().unwrap()).as_deref(),
            Some("from-data")
        );

        // transactionReceipt is the last resort
        let receipt = json!({"purchaseToken": "from-receipt"}).to_string();
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "o4",
            "productId": "p",
            "transactionDate": 1.0,
            "transactionReceipt": receipt,
            "platform": "android"
        })));
        assert_eq!(
            resolve_android_purchase_token(purchase.as_android().unwrap()).as_deref(),
            Some("from-receipt")
        );

        // Nothing resolvable
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "o5",
            "productId": "p",
            "transactionDate": 1.0,
            "dataAndroid": "not json at all",
            "platform": "android"
        })));
        assert_eq!(
            resolve_android_purchase_token(purchase.as_android().unwrap()),
            None
        );
    }

    #[test]
    fn test_subscription_offers_always_an_array() {
        // Absent offers normalize to an empty list
        let product = normalize_product(raw_product(json!({
            "id": "premium_monthly",
            "title": "Premium",
            "description": "Monthly premium",
            "type": "subs",
            "platform": "android"
        })));
        let android = product.as_android().unwrap();
        assert!(android.subscription_offer_details_android.is_empty());

        // Malformed offers also normalize to an empty list
        let product = normalize_product(raw_product(json!({
            "id": "premium_monthly",
            "title": "Premium",
            "description": "Monthly premium",
            "type": "subs",
            "platform": "android",
            "subscriptionOfferDetailsAndroid": "{{{ definitely not json"
        })));
        assert!(product
            .as_android()
            .unwrap()
            .subscription_offer_details_android
            .is_empty());
    }

    #[test]
    fn test_subscription_offers_decode_from_json_string() {
        let offers = json!([{
            "basePlanId": "monthly",
            "offerToken": "tok-1",
            "offerTags": ["intro"],
            "pricingPhases": {
                "pricingPhaseList": [{
                    "billingCycleCount": 1,
                    "billingPeriod": "P1M",
                    "formattedPrice": "$9.99",
                    "priceAmountMicros": "9990000",
                    "priceCurrencyCode": "USD",
                    "recurrenceMode": 2
                }]
            }
        }])
        .to_string();

        let product = normalize_product(raw_product(json!({
            "id": "premium_monthly",
            "title": "Premium",
            "description": "Monthly premium",
            "type": "subs",
            "platform": "android",
            "subscriptionOfferDetailsAndroid": offers
        })));

        let android = product.as_android().unwrap();
        assert_eq!(android.subscription_offer_details_android.len(), 1);
        let offer = &android.subscription_offer_details_android[0];
        assert_eq!(offer.base_plan_id, "monthly");
        assert_eq!(offer.offer_token, "tok-1");
        assert_eq!(offer.pricing_phases.pricing_phase_list.len(), 1);
        assert_eq!(
            offer.pricing_phases.pricing_phase_list[0].price_amount_micros,
            "9990000"
        );
    }

    #[test]
    fn test_ios_product_normalization() {
        let product = normalize_product(raw_product(json!({
            "id": "dev.premium",
            "title": "Premium",
            "description": "Premium tier",
            "type": "subs",
            "platform": "ios",
            "localizedPrice": "$9.99",
            "currency": "USD",
            "price": 9.99,
            "isFamilyShareableIOS": true,
            "typeIOS": "AUTO_RENEWABLE_SUBSCRIPTION",
            "subscriptionPeriodUnitIOS": "MONTH",
            "subscriptionPeriodNumberOfUnitsIOS": 1,
            "introductoryPricePaymentModeIOS": "FREETRIAL",
            "discountsIOS": [{
                "identifier": "intro-offer",
                "type": "introductory",
                "numberOfPeriods": 1,
                "price": "0.99",
                "localizedPrice": "$0.99",
                "paymentMode": "PAYASYOUGO",
                "subscriptionPeriod": "P1M"
            }]
        })));

        let ios = product.as_ios().unwrap();
        // displayPrice falls back to the legacy localizedPrice field
        assert_eq!(ios.common.display_price, "$9.99");
        // displayNameIOS falls back to the title
        assert_eq!(ios.display_name_ios, "Premium");
        assert_eq!(ios.type_ios, ProductTypeIos::AutoRenewableSubscription);
        assert_eq!(
            ios.subscription_period_unit_ios,
            Some(SubscriptionPeriodIos::Month)
        );
        // Numeric period count is stringified
        assert_eq!(
            ios.subscription_period_number_of_units_ios.as_deref(),
            Some("1")
        );
        assert_eq!(
            ios.introductory_price_payment_mode_ios,
            Some(PaymentModeIos::FreeTrial)
        );

        let discounts = ios.discounts_ios.as_ref().unwrap();
        assert_eq!(discounts.len(), 1);
        assert_eq!(discounts[0].identifier, "intro-offer");
        assert_eq!(discounts[0].number_of_periods, "1");
        assert_eq!(discounts[0].payment_mode, PaymentModeIos::PayAsYouGo);
    }

    #[test]
    fn test_missing_type_ios_derives_from_product_type() {
        let product = normalize_product(raw_product(json!({
            "id": "dev.premium",
            "title": "Premium",
            "description": "d",
            "type": "subs",
            "platform": "ios"
        })));
        assert_eq!(
            product.as_ios().unwrap().type_ios,
            ProductTypeIos::AutoRenewableSubscription
        );

        let product = normalize_product(raw_product(json!({
            "id": "dev.coins",
            "title": "Coins",
            "description": "d",
            "type": "in-app",
            "platform": "ios"
        })));
        assert_eq!(
            product.as_ios().unwrap().type_ios,
            ProductTypeIos::NonConsumable
        );
    }

    #[test]
    fn test_renewal_info_decodes_from_string_or_object() {
        let as_object = normalize_purchase(raw_purchase(json!({
            "id": "t",
            "productId": "p",
            "transactionDate": 1.0,
            "platform": "ios",
            "renewalInfoIOS": {"willAutoRenew": true, "renewalDate": 1_700_000_000_000.0}
        })));
        let info = as_object.as_ios().unwrap().renewal_info_ios.as_ref().unwrap();
        assert!(info.will_auto_renew);
        assert_eq!(info.renewal_date, Some(1_700_000_000_000));

        let as_string = normalize_purchase(raw_purchase(json!({
            "id": "t",
            "productId": "p",
            "transactionDate": 1.0,
            "platform": "ios",
            "renewalInfoIOS": "{\"willAutoRenew\":false,\"autoRenewPreference\":\"dev.premium\"}"
        })));
        let info = as_string.as_ios().unwrap().renewal_info_ios.as_ref().unwrap();
        assert!(!info.will_auto_renew);
        assert_eq!(info.auto_renew_preference.as_deref(), Some("dev.premium"));

        let broken = normalize_purchase(raw_purchase(json!({
            "id": "t",
            "productId": "p",
            "transactionDate": 1.0,
            "platform": "ios",
            "renewalInfoIOS": "}{ broken"
        })));
        assert!(broken.as_ios().unwrap().renewal_info_ios.is_none());
    }

    #[test]
    fn test_purchase_error_normalization() {
        let err = normalize_purchase_error(RawPurchaseError {
            code: Some("E_USER_CANCELLED".to_string()),
            message: Some("User canceled the purchase flow".to_string()),
            product_id: Some("dev.premium".to_string()),
        });
        assert_eq!(err.code, ErrorCode::UserCancelled);
        assert_eq!(err.product_id.as_deref(), Some("dev.premium"));

        let err = normalize_purchase_error(RawPurchaseError {
            code: Some("E_SOMETHING_NOVEL".to_string()),
            message: None,
            product_id: None,
        });
        assert_eq!(err.code, ErrorCode::Unknown);
        assert_eq!(err.message, "Unknown purchase error");
    }

    #[test]
    fn test_batch_normalization_drops_invalid_entries() {
        let purchases = normalize_purchases(vec![
            raw_purchase(json!({
                "id": "ok",
                "productId": "sku",
                "transactionDate": 1_700_000_000_000.0,
                "platform": "android"
            })),
            // Missing product id
            raw_purchase(json!({
                "id": "bad",
                "transactionDate": 1_700_000_000_000.0,
                "platform": "android"
            })),
            // Missing transaction date
            raw_purchase(json!({
                "id": "bad2",
                "productId": "sku",
                "platform": "android"
            })),
        ]);
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].id(), "ok");

        let products = normalize_products(vec![
            raw_product(json!({
                "id": "ok",
                "title": "t",
                "description": "d",
                "platform": "android"
            })),
            raw_product(json!({
                "id": "",
                "title": "t",
                "description": "d",
                "platform": "android"
            })),
        ]);
        assert_eq!(products.len(), 1);
    }

    #[test]
    fn test_subscription_status_normalization() {
        let status = normalize_subscription_status(RawSubscriptionStatus {
            state: Some(json!("inGracePeriod")),
            renewal_info: Some(json!({"willAutoRenew": true})),
        });
        assert_eq!(status.state, SubscriptionStateIos::InGracePeriod);
        assert!(status.renewal_info.unwrap().will_auto_renew);

        let status = normalize_subscription_status(RawSubscriptionStatus {
            state: Some(json!(1)),
            renewal_info: None,
        });
        assert_eq!(status.state, SubscriptionStateIos::Subscribed);

        let status = normalize_subscription_status(RawSubscriptionStatus::default());
        assert_eq!(status.state, SubscriptionStateIos::Expired);
    }

    #[test]
    fn test_active_subscription_normalization() {
        let sub = normalize_active_subscription(RawActiveSubscription {
            product_id: "dev.premium".to_string(),
            is_active: None,
            transaction_id: Some("txn-1".to_string()),
            transaction_date: Some(1_700_000_000_000.0),
            purchase_token: Some("tok".to_string()),
            expiration_date_ios: Some(1_700_600_000_000.0),
            environment_ios: Some("Production".to_string()),
            auto_renewing_android: None,
            will_expire_soon: Some(false),
            days_until_expiration_ios: Some(6.6),
        });

        assert!(sub.is_active);
        assert_eq!(sub.days_until_expiration_ios, Some(7));
        assert_eq!(sub.expiration_date_ios, Some(1_700_600_000_000));
    }

    #[test]
    fn test_empty_strings_normalize_to_none() {
        let purchase = normalize_purchase(raw_purchase(json!({
            "id": "t",
            "productId": "p",
            "transactionDate": 1.0,
            "purchaseToken": "   ",
            "environmentIOS": "",
            "platform": "ios"
        })));
        assert!(purchase.purchase_token().is_none());
        assert!(purchase.environment_ios().is_none());
    }
}
