//! Active-subscription derivation.
//!
//! Pure functions over a purchase snapshot and an injected `now`. The stores
//! report subscription validity differently: StoreKit carries an expiration
//! date per transaction, Play simply stops returning entries that lapsed, so
//! activity is judged per platform.

use chrono::{DateTime, Utc};
use purchasekit_lib::normalize::resolve_android_purchase_token;
use purchasekit_lib::{ActiveSubscription, Purchase, PurchaseAndroid, PurchaseIos};

/// Remaining validity at or below which an iOS subscription is flagged as
/// expiring soon.
pub const EXPIRY_WARNING_DAYS: i64 = 7;

/// Window after the transaction during which a sandbox purchase without an
/// expiration date is assumed active. Sandbox transactions frequently omit
/// the expiration field, so this is a heuristic, not a platform guarantee.
pub const SANDBOX_ACTIVE_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

const DAY_MS: f64 = 86_400_000.0;

/// Derive subscription entries from a purchase snapshot.
///
/// With `subscription_ids` the result is restricted to those products;
/// without it, any purchase carrying subscription-indicating fields
/// (an iOS expiration date or environment, a Play auto-renewal flag) is
/// considered.
pub fn derive_active_subscriptions(
    purchases: &[Purchase],
    subscription_ids: Option<&[String]>,
    now: DateTime<Utc>,
) -> Vec<ActiveSubscription> {
    let now_ms = now.timestamp_millis();
    purchases
        .iter()
        .filter(|purchase| match subscription_ids {
            Some(ids) => ids.iter().any(|id| id == purchase.product_id()),
            None => looks_like_subscription(purchase),
        })
        .map(|purchase| match purchase {
            Purchase::Ios(ios) => derive_ios(ios, now_ms),
            Purchase::Android(android) => derive_android(android),
        })
        .collect()
}

/// Whether any derived entry is currently active.
pub fn has_active_subscription(
    purchases: &[Purchase],
    subscription_ids: Option<&[String]>,
    now: DateTime<Utc>,
) -> bool {
    derive_active_subscriptions(purchases, subscription_ids, now)
        .iter()
        .any(|subscription| subscription.is_active)
}

fn looks_like_subscription(purchase: &Purchase) -> bool {
    match purchase {
        Purchase::Ios(ios) => ios.expiration_date_ios.is_some() || ios.environment_ios.is_some(),
        Purchase::Android(android) => android.auto_renewing_android.is_some(),
    }
}

fn derive_ios(ios: &PurchaseIos, now_ms: i64) -> ActiveSubscription {
    let expiration = ios.expiration_date_ios;
    let is_active = match expiration {
        Some(expires_at) => expires_at > now_ms,
        None => {
            is_sandbox(ios) && ios.common.transaction_date > now_ms - SANDBOX_ACTIVE_WINDOW_MS
        }
    };
    let days_until_expiration = expiration.map(|expires_at| days_between(now_ms, expires_at));

    ActiveSubscription {
        product_id: ios.common.product_id.clone(),
        is_active,
        transaction_id: ios.common.id.clone(),
        transaction_date: ios.common.transaction_date,
        purchase_token: ios.common.purchase_token.clone(),
        expiration_date_ios: expiration,
        environment_ios: ios.environment_ios.clone(),
        auto_renewing_android: None,
        will_expire_soon: days_until_expiration.map(|days| days <= EXPIRY_WARNING_DAYS),
        days_until_expiration_ios: days_until_expiration,
    }
}

// Presence in the snapshot is the activity signal on Android: Play stops
// reporting entries once they expire or are canceled and refunded.
fn derive_android(android: &PurchaseAndroid) -> ActiveSubscription {
    let auto_renewing = android
        .auto_renewing_android
        .unwrap_or(android.common.is_auto_renewing);

    ActiveSubscription {
        product_id: android.common.product_id.clone(),
        is_active: true,
        transaction_id: android.common.id.clone(),
        transaction_date: android.common.transaction_date,
        purchase_token: resolve_android_purchase_token(android),
        expiration_date_ios: None,
        environment_ios: None,
        auto_renewing_android: Some(auto_renewing),
        will_expire_soon: Some(!auto_renewing),
        days_until_expiration_ios: None,
    }
}

fn is_sandbox(ios: &PurchaseIos) -> bool {
    ios.environment_ios
        .as_deref()
        .map(|env| env.eq_ignore_ascii_case("sandbox"))
        .unwrap_or(false)
}

// Either side can be an i64 extreme: normalization clamps degenerate wire
// timestamps instead of rejecting them.
fn days_between(from_ms: i64, to_ms: i64) -> i64 {
    (to_ms.saturating_sub(from_ms) as f64 / DAY_MS).round() as i64
}
