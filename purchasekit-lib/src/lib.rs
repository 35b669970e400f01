//! PurchaseKit core library.
//!
//! This crate intentionally stays stateless: it models store products and
//! purchases as one platform-tagged type family, normalizes the loosely typed
//! payloads produced by the native store bridges (StoreKit, Play Billing) and
//! expands unified purchase requests into exact per-platform parameter sets.
//! Connection and event state live in `purchasekit-session`; the native
//! bridge itself is supplied by the host through the
//! [`PurchaseProvider`](provider::PurchaseProvider) trait.
//!
//! # Features
//!
//! - **Payload Normalization**: Tolerant, table-driven conversion of raw
//!   store payloads into strongly typed products and purchases
//! - **Request Building**: One unified purchase request shape expanded into
//!   the per-platform parameters each store expects
//! - **Provider Abstraction**: Trait-based design for custom store bridge
//!   implementations
//!
//! # Example
//!
//! ```
//! use purchasekit_lib::{IapPlatform, PurchaseRequest, RequestPurchaseIosProps};
//! use purchasekit_lib::request::build_purchase_request;
//!
//! let request = PurchaseRequest::in_app()
//!     .with_apple(RequestPurchaseIosProps::new("dev.products.premium"));
//!
//! let platform_request = build_purchase_request(&request, IapPlatform::Ios).unwrap();
//! let wire = serde_json::to_value(&platform_request).unwrap();
//! assert_eq!(wire["ios"]["sku"], "dev.products.premium");
//! ```

use serde::{Deserialize, Serialize};

pub mod errors;
pub mod normalize;
pub mod product;
pub mod provider;
pub mod purchase;
pub mod request;

/// Test utilities for purchase flow testing.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use errors::{ErrorCode, IapError, PurchaseError};
pub use normalize::{
    normalize_product, normalize_products, normalize_purchase, normalize_purchase_error,
    normalize_purchases, resolve_android_purchase_token, validate_product, validate_purchase,
};
pub use product::{
    DiscountIos, OneTimePurchaseOfferDetailsAndroid, PaymentModeIos, PricingPhaseAndroid, Product,
    ProductAndroid, ProductCommon, ProductIos, ProductType, ProductTypeIos,
    SubscriptionOfferDetailsAndroid, SubscriptionPeriodIos,
};
pub use provider::{
    AlternativeBillingMode, AndroidFinishAction, AvailablePurchasesOptions, ConnectionConfig,
    ExternalPurchaseLinkResultIos, FinishTransactionParams, ProductQueryKind, PurchaseProvider,
    RawActiveSubscription, RawProduct, RawPurchase, RawPurchaseError, RawSubscriptionStatus,
};
pub use purchase::{
    ActiveSubscription, Purchase, PurchaseAndroid, PurchaseCommon, PurchaseIos, PurchaseOfferIos,
    PurchaseState, RenewalInfoIos, SubscriptionStateIos, SubscriptionStatusIos,
};
pub use request::{
    build_purchase_request, DiscountOfferIos, PlatformPurchaseRequest, PurchaseRequest,
    ReplacementModeAndroid, RequestPurchaseAndroidProps, RequestPurchaseIosProps,
    SubscriptionOfferAndroid, SubscriptionProductReplacementParams,
};

/// Common result alias for PurchaseKit operations.
pub type Result<T> = std::result::Result<T, IapError>;

/// The store platform a payload, request or provider belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IapPlatform {
    Ios,
    Android,
}

impl IapPlatform {
    /// Get the platform tag as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            IapPlatform::Ios => "ios",
            IapPlatform::Android => "android",
        }
    }

    /// Resolve a platform tag the way the native bridges report it.
    ///
    /// Comparison is case-insensitive and anything other than exactly `ios`
    /// falls back to Android, matching the historical bridge behavior.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("ios") {
            IapPlatform::Ios
        } else {
            IapPlatform::Android
        }
    }

    /// True for the Apple App Store platform.
    pub fn is_ios(&self) -> bool {
        matches!(self, IapPlatform::Ios)
    }

    /// True for the Google Play platform.
    pub fn is_android(&self) -> bool {
        matches!(self, IapPlatform::Android)
    }
}

impl std::fmt::Display for IapPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_tag_detection() {
        assert_eq!(IapPlatform::from_tag("ios"), IapPlatform::Ios);
        assert_eq!(IapPlatform::from_tag("iOS"), IapPlatform::Ios);
        assert_eq!(IapPlatform::from_tag(" IOS "), IapPlatform::Ios);
        assert_eq!(IapPlatform::from_tag("android"), IapPlatform::Android);
        assert_eq!(IapPlatform::from_tag("Android"), IapPlatform::Android);

        // Unknown tags fall back to Android rather than failing
        assert_eq!(IapPlatform::from_tag("web"), IapPlatform::Android);
        assert_eq!(IapPlatform::from_tag(""), IapPlatform::Android);
    }

    #[test]
    fn test_platform_serialization() {
        assert_eq!(
            serde_json::to_string(&IapPlatform::Ios).unwrap(),
            "\"ios\""
        );
        assert_eq!(
            serde_json::to_string(&IapPlatform::Android).unwrap(),
            "\"android\""
        );
        let parsed: IapPlatform = serde_json::from_str("\"android\"").unwrap();
        assert_eq!(parsed, IapPlatform::Android);
    }

    #[test]
    fn test_platform_display() {
        assert_eq!(IapPlatform::Ios.to_string(), "ios");
        assert_eq!(IapPlatform::Android.to_string(), "android");
    }
}
