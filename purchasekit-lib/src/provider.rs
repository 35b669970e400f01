//! The native store bridge seam.
//!
//! Hosts implement [`PurchaseProvider`] over their StoreKit or Play Billing
//! bindings. The bridge hands over loosely typed raw payloads; everything
//! strongly typed comes out of [`crate::normalize`].

use crate::request::PlatformPurchaseRequest;
use crate::{IapPlatform, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A raw product payload as the native bridge reports it.
///
/// Nested structures arrive either as parsed JSON or as JSON-encoded strings
/// depending on the bridge generation, so they are kept as [`Value`]s until
/// normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawProduct {
    #[serde(alias = "productId")]
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub product_type: Option<String>,
    pub platform: Option<String>,
    pub display_name: Option<String>,
    pub display_price: Option<String>,
    /// Legacy bridges report the formatted price here instead.
    pub localized_price: Option<String>,
    pub currency: Option<String>,
    pub price: Option<f64>,
    pub debug_description: Option<String>,
    #[serde(rename = "displayNameIOS")]
    pub display_name_ios: Option<String>,
    #[serde(rename = "isFamilyShareableIOS")]
    pub is_family_shareable_ios: Option<bool>,
    #[serde(rename = "typeIOS")]
    pub type_ios: Option<String>,
    #[serde(rename = "introductoryPriceIOS")]
    pub introductory_price_ios: Option<String>,
    #[serde(rename = "introductoryPriceAsAmountIOS")]
    pub introductory_price_as_amount_ios: Option<String>,
    #[serde(rename = "introductoryPricePaymentModeIOS")]
    pub introductory_price_payment_mode_ios: Option<String>,
    /// Number or string depending on the bridge.
    #[serde(rename = "introductoryPriceNumberOfPeriodsIOS")]
    pub introductory_price_number_of_periods_ios: Option<Value>,
    #[serde(rename = "introductoryPriceSubscriptionPeriodIOS")]
    pub introductory_price_subscription_period_ios: Option<String>,
    /// Number or string depending on the bridge.
    #[serde(rename = "subscriptionPeriodNumberOfUnitsIOS")]
    pub subscription_period_number_of_units_ios: Option<Value>,
    #[serde(rename = "subscriptionPeriodUnitIOS")]
    pub subscription_period_unit_ios: Option<String>,
    /// Array of discounts, or a JSON-encoded string of one.
    #[serde(rename = "discountsIOS")]
    pub discounts_ios: Option<Value>,
    pub name_android: Option<String>,
    /// Object or JSON-encoded string.
    pub one_time_purchase_offer_details_android: Option<Value>,
    /// Array or JSON-encoded string.
    pub subscription_offer_details_android: Option<Value>,
}

/// A raw purchase payload as the native bridge reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPurchase {
    #[serde(alias = "transactionId")]
    pub id: Option<String>,
    pub product_id: Option<String>,
    pub ids: Option<Vec<String>>,
    /// Epoch milliseconds, reported as a JSON number (often fractional).
    pub transaction_date: Option<f64>,
    pub transaction_receipt: Option<String>,
    pub purchase_token: Option<String>,
    pub quantity: Option<i32>,
    /// String tag or numeric Play code.
    pub purchase_state: Option<Value>,
    pub is_auto_renewing: Option<bool>,
    pub platform: Option<String>,
    #[serde(rename = "quantityIOS")]
    pub quantity_ios: Option<i32>,
    #[serde(rename = "originalTransactionDateIOS")]
    pub original_transaction_date_ios: Option<f64>,
    #[serde(rename = "originalTransactionIdentifierIOS")]
    pub original_transaction_identifier_ios: Option<String>,
    pub app_account_token: Option<String>,
    #[serde(rename = "expirationDateIOS")]
    pub expiration_date_ios: Option<f64>,
    #[serde(rename = "environmentIOS")]
    pub environment_ios: Option<String>,
    #[serde(rename = "ownershipTypeIOS")]
    pub ownership_type_ios: Option<String>,
    #[serde(rename = "revocationDateIOS")]
    pub revocation_date_ios: Option<f64>,
    /// Number or string depending on the bridge.
    #[serde(rename = "revocationReasonIOS")]
    pub revocation_reason_ios: Option<Value>,
    /// Object or JSON-encoded string.
    #[serde(rename = "offerIOS")]
    pub offer_ios: Option<Value>,
    #[serde(rename = "currencyCodeIOS")]
    pub currency_code_ios: Option<String>,
    /// Object or JSON-encoded string.
    #[serde(rename = "renewalInfoIOS")]
    pub renewal_info_ios: Option<Value>,
    pub purchase_token_android: Option<String>,
    pub data_android: Option<String>,
    pub signature_android: Option<String>,
    pub auto_renewing_android: Option<bool>,
    /// Numeric Play code, occasionally a string.
    pub purchase_state_android: Option<Value>,
    pub is_acknowledged_android: Option<bool>,
    pub package_name_android: Option<String>,
    pub obfuscated_account_id_android: Option<String>,
    pub obfuscated_profile_id_android: Option<String>,
    pub developer_payload_android: Option<String>,
}

/// A raw purchase failure event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPurchaseError {
    pub code: Option<String>,
    pub message: Option<String>,
    pub product_id: Option<String>,
}

/// A raw active-subscription entry, for bridges that precompute them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawActiveSubscription {
    pub product_id: String,
    pub is_active: Option<bool>,
    pub transaction_id: Option<String>,
    pub transaction_date: Option<f64>,
    pub purchase_token: Option<String>,
    #[serde(rename = "expirationDateIOS")]
    pub expiration_date_ios: Option<f64>,
    #[serde(rename = "environmentIOS")]
    pub environment_ios: Option<String>,
    pub auto_renewing_android: Option<bool>,
    pub will_expire_soon: Option<bool>,
    #[serde(rename = "daysUntilExpirationIOS")]
    pub days_until_expiration_ios: Option<f64>,
}

/// A raw StoreKit subscription status entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawSubscriptionStatus {
    /// String tag or numeric StoreKit renewal state.
    pub state: Option<Value>,
    /// Object or JSON-encoded string.
    pub renewal_info: Option<Value>,
}

/// Listener invoked for every purchase-updated event.
pub type RawPurchaseListener = Arc<dyn Fn(RawPurchase) + Send + Sync>;
/// Listener invoked for every purchase-error event.
pub type RawPurchaseErrorListener = Arc<dyn Fn(RawPurchaseError) + Send + Sync>;
/// Listener invoked when the App Store delivers a promoted product.
pub type RawProductListener = Arc<dyn Fn(RawProduct) + Send + Sync>;

/// Play alternative billing modes negotiated at connection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AlternativeBillingMode {
    #[default]
    None,
    UserChoice,
    AlternativeOnly,
}

/// Configuration passed to [`PurchaseProvider::init_connection`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub alternative_billing_mode_android: AlternativeBillingMode,
}

impl ConnectionConfig {
    /// Set the Play alternative billing mode.
    pub fn with_alternative_billing_mode(mut self, mode: AlternativeBillingMode) -> Self {
        self.alternative_billing_mode_android = mode;
        self
    }
}

/// Which product catalog a fetch targets.
///
/// Distinct from [`crate::ProductType`]: query kinds use the store spelling
/// `inapp` and add `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductQueryKind {
    #[default]
    InApp,
    Subs,
    All,
}

impl ProductQueryKind {
    /// Get the wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductQueryKind::InApp => "inapp",
            ProductQueryKind::Subs => "subs",
            ProductQueryKind::All => "all",
        }
    }
}

/// Options for [`PurchaseProvider::get_available_purchases`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePurchasesOptions {
    /// When set, iOS also republishes each restored purchase through the
    /// purchase-updated listener.
    #[serde(rename = "alsoPublishToEventListenerIOS")]
    pub also_publish_to_event_listener_ios: bool,
    /// When false, iOS includes expired and revoked items (purchase history).
    #[serde(rename = "onlyIncludeActiveItemsIOS")]
    pub only_include_active_items_ios: bool,
}

impl Default for AvailablePurchasesOptions {
    fn default() -> Self {
        Self {
            also_publish_to_event_listener_ios: false,
            only_include_active_items_ios: true,
        }
    }
}

impl AvailablePurchasesOptions {
    /// Also republish restored purchases through the event listener (iOS).
    pub fn with_publish_to_event_listener(mut self, publish: bool) -> Self {
        self.also_publish_to_event_listener_ios = publish;
        self
    }

    /// Include expired and revoked items in the result (iOS).
    pub fn with_only_active_items(mut self, only_active: bool) -> Self {
        self.only_include_active_items_ios = only_active;
        self
    }
}

/// How an Android transaction is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AndroidFinishAction {
    /// Consumables: the product becomes purchasable again.
    Consume,
    /// Entitlements and subscriptions: acknowledge within Play's window.
    Acknowledge,
}

/// Parameters for finalizing a transaction with the native store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum FinishTransactionParams {
    Ios {
        transaction_id: String,
    },
    Android {
        purchase_token: String,
        action: AndroidFinishAction,
    },
}

/// Result of presenting an external purchase link (iOS).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExternalPurchaseLinkResultIos {
    pub success: bool,
    pub error: Option<String>,
}

/// Trait describing a native store bridge (StoreKit or Play Billing).
///
/// Listener setters are synchronous: once `set_purchase_updated_listener`
/// returns, the bridge delivers events to the new listener. Platform-suffixed
/// operations are only meaningful on that platform; implementations for the
/// other store return an error and callers are expected to guard on
/// [`PurchaseProvider::platform`] first.
#[async_trait]
pub trait PurchaseProvider: Send + Sync {
    /// The platform this bridge talks to.
    fn platform(&self) -> IapPlatform;

    /// Open the store connection. Returns true when the store is reachable.
    async fn init_connection(&self, config: Option<ConnectionConfig>) -> Result<bool>;

    /// Tear down the store connection.
    async fn end_connection(&self) -> Result<bool>;

    /// Fetch raw product payloads for the given skus.
    async fn fetch_products(
        &self,
        skus: &[String],
        kind: ProductQueryKind,
    ) -> Result<Vec<RawProduct>>;

    /// Start the native purchase flow. The outcome arrives through the
    /// purchase-updated or purchase-error listener, never the return value.
    async fn request_purchase(&self, request: PlatformPurchaseRequest) -> Result<()>;

    /// Fetch the raw snapshot of purchases the user still owns.
    async fn get_available_purchases(
        &self,
        options: Option<AvailablePurchasesOptions>,
    ) -> Result<Vec<RawPurchase>>;

    /// Finalize a transaction (finish on iOS, consume or acknowledge on Android).
    async fn finish_transaction(&self, params: FinishTransactionParams) -> Result<()>;

    /// Replace the purchase-updated listener. `None` detaches.
    fn set_purchase_updated_listener(&self, listener: Option<RawPurchaseListener>);

    /// Replace the purchase-error listener. `None` detaches.
    fn set_purchase_error_listener(&self, listener: Option<RawPurchaseErrorListener>);

    /// Replace the promoted-product listener. `None` detaches. iOS only.
    fn set_promoted_product_listener(&self, listener: Option<RawProductListener>);

    /// Storefront country code. iOS only.
    async fn get_storefront_ios(&self) -> Result<String>;

    /// App transaction JWS when the device supports it. iOS only.
    async fn get_app_transaction_ios(&self) -> Result<Option<String>>;

    /// Base64-encoded app receipt. iOS only.
    async fn get_receipt_data_ios(&self) -> Result<String>;

    /// Present the offer code redemption sheet. iOS only.
    async fn present_code_redemption_sheet_ios(&self) -> Result<bool>;

    /// Begin a refund request for a sku, returning the resulting status. iOS only.
    async fn begin_refund_request_ios(&self, sku: &str) -> Result<Option<String>>;

    /// Raw subscription statuses for a sku. iOS only.
    async fn subscription_status_ios(&self, sku: &str) -> Result<Vec<RawSubscriptionStatus>>;

    /// Whether an external purchase link can be presented. iOS only.
    async fn can_present_external_purchase_link_ios(&self) -> Result<bool>;

    /// Present an external purchase link. iOS only.
    async fn present_external_purchase_link_ios(
        &self,
        url: &str,
    ) -> Result<ExternalPurchaseLinkResultIos>;

    /// Whether alternative billing is available for this user. Android only.
    async fn check_alternative_billing_availability_android(&self) -> Result<bool>;

    /// Show the alternative billing information dialog. Android only.
    async fn show_alternative_billing_dialog_android(&self) -> Result<bool>;

    /// Create an alternative billing reporting token. Android only.
    async fn create_alternative_billing_token_android(&self) -> Result<Option<String>>;
}
