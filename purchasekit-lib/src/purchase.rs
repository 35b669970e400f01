//! Store purchase model.
//!
//! Like products, purchases are a platform-tagged family with one common
//! core. `ActiveSubscription` and `SubscriptionStatusIos` are the derived
//! entitlement views built on top of purchase snapshots.

use crate::product::collapse_tag;
use crate::IapPlatform;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Normalized purchase lifecycle states.
///
/// The stores report more states than consumers need: `restored` collapses
/// into `purchased` and `deferred` into `pending` during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseState {
    Purchased,
    Pending,
    Failed,
    #[default]
    Unknown,
}

impl PurchaseState {
    /// Resolve a raw state tag across legacy spellings. Unrecognized tags
    /// resolve to unknown with a warning.
    pub fn from_tag(tag: &str) -> Self {
        match collapse_tag(tag).as_str() {
            "purchased" | "restored" | "1" => PurchaseState::Purchased,
            "pending" | "deferred" | "2" => PurchaseState::Pending,
            "failed" => PurchaseState::Failed,
            "" | "unknown" | "unspecified" | "unspecifiedstate" | "0" => PurchaseState::Unknown,
            _ => {
                warn!(tag, "unrecognized purchase state");
                PurchaseState::Unknown
            }
        }
    }

    /// Resolve the numeric Play Billing purchase state
    /// (0 unspecified, 1 purchased, 2 pending).
    pub fn from_android_code(code: i64) -> Self {
        match code {
            1 => PurchaseState::Purchased,
            2 => PurchaseState::Pending,
            0 => PurchaseState::Unknown,
            _ => {
                warn!(code, "unrecognized Play Billing purchase state");
                PurchaseState::Unknown
            }
        }
    }
}

/// Fields shared by purchases on both platforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseCommon {
    /// Transaction identifier.
    pub id: String,
    pub product_id: String,
    /// All product ids covered by the transaction, for multi-sku purchases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Epoch milliseconds.
    pub transaction_date: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_receipt: Option<String>,
    /// Unified purchase token (JWS representation on iOS, Play token on
    /// Android) when the bridge supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_token: Option<String>,
    pub quantity: i32,
    pub purchase_state: PurchaseState,
    pub is_auto_renewing: bool,
}

/// StoreKit offer applied to a purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOfferIos {
    pub id: String,
    #[serde(rename = "type")]
    pub offer_type: String,
    pub payment_mode: String,
}

/// StoreKit renewal info attached to subscription transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RenewalInfoIos {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_renew_preference: Option<String>,
    pub will_auto_renew: bool,
    /// Epoch milliseconds of the next renewal, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_representation: Option<String>,
}

/// An App Store purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseIos {
    #[serde(flatten)]
    pub common: PurchaseCommon,
    #[serde(rename = "quantityIOS", skip_serializing_if = "Option::is_none")]
    pub quantity_ios: Option<i32>,
    #[serde(
        rename = "originalTransactionDateIOS",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_transaction_date_ios: Option<i64>,
    #[serde(
        rename = "originalTransactionIdentifierIOS",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_transaction_identifier_ios: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<String>,
    #[serde(rename = "expirationDateIOS", skip_serializing_if = "Option::is_none")]
    pub expiration_date_ios: Option<i64>,
    /// `Production` or `Sandbox`.
    #[serde(rename = "environmentIOS", skip_serializing_if = "Option::is_none")]
    pub environment_ios: Option<String>,
    #[serde(rename = "ownershipTypeIOS", skip_serializing_if = "Option::is_none")]
    pub ownership_type_ios: Option<String>,
    #[serde(rename = "revocationDateIOS", skip_serializing_if = "Option::is_none")]
    pub revocation_date_ios: Option<i64>,
    #[serde(rename = "revocationReasonIOS", skip_serializing_if = "Option::is_none")]
    pub revocation_reason_ios: Option<String>,
    #[serde(rename = "offerIOS", skip_serializing_if = "Option::is_none")]
    pub offer_ios: Option<PurchaseOfferIos>,
    #[serde(rename = "currencyCodeIOS", skip_serializing_if = "Option::is_none")]
    pub currency_code_ios: Option<String>,
    #[serde(rename = "renewalInfoIOS", skip_serializing_if = "Option::is_none")]
    pub renewal_info_ios: Option<RenewalInfoIos>,
}

/// A Play Store purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseAndroid {
    #[serde(flatten)]
    pub common: PurchaseCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_token_android: Option<String>,
    /// The raw purchase receipt JSON string as signed by Play.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_android: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_android: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_renewing_android: Option<bool>,
    /// Raw numeric Play state, kept alongside the normalized state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_state_android: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_acknowledged_android: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name_android: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfuscated_account_id_android: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfuscated_profile_id_android: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_payload_android: Option<String>,
}

/// A store purchase, tagged by the platform that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum Purchase {
    Ios(PurchaseIos),
    Android(PurchaseAndroid),
}

impl Purchase {
    /// The platform this purchase belongs to.
    pub fn platform(&self) -> IapPlatform {
        match self {
            Purchase::Ios(_) => IapPlatform::Ios,
            Purchase::Android(_) => IapPlatform::Android,
        }
    }

    /// Fields shared by both platforms.
    pub fn common(&self) -> &PurchaseCommon {
        match self {
            Purchase::Ios(p) => &p.common,
            Purchase::Android(p) => &p.common,
        }
    }

    /// Transaction identifier.
    pub fn id(&self) -> &str {
        &self.common().id
    }

    /// Product identifier (SKU).
    pub fn product_id(&self) -> &str {
        &self.common().product_id
    }

    /// Epoch milliseconds of the transaction.
    pub fn transaction_date(&self) -> i64 {
        self.common().transaction_date
    }

    /// Normalized lifecycle state.
    pub fn purchase_state(&self) -> PurchaseState {
        self.common().purchase_state
    }

    /// Unified purchase token, when the bridge supplied one.
    pub fn purchase_token(&self) -> Option<&str> {
        self.common().purchase_token.as_deref()
    }

    /// True when the store reports the purchase as auto-renewing.
    pub fn is_auto_renewing(&self) -> bool {
        self.common().is_auto_renewing
    }

    /// Subscription expiration in epoch milliseconds (iOS only).
    pub fn expiration_date_ios(&self) -> Option<i64> {
        match self {
            Purchase::Ios(p) => p.expiration_date_ios,
            Purchase::Android(_) => None,
        }
    }

    /// StoreKit environment the transaction was made in (iOS only).
    pub fn environment_ios(&self) -> Option<&str> {
        match self {
            Purchase::Ios(p) => p.environment_ios.as_deref(),
            Purchase::Android(_) => None,
        }
    }

    /// The iOS payload, when this is an App Store purchase.
    pub fn as_ios(&self) -> Option<&PurchaseIos> {
        match self {
            Purchase::Ios(p) => Some(p),
            Purchase::Android(_) => None,
        }
    }

    /// The Android payload, when this is a Play Store purchase.
    pub fn as_android(&self) -> Option<&PurchaseAndroid> {
        match self {
            Purchase::Ios(_) => None,
            Purchase::Android(p) => Some(p),
        }
    }
}

/// A derived view of one currently held subscription.
///
/// Never persisted: recomputed from the available-purchases snapshot every
/// time it is refreshed or a purchase event lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSubscription {
    pub product_id: String,
    pub is_active: bool,
    pub transaction_id: String,
    /// Epoch milliseconds.
    pub transaction_date: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_token: Option<String>,
    #[serde(rename = "expirationDateIOS", skip_serializing_if = "Option::is_none")]
    pub expiration_date_ios: Option<i64>,
    #[serde(rename = "environmentIOS", skip_serializing_if = "Option::is_none")]
    pub environment_ios: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_renewing_android: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub will_expire_soon: Option<bool>,
    #[serde(
        rename = "daysUntilExpirationIOS",
        skip_serializing_if = "Option::is_none"
    )]
    pub days_until_expiration_ios: Option<i64>,
}

/// StoreKit subscription renewal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionStateIos {
    Subscribed,
    Expired,
    InBillingRetryPeriod,
    InGracePeriod,
    Revoked,
}

impl SubscriptionStateIos {
    /// Resolve a raw state tag. Unrecognized states resolve to expired.
    pub fn from_tag(tag: &str) -> Self {
        match collapse_tag(tag).as_str() {
            "subscribed" | "1" => SubscriptionStateIos::Subscribed,
            "expired" | "2" => SubscriptionStateIos::Expired,
            "inbillingretryperiod" | "3" => SubscriptionStateIos::InBillingRetryPeriod,
            "ingraceperiod" | "4" => SubscriptionStateIos::InGracePeriod,
            "revoked" | "5" => SubscriptionStateIos::Revoked,
            _ => {
                warn!(tag, "unrecognized subscription state");
                SubscriptionStateIos::Expired
            }
        }
    }

    /// Resolve the numeric StoreKit renewal state raw value.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => SubscriptionStateIos::Subscribed,
            2 => SubscriptionStateIos::Expired,
            3 => SubscriptionStateIos::InBillingRetryPeriod,
            4 => SubscriptionStateIos::InGracePeriod,
            5 => SubscriptionStateIos::Revoked,
            _ => {
                warn!(code, "unrecognized subscription state code");
                SubscriptionStateIos::Expired
            }
        }
    }

    /// True when the state still grants entitlement.
    pub fn is_entitled(&self) -> bool {
        matches!(
            self,
            SubscriptionStateIos::Subscribed
                | SubscriptionStateIos::InBillingRetryPeriod
                | SubscriptionStateIos::InGracePeriod
        )
    }
}

/// Normalized StoreKit subscription status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusIos {
    pub state: SubscriptionStateIos,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_info: Option<RenewalInfoIos>,
}
