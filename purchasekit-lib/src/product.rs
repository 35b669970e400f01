//! Store product model.
//!
//! Products are a platform-tagged family: one common core plus the fields
//! only one store reports. Serialized form keeps the exact wire spellings the
//! native bridges use (`displayNameIOS`, `subscriptionOfferDetailsAndroid`).

use crate::IapPlatform;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What kind of purchasable a product is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProductType {
    #[default]
    InApp,
    Subs,
}

impl ProductType {
    /// Get the canonical wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::InApp => "in-app",
            ProductType::Subs => "subs",
        }
    }

    /// Resolve a raw type tag. Anything other than `subs` is an in-app
    /// product, matching the historical bridge behavior.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("subs") {
            ProductType::Subs
        } else {
            ProductType::InApp
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// StoreKit product categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductTypeIos {
    Consumable,
    NonConsumable,
    AutoRenewableSubscription,
    NonRenewingSubscription,
}

impl ProductTypeIos {
    /// Resolve a raw StoreKit type tag across its legacy spellings
    /// (`AUTO_RENEWABLE_SUBSCRIPTION`, `autoRenewableSubscription`,
    /// `auto-renewable-subscription`). Unknown tags fall back to
    /// non-consumable with a warning.
    pub fn from_tag(tag: &str) -> Self {
        match collapse_tag(tag).as_str() {
            "consumable" => ProductTypeIos::Consumable,
            "nonconsumable" => ProductTypeIos::NonConsumable,
            "autorenewablesubscription" => ProductTypeIos::AutoRenewableSubscription,
            "nonrenewingsubscription" => ProductTypeIos::NonRenewingSubscription,
            _ => {
                warn!(tag, "unrecognized StoreKit product type");
                ProductTypeIos::NonConsumable
            }
        }
    }
}

/// StoreKit introductory offer payment modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentModeIos {
    /// StoreKit reports an empty payment mode for products without one.
    #[default]
    Empty,
    FreeTrial,
    PayAsYouGo,
    PayUpFront,
}

impl PaymentModeIos {
    /// Resolve a raw payment mode tag (`FREETRIAL`, `FREE_TRIAL`,
    /// `free-trial` and friends). Empty and unknown inputs resolve to
    /// [`PaymentModeIos::Empty`].
    pub fn from_tag(tag: &str) -> Self {
        let key = collapse_tag(tag);
        match key.as_str() {
            "" => PaymentModeIos::Empty,
            "freetrial" => PaymentModeIos::FreeTrial,
            "payasyougo" => PaymentModeIos::PayAsYouGo,
            "payupfront" => PaymentModeIos::PayUpFront,
            _ => {
                warn!(tag, "unrecognized payment mode");
                PaymentModeIos::Empty
            }
        }
    }
}

/// StoreKit subscription period units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPeriodIos {
    Day,
    Week,
    Month,
    Year,
}

impl SubscriptionPeriodIos {
    /// Resolve a raw period unit tag. Absent or unrecognized units resolve
    /// to `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match collapse_tag(tag).as_str() {
            "day" => Some(SubscriptionPeriodIos::Day),
            "week" => Some(SubscriptionPeriodIos::Week),
            "month" => Some(SubscriptionPeriodIos::Month),
            "year" => Some(SubscriptionPeriodIos::Year),
            "" => None,
            _ => {
                warn!(tag, "unrecognized subscription period unit");
                None
            }
        }
    }
}

/// Collapse a tag to lowercase alphanumerics so legacy constant names,
/// camelCase and kebab-case spellings share one lookup key.
pub(crate) fn collapse_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Fields shared by products on both platforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCommon {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    /// Price formatted for display in the storefront locale.
    pub display_price: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_description: Option<String>,
}

/// A StoreKit promotional or introductory discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountIos {
    pub identifier: String,
    #[serde(rename = "type")]
    pub discount_type: String,
    pub number_of_periods: String,
    pub price: String,
    pub localized_price: String,
    pub payment_mode: PaymentModeIos,
    pub subscription_period: String,
}

/// An App Store product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductIos {
    #[serde(flatten)]
    pub common: ProductCommon,
    #[serde(rename = "displayNameIOS")]
    pub display_name_ios: String,
    #[serde(rename = "isFamilyShareableIOS")]
    pub is_family_shareable_ios: bool,
    #[serde(rename = "typeIOS")]
    pub type_ios: ProductTypeIos,
    #[serde(rename = "introductoryPriceIOS", skip_serializing_if = "Option::is_none")]
    pub introductory_price_ios: Option<String>,
    #[serde(
        rename = "introductoryPriceAsAmountIOS",
        skip_serializing_if = "Option::is_none"
    )]
    pub introductory_price_as_amount_ios: Option<String>,
    #[serde(
        rename = "introductoryPricePaymentModeIOS",
        skip_serializing_if = "Option::is_none"
    )]
    pub introductory_price_payment_mode_ios: Option<PaymentModeIos>,
    #[serde(
        rename = "introductoryPriceNumberOfPeriodsIOS",
        skip_serializing_if = "Option::is_none"
    )]
    pub introductory_price_number_of_periods_ios: Option<String>,
    #[serde(
        rename = "introductoryPriceSubscriptionPeriodIOS",
        skip_serializing_if = "Option::is_none"
    )]
    pub introductory_price_subscription_period_ios: Option<SubscriptionPeriodIos>,
    #[serde(
        rename = "subscriptionPeriodNumberOfUnitsIOS",
        skip_serializing_if = "Option::is_none"
    )]
    pub subscription_period_number_of_units_ios: Option<String>,
    #[serde(
        rename = "subscriptionPeriodUnitIOS",
        skip_serializing_if = "Option::is_none"
    )]
    pub subscription_period_unit_ios: Option<SubscriptionPeriodIos>,
    #[serde(rename = "discountsIOS", skip_serializing_if = "Option::is_none")]
    pub discounts_ios: Option<Vec<DiscountIos>>,
}

/// Play Billing one-time purchase offer details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimePurchaseOfferDetailsAndroid {
    pub formatted_price: String,
    pub price_currency_code: String,
    /// Price in micro-units of the currency, as the wire reports it.
    pub price_amount_micros: String,
}

/// One pricing phase of a Play Billing subscription offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingPhaseAndroid {
    pub billing_cycle_count: i32,
    /// ISO 8601 duration, e.g. `P1M`.
    pub billing_period: String,
    pub formatted_price: String,
    pub price_amount_micros: String,
    pub price_currency_code: String,
    pub recurrence_mode: i32,
}

/// Pricing phase list wrapper, kept nested to match the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PricingPhasesAndroid {
    #[serde(default)]
    pub pricing_phase_list: Vec<PricingPhaseAndroid>,
}

/// A Play Billing subscription offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOfferDetailsAndroid {
    pub base_plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
    #[serde(default)]
    pub offer_tags: Vec<String>,
    /// Token passed back when purchasing this specific offer.
    pub offer_token: String,
    #[serde(default)]
    pub pricing_phases: PricingPhasesAndroid,
}

/// A Play Store product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAndroid {
    #[serde(flatten)]
    pub common: ProductCommon,
    pub name_android: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time_purchase_offer_details_android: Option<OneTimePurchaseOfferDetailsAndroid>,
    /// Always present for subscriptions after normalization, empty when the
    /// store reported none. Never null on the wire.
    #[serde(default)]
    pub subscription_offer_details_android: Vec<SubscriptionOfferDetailsAndroid>,
}

/// A store product, tagged by the platform that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum Product {
    Ios(ProductIos),
    Android(ProductAndroid),
}

impl Product {
    /// The platform this product belongs to.
    pub fn platform(&self) -> IapPlatform {
        match self {
            Product::Ios(_) => IapPlatform::Ios,
            Product::Android(_) => IapPlatform::Android,
        }
    }

    /// Fields shared by both platforms.
    pub fn common(&self) -> &ProductCommon {
        match self {
            Product::Ios(p) => &p.common,
            Product::Android(p) => &p.common,
        }
    }

    /// Product identifier (SKU).
    pub fn id(&self) -> &str {
        &self.common().id
    }

    /// Localized product title.
    pub fn title(&self) -> &str {
        &self.common().title
    }

    /// Localized product description.
    pub fn description(&self) -> &str {
        &self.common().description
    }

    /// Whether this is an in-app product or a subscription.
    pub fn product_type(&self) -> ProductType {
        self.common().product_type
    }

    /// Price formatted for display.
    pub fn display_price(&self) -> &str {
        &self.common().display_price
    }

    /// ISO currency code.
    pub fn currency(&self) -> &str {
        &self.common().currency
    }

    /// Numeric price when the store reported one.
    pub fn price(&self) -> Option<f64> {
        self.common().price
    }

    /// True when this product is a subscription.
    pub fn is_subscription(&self) -> bool {
        self.product_type() == ProductType::Subs
    }

    /// The iOS payload, when this is an App Store product.
    pub fn as_ios(&self) -> Option<&ProductIos> {
        match self {
            Product::Ios(p) => Some(p),
            Product::Android(_) => None,
        }
    }

    /// The Android payload, when this is a Play Store product.
    pub fn as_android(&self) -> Option<&ProductAndroid> {
        match self {
            Product::Ios(_) => None,
            Product::Android(p) => Some(p),
        }
    }
}
