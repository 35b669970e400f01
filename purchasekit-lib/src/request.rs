//! Purchase request construction.
//!
//! A [`PurchaseRequest`] carries per-platform property blocks; at call time
//! [`build_purchase_request`] selects the block for the active platform and
//! produces the exact wire payload the native layer expects. Validation is
//! fail-fast: a missing or empty product id is a developer error, not
//! something to discover in a store rejection.

use crate::errors::IapError;
use crate::product::ProductType;
use crate::{IapPlatform, Result};
use serde::{Deserialize, Serialize};

/// Unified purchase request covering both platforms.
///
/// The `apple`/`google` blocks are the recommended spellings; `ios`/`android`
/// remain accepted and lose when both are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Product category being purchased, `in-app` unless stated otherwise.
    #[serde(rename = "type", default)]
    pub request_type: ProductType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios: Option<RequestPurchaseIosProps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apple: Option<RequestPurchaseIosProps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android: Option<RequestPurchaseAndroidProps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<RequestPurchaseAndroidProps>,
}

impl PurchaseRequest {
    /// Create a request for a one-time product.
    pub fn in_app() -> Self {
        Self {
            request_type: ProductType::InApp,
            ..Self::default()
        }
    }

    /// Create a request for a subscription product.
    pub fn subscription() -> Self {
        Self {
            request_type: ProductType::Subs,
            ..Self::default()
        }
    }

    /// Set the legacy iOS property block.
    pub fn with_ios(mut self, props: RequestPurchaseIosProps) -> Self {
        self.ios = Some(props);
        self
    }

    /// Set the Apple property block.
    pub fn with_apple(mut self, props: RequestPurchaseIosProps) -> Self {
        self.apple = Some(props);
        self
    }

    /// Set the legacy Android property block.
    pub fn with_android(mut self, props: RequestPurchaseAndroidProps) -> Self {
        self.android = Some(props);
        self
    }

    /// Set the Google property block.
    pub fn with_google(mut self, props: RequestPurchaseAndroidProps) -> Self {
        self.google = Some(props);
        self
    }
}

/// StoreKit purchase properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPurchaseIosProps {
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and_dangerously_finish_transaction_automatically: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_offer: Option<DiscountOfferIos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_commerce_data: Option<String>,
}

impl RequestPurchaseIosProps {
    /// Create properties for the given product id.
    pub fn new(sku: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            ..Self::default()
        }
    }

    /// Buy more than one unit of a consumable.
    pub fn with_quantity(mut self, quantity: i32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Associate the transaction with an app-scoped account token.
    pub fn with_app_account_token(mut self, token: impl Into<String>) -> Self {
        self.app_account_token = Some(token.into());
        self
    }

    /// Apply a signed promotional discount offer.
    pub fn with_offer(mut self, offer: DiscountOfferIos) -> Self {
        self.with_offer = Some(offer);
        self
    }

    /// Let StoreKit finish the transaction without an explicit
    /// `finish_transaction` call. Server-side receipt validation becomes
    /// impossible once the transaction is gone, hence the name.
    pub fn with_dangerous_auto_finish(mut self, auto_finish: bool) -> Self {
        self.and_dangerously_finish_transaction_automatically = Some(auto_finish);
        self
    }

    /// Attach an Advanced Commerce payload.
    pub fn with_advanced_commerce_data(mut self, data: impl Into<String>) -> Self {
        self.advanced_commerce_data = Some(data.into());
        self
    }
}

/// Signed StoreKit promotional offer, as issued by the developer server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountOfferIos {
    pub identifier: String,
    pub key_identifier: String,
    pub nonce: String,
    pub signature: String,
    /// Signing timestamp in epoch milliseconds.
    pub timestamp: f64,
}

/// Play Billing purchase properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPurchaseAndroidProps {
    pub skus: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfuscated_account_id_android: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfuscated_profile_id_android: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_offer_personalized: Option<bool>,
    /// Token of the currently held subscription when upgrading/downgrading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_token_android: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_offers: Option<Vec<SubscriptionOfferAndroid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_product_replacement_params: Option<SubscriptionProductReplacementParams>,
}

impl RequestPurchaseAndroidProps {
    /// Create properties for the given product ids.
    pub fn new(skus: Vec<String>) -> Self {
        Self {
            skus,
            ..Self::default()
        }
    }

    /// Mark the offered price as personalized per EU disclosure rules.
    pub fn with_offer_personalized(mut self, personalized: bool) -> Self {
        self.is_offer_personalized = Some(personalized);
        self
    }

    /// Select specific subscription offers by token.
    pub fn with_subscription_offers(mut self, offers: Vec<SubscriptionOfferAndroid>) -> Self {
        self.subscription_offers = Some(offers);
        self
    }

    /// Provide the held subscription's token for an upgrade/downgrade.
    pub fn with_purchase_token(mut self, token: impl Into<String>) -> Self {
        self.purchase_token_android = Some(token.into());
        self
    }

    /// Configure how the held subscription is replaced.
    pub fn with_replacement_params(
        mut self,
        params: SubscriptionProductReplacementParams,
    ) -> Self {
        self.subscription_product_replacement_params = Some(params);
        self
    }

    /// Attach obfuscated account and profile identifiers.
    pub fn with_obfuscated_ids(
        mut self,
        account_id: impl Into<String>,
        profile_id: impl Into<String>,
    ) -> Self {
        self.obfuscated_account_id_android = Some(account_id.into());
        self.obfuscated_profile_id_android = Some(profile_id.into());
        self
    }
}

/// A specific Play subscription offer selected by token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOfferAndroid {
    pub sku: String,
    pub offer_token: String,
}

impl SubscriptionOfferAndroid {
    pub fn new(sku: impl Into<String>, offer_token: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            offer_token: offer_token.into(),
        }
    }
}

/// Upgrade/downgrade parameters for replacing a held Play subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionProductReplacementParams {
    pub old_product_id: String,
    pub replacement_mode: ReplacementModeAndroid,
}

impl SubscriptionProductReplacementParams {
    pub fn new(old_product_id: impl Into<String>, replacement_mode: ReplacementModeAndroid) -> Self {
        Self {
            old_product_id: old_product_id.into(),
            replacement_mode,
        }
    }
}

/// Play Billing replacement (proration) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacementModeAndroid {
    UnknownReplacementMode,
    WithTimeProration,
    ChargeProratedPrice,
    ChargeFullPrice,
    WithoutProration,
    Deferred,
    KeepExisting,
}

/// Platform-specific payload handed to the native layer, tagged by platform:
/// `{"ios": {…}}` or `{"android": {…}}`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformPurchaseRequest {
    Ios(RequestPurchaseIosPayload),
    Android(RequestPurchaseAndroidPayload),
}

impl PlatformPurchaseRequest {
    pub fn platform(&self) -> IapPlatform {
        match self {
            Self::Ios(_) => IapPlatform::Ios,
            Self::Android(_) => IapPlatform::Android,
        }
    }
}

/// Validated StoreKit purchase payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPurchaseIosPayload {
    pub sku: String,
    pub and_dangerously_finish_transaction_automatically: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<String>,
    /// -1 when the caller did not specify a quantity.
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_offer: Option<DiscountOfferIosPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_commerce_data: Option<String>,
}

/// Discount offer as transmitted: the timestamp crosses the boundary as a
/// string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountOfferIosPayload {
    pub identifier: String,
    pub key_identifier: String,
    pub nonce: String,
    pub signature: String,
    pub timestamp: String,
}

impl DiscountOfferIosPayload {
    fn from_offer(offer: &DiscountOfferIos) -> Self {
        Self {
            identifier: offer.identifier.clone(),
            key_identifier: offer.key_identifier.clone(),
            nonce: offer.nonce.clone(),
            signature: offer.signature.clone(),
            timestamp: format!("{}", offer.timestamp),
        }
    }
}

/// Validated Play Billing purchase payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPurchaseAndroidPayload {
    pub skus: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfuscated_account_id_android: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfuscated_profile_id_android: Option<String>,
    pub is_offer_personalized: bool,
    /// Always an array on subscription requests, absent on one-time requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_offers: Option<Vec<SubscriptionOfferAndroid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_token_android: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_product_replacement_params: Option<SubscriptionProductReplacementParams>,
}

/// Build the native payload for the active platform.
///
/// Picks `apple` over `ios` (`google` over `android`) when both blocks are
/// set, and rejects requests that lack a usable product id for the platform.
pub fn build_purchase_request(
    request: &PurchaseRequest,
    platform: IapPlatform,
) -> Result<PlatformPurchaseRequest> {
    match platform {
        IapPlatform::Ios => {
            let props = request.apple.as_ref().or(request.ios.as_ref()).ok_or_else(|| {
                IapError::developer(
                    "purchase request is missing `sku`: set the `apple` (or legacy `ios`) properties",
                )
            })?;
            Ok(PlatformPurchaseRequest::Ios(build_ios_payload(props)?))
        }
        IapPlatform::Android => {
            let props = request
                .google
                .as_ref()
                .or(request.android.as_ref())
                .ok_or_else(|| {
                    IapError::developer(
                        "purchase request is missing `skus`: set the `google` (or legacy `android`) properties",
                    )
                })?;
            Ok(PlatformPurchaseRequest::Android(build_android_payload(
                props,
                request.request_type,
            )?))
        }
    }
}

fn build_ios_payload(props: &RequestPurchaseIosProps) -> Result<RequestPurchaseIosPayload> {
    if props.sku.trim().is_empty() {
        return Err(IapError::developer(
            "purchase request `sku` must be a non-empty product id",
        ));
    }
    Ok(RequestPurchaseIosPayload {
        sku: props.sku.clone(),
        and_dangerously_finish_transaction_automatically: props
            .and_dangerously_finish_transaction_automatically
            .unwrap_or(false),
        app_account_token: props.app_account_token.clone(),
        quantity: props.quantity.unwrap_or(-1),
        with_offer: props.with_offer.as_ref().map(DiscountOfferIosPayload::from_offer),
        advanced_commerce_data: props.advanced_commerce_data.clone(),
    })
}

fn build_android_payload(
    props: &RequestPurchaseAndroidProps,
    request_type: ProductType,
) -> Result<RequestPurchaseAndroidPayload> {
    if props.skus.is_empty() || props.skus.iter().all(|sku| sku.trim().is_empty()) {
        return Err(IapError::developer(
            "purchase request `skus` must contain at least one product id",
        ));
    }
    let subscription = request_type == ProductType::Subs;
    Ok(RequestPurchaseAndroidPayload {
        skus: props.skus.clone(),
        obfuscated_account_id_android: props.obfuscated_account_id_android.clone(),
        obfuscated_profile_id_android: props.obfuscated_profile_id_android.clone(),
        is_offer_personalized: props.is_offer_personalized.unwrap_or(false),
        // Play requires the offer list on subscription flows; an explicit
        // empty array means "no offer selected".
        subscription_offers: subscription
            .then(|| props.subscription_offers.clone().unwrap_or_default()),
        purchase_token_android: subscription
            .then(|| props.purchase_token_android.clone())
            .flatten(),
        subscription_product_replacement_params: subscription
            .then(|| props.subscription_product_replacement_params.clone())
            .flatten(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ios_wire_shape_with_defaults() {
        let request =
            PurchaseRequest::in_app().with_apple(RequestPurchaseIosProps::new("dev.premium"));
        let payload = build_purchase_request(&request, IapPlatform::Ios).unwrap();
        let wire = serde_json::to_value(&payload).unwrap();

        assert_eq!(wire["ios"]["sku"], json!("dev.premium"));
        assert_eq!(
            wire["ios"]["andDangerouslyFinishTransactionAutomatically"],
            json!(false)
        );
        assert_eq!(wire["ios"]["quantity"], json!(-1));
        assert!(wire["ios"].get("appAccountToken").is_none());
        assert!(wire["ios"].get("withOffer").is_none());
        assert!(wire.get("android").is_none());
    }

    #[test]
    fn test_android_wire_shape_round_trips() {
        let request = PurchaseRequest::in_app().with_google(
            RequestPurchaseAndroidProps::new(vec!["coins_100".to_string()])
                .with_offer_personalized(true),
        );
        let payload = build_purchase_request(&request, IapPlatform::Android).unwrap();
        let wire = serde_json::to_value(&payload).unwrap();

        assert_eq!(wire["android"]["skus"], json!(["coins_100"]));
        assert_eq!(wire["android"]["isOfferPersonalized"], json!(true));
        assert!(wire.get("ios").is_none());

        let back: PlatformPurchaseRequest = serde_json::from_value(wire).unwrap();
        assert_eq!(back, payload);
        assert_eq!(back.platform(), IapPlatform::Android);
    }

    #[test]
    fn test_missing_platform_props_fails_fast() {
        let request = PurchaseRequest::in_app();

        let err = build_purchase_request(&request, IapPlatform::Ios).unwrap_err();
        assert!(err.to_string().contains("sku"), "got: {err}");

        let err = build_purchase_request(&request, IapPlatform::Android).unwrap_err();
        assert!(err.to_string().contains("skus"), "got: {err}");
    }

    #[test]
    fn test_empty_sku_rejected() {
        let request =
            PurchaseRequest::in_app().with_apple(RequestPurchaseIosProps::new("   "));
        let err = build_purchase_request(&request, IapPlatform::Ios).unwrap_err();
        assert!(err.to_string().contains("sku"), "got: {err}");

        let request = PurchaseRequest::in_app()
            .with_google(RequestPurchaseAndroidProps::new(vec!["".to_string()]));
        let err = build_purchase_request(&request, IapPlatform::Android).unwrap_err();
        assert!(err.to_string().contains("skus"), "got: {err}");
    }

    #[test]
    fn test_recommended_blocks_override_legacy() {
        let request = PurchaseRequest::in_app()
            .with_ios(RequestPurchaseIosProps::new("legacy"))
            .with_apple(RequestPurchaseIosProps::new("recommended"));
        let payload = build_purchase_request(&request, IapPlatform::Ios).unwrap();
        match payload {
            PlatformPurchaseRequest::Ios(ios) => assert_eq!(ios.sku, "recommended"),
            other => panic!("expected ios payload, got {other:?}"),
        }

        let request = PurchaseRequest::subscription()
            .with_android(RequestPurchaseAndroidProps::new(vec!["legacy".to_string()]))
            .with_google(RequestPurchaseAndroidProps::new(vec![
                "recommended".to_string()
            ]));
        let payload = build_purchase_request(&request, IapPlatform::Android).unwrap();
        match payload {
            PlatformPurchaseRequest::Android(android) => {
                assert_eq!(android.skus, vec!["recommended".to_string()]);
            }
            other => panic!("expected android payload, got {other:?}"),
        }
    }

    #[test]
    fn test_subscription_offers_default_to_empty_array() {
        let request = PurchaseRequest::subscription().with_google(
            RequestPurchaseAndroidProps::new(vec!["premium_monthly".to_string()]),
        );
        let payload = build_purchase_request(&request, IapPlatform::Android).unwrap();
        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire["android"]["subscriptionOffers"], json!([]));

        let android = wire["android"].as_object().unwrap();
        assert!(!android.contains_key("purchaseTokenAndroid"));
        assert!(!android.contains_key("subscriptionProductReplacementParams"));
    }

    #[test]
    fn test_in_app_requests_omit_subscription_fields() {
        let request = PurchaseRequest::in_app().with_google(
            RequestPurchaseAndroidProps::new(vec!["coins_100".to_string()])
                .with_purchase_token("held-token")
                .with_replacement_params(SubscriptionProductReplacementParams::new(
                    "premium_monthly",
                    ReplacementModeAndroid::WithTimeProration,
                )),
        );
        let payload = build_purchase_request(&request, IapPlatform::Android).unwrap();
        let wire = serde_json::to_value(&payload).unwrap();

        let android = wire["android"].as_object().unwrap();
        assert!(!android.contains_key("subscriptionOffers"));
        assert!(!android.contains_key("purchaseTokenAndroid"));
        assert!(!android.contains_key("subscriptionProductReplacementParams"));
    }

    #[test]
    fn test_replacement_params_serialized_on_subscriptions() {
        let request = PurchaseRequest::subscription().with_google(
            RequestPurchaseAndroidProps::new(vec!["premium_yearly".to_string()])
                .with_subscription_offers(vec![SubscriptionOfferAndroid::new(
                    "premium_yearly",
                    "offer-token",
                )])
                .with_purchase_token("held-token")
                .with_replacement_params(SubscriptionProductReplacementParams::new(
                    "premium_monthly",
                    ReplacementModeAndroid::ChargeProratedPrice,
                )),
        );
        let payload = build_purchase_request(&request, IapPlatform::Android).unwrap();
        let wire = serde_json::to_value(&payload).unwrap();

        let android = &wire["android"];
        assert_eq!(
            android["subscriptionOffers"][0]["offerToken"],
            json!("offer-token")
        );
        assert_eq!(android["purchaseTokenAndroid"], json!("held-token"));
        assert_eq!(
            android["subscriptionProductReplacementParams"]["oldProductId"],
            json!("premium_monthly")
        );
        assert_eq!(
            android["subscriptionProductReplacementParams"]["replacementMode"],
            json!("charge-prorated-price")
        );
    }

    #[test]
    fn test_offer_timestamp_becomes_string() {
        let offer = DiscountOfferIos {
            identifier: "intro".to_string(),
            key_identifier: "KEY1".to_string(),
            nonce: "7e5c57c4-4d2e-4dba-9d3c-5de85efc181f".to_string(),
            signature: "sig".to_string(),
            timestamp: 1_700_000_000_000.0,
        };
        let request = PurchaseRequest::in_app()
            .with_apple(RequestPurchaseIosProps::new("dev.premium").with_offer(offer));
        let payload = build_purchase_request(&request, IapPlatform::Ios).unwrap();
        let wire = serde_json::to_value(&payload).unwrap();

        assert_eq!(wire["ios"]["withOffer"]["timestamp"], json!("1700000000000"));
        assert_eq!(wire["ios"]["withOffer"]["keyIdentifier"], json!("KEY1"));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: PurchaseRequest = serde_json::from_value(json!({
            "google": {"skus": ["coins_100"]}
        }))
        .unwrap();
        assert_eq!(request.request_type, ProductType::InApp);
        assert!(request.ios.is_none());
        assert_eq!(request.google.unwrap().skus, vec!["coins_100".to_string()]);
    }
}
