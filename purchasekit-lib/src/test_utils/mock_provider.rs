//! Mock store bridge for exercising purchase flows without a device.

use std::sync::{Arc, RwLock};

use crate::errors::{ErrorCode, IapError};
use crate::provider::{
    AvailablePurchasesOptions, ConnectionConfig, ExternalPurchaseLinkResultIos,
    FinishTransactionParams, ProductQueryKind, PurchaseProvider, RawProduct, RawProductListener,
    RawPurchase, RawPurchaseError, RawPurchaseErrorListener, RawPurchaseListener,
    RawSubscriptionStatus,
};
use crate::request::PlatformPurchaseRequest;
use crate::{IapPlatform, Result};
use async_trait::async_trait;

type Failure = Option<(ErrorCode, String)>;

/// Native listener attach/detach counts, for asserting exactly-once
/// subscription behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenerCounts {
    pub updated_sets: u32,
    pub updated_clears: u32,
    pub error_sets: u32,
    pub error_clears: u32,
    pub promoted_sets: u32,
    pub promoted_clears: u32,
}

#[derive(Default)]
struct MockState {
    catalog: Vec<RawProduct>,
    available_purchases: Vec<RawPurchase>,
    storefront: String,
    receipt_data: String,
    app_transaction: Option<String>,
    refund_status: Option<String>,
    subscription_statuses: Vec<RawSubscriptionStatus>,
    external_link_allowed: bool,
    alternative_billing_available: bool,
    alternative_billing_token: Option<String>,
    store_unreachable: bool,

    init_failure: Failure,
    fetch_failure: Failure,
    purchase_failure: Failure,
    available_failure: Failure,
    finish_failure: Failure,

    init_calls: Vec<Option<ConnectionConfig>>,
    end_calls: u32,
    fetch_calls: Vec<(Vec<String>, ProductQueryKind)>,
    purchase_requests: Vec<PlatformPurchaseRequest>,
    available_calls: Vec<Option<AvailablePurchasesOptions>>,
    finish_calls: Vec<FinishTransactionParams>,
    refund_requests: Vec<String>,
    external_link_urls: Vec<String>,
    listener_counts: ListenerCounts,

    purchase_updated_listener: Option<RawPurchaseListener>,
    purchase_error_listener: Option<RawPurchaseErrorListener>,
    promoted_product_listener: Option<RawProductListener>,
}

/// A scriptable [`PurchaseProvider`] that records every call it receives.
pub struct MockPurchaseProvider {
    platform: IapPlatform,
    state: RwLock<MockState>,
}

impl MockPurchaseProvider {
    /// Create a mock App Store bridge.
    pub fn ios() -> Arc<Self> {
        Self::new(IapPlatform::Ios)
    }

    /// Create a mock Play store bridge.
    pub fn android() -> Arc<Self> {
        Self::new(IapPlatform::Android)
    }

    /// Create a mock bridge for the given platform.
    pub fn new(platform: IapPlatform) -> Arc<Self> {
        Arc::new(Self {
            platform,
            state: RwLock::new(MockState {
                storefront: "USA".to_string(),
                receipt_data: "bW9jay1yZWNlaXB0".to_string(),
                ..MockState::default()
            }),
        })
    }

    /// Put products on the shelf for `fetch_products`.
    pub fn set_catalog(&self, products: Vec<RawProduct>) {
        self.state.write().unwrap().catalog = products;
    }

    /// Set the snapshot returned by `get_available_purchases`.
    pub fn set_available_purchases(&self, purchases: Vec<RawPurchase>) {
        self.state.write().unwrap().available_purchases = purchases;
    }

    /// Set the storefront country code.
    pub fn set_storefront(&self, storefront: &str) {
        self.state.write().unwrap().storefront = storefront.to_string();
    }

    /// Set the app transaction JWS.
    pub fn set_app_transaction(&self, jws: Option<String>) {
        self.state.write().unwrap().app_transaction = jws;
    }

    /// Set the refund request outcome.
    pub fn set_refund_status(&self, status: Option<String>) {
        self.state.write().unwrap().refund_status = status;
    }

    /// Set the subscription statuses returned for any sku.
    pub fn set_subscription_statuses(&self, statuses: Vec<RawSubscriptionStatus>) {
        self.state.write().unwrap().subscription_statuses = statuses;
    }

    /// Allow or deny external purchase links.
    pub fn set_external_link_allowed(&self, allowed: bool) {
        self.state.write().unwrap().external_link_allowed = allowed;
    }

    /// Configure alternative billing availability and token.
    pub fn set_alternative_billing(&self, available: bool, token: Option<String>) {
        let mut state = self.state.write().unwrap();
        state.alternative_billing_available = available;
        state.alternative_billing_token = token;
    }

    /// Make `init_connection` report the store as unreachable (`Ok(false)`).
    pub fn set_store_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().store_unreachable = unreachable;
    }

    /// Make `init_connection` fail until cleared.
    pub fn fail_init_connection(&self, code: ErrorCode, message: &str) {
        self.state.write().unwrap().init_failure = Some((code, message.to_string()));
    }

    /// Make `fetch_products` fail until cleared.
    pub fn fail_fetch_products(&self, code: ErrorCode, message: &str) {
        self.state.write().unwrap().fetch_failure = Some((code, message.to_string()));
    }

    /// Make `request_purchase` fail until cleared.
    pub fn fail_request_purchase(&self, code: ErrorCode, message: &str) {
        self.state.write().unwrap().purchase_failure = Some((code, message.to_string()));
    }

    /// Make `get_available_purchases` fail until cleared.
    pub fn fail_get_available_purchases(&self, code: ErrorCode, message: &str) {
        self.state.write().unwrap().available_failure = Some((code, message.to_string()));
    }

    /// Make `finish_transaction` fail until cleared.
    pub fn fail_finish_transaction(&self, code: ErrorCode, message: &str) {
        self.state.write().unwrap().finish_failure = Some((code, message.to_string()));
    }

    /// Clear every scripted failure.
    pub fn clear_failures(&self) {
        let mut state = self.state.write().unwrap();
        state.init_failure = None;
        state.fetch_failure = None;
        state.purchase_failure = None;
        state.available_failure = None;
        state.finish_failure = None;
    }

    /// Deliver a purchase-updated event. Returns whether a listener was
    /// attached to receive it.
    pub fn emit_purchase_updated(&self, purchase: RawPurchase) -> bool {
        let listener = self.state.read().unwrap().purchase_updated_listener.clone();
        match listener {
            Some(listener) => {
                listener(purchase);
                true
            }
            None => false,
        }
    }

    /// Deliver a purchase-error event. Returns whether a listener was attached.
    pub fn emit_purchase_error(&self, error: RawPurchaseError) -> bool {
        let listener = self.state.read().unwrap().purchase_error_listener.clone();
        match listener {
            Some(listener) => {
                listener(error);
                true
            }
            None => false,
        }
    }

    /// Deliver a promoted-product event. Returns whether a listener was
    /// attached.
    pub fn emit_promoted_product(&self, product: RawProduct) -> bool {
        let listener = self.state.read().unwrap().promoted_product_listener.clone();
        match listener {
            Some(listener) => {
                listener(product);
                true
            }
            None => false,
        }
    }

    /// Configs passed to `init_connection`, in call order.
    pub fn init_calls(&self) -> Vec<Option<ConnectionConfig>> {
        self.state.read().unwrap().init_calls.clone()
    }

    /// Number of `end_connection` calls.
    pub fn end_calls(&self) -> u32 {
        self.state.read().unwrap().end_calls
    }

    /// Arguments of every `fetch_products` call, in call order.
    pub fn fetch_calls(&self) -> Vec<(Vec<String>, ProductQueryKind)> {
        self.state.read().unwrap().fetch_calls.clone()
    }

    /// Every payload handed to `request_purchase`, in call order.
    pub fn purchase_requests(&self) -> Vec<PlatformPurchaseRequest> {
        self.state.read().unwrap().purchase_requests.clone()
    }

    /// Options of every `get_available_purchases` call, in call order.
    pub fn available_calls(&self) -> Vec<Option<AvailablePurchasesOptions>> {
        self.state.read().unwrap().available_calls.clone()
    }

    /// Every payload handed to `finish_transaction`, in call order.
    pub fn finish_calls(&self) -> Vec<FinishTransactionParams> {
        self.state.read().unwrap().finish_calls.clone()
    }

    /// Skus passed to `begin_refund_request_ios`, in call order.
    pub fn refund_requests(&self) -> Vec<String> {
        self.state.read().unwrap().refund_requests.clone()
    }

    /// Urls passed to `present_external_purchase_link_ios`, in call order.
    pub fn external_link_urls(&self) -> Vec<String> {
        self.state.read().unwrap().external_link_urls.clone()
    }

    /// Native listener attach/detach counts.
    pub fn listener_counts(&self) -> ListenerCounts {
        self.state.read().unwrap().listener_counts
    }

    /// Whether a purchase-updated listener is currently attached.
    pub fn has_purchase_updated_listener(&self) -> bool {
        self.state.read().unwrap().purchase_updated_listener.is_some()
    }

    /// Whether a purchase-error listener is currently attached.
    pub fn has_purchase_error_listener(&self) -> bool {
        self.state.read().unwrap().purchase_error_listener.is_some()
    }

    /// Whether a promoted-product listener is currently attached.
    pub fn has_promoted_product_listener(&self) -> bool {
        self.state.read().unwrap().promoted_product_listener.is_some()
    }

    fn check_failure(&self, failure: &Failure) -> Result<()> {
        match failure {
            Some((code, message)) => Err(IapError::provider(*code, message.clone())),
            None => Ok(()),
        }
    }

    fn require_platform(&self, required: IapPlatform, operation: &str) -> Result<()> {
        if self.platform == required {
            Ok(())
        } else {
            Err(IapError::PlatformMismatch {
                operation: operation.to_string(),
                required,
                actual: self.platform,
            })
        }
    }
}

#[async_trait]
impl PurchaseProvider for MockPurchaseProvider {
    fn platform(&self) -> IapPlatform {
        self.platform
    }

    async fn init_connection(&self, config: Option<ConnectionConfig>) -> Result<bool> {
        let (failure, unreachable) = {
            let mut state = self.state.write().unwrap();
            state.init_calls.push(config);
            (state.init_failure.clone(), state.store_unreachable)
        };
        self.check_failure(&failure)?;
        Ok(!unreachable)
    }

    async fn end_connection(&self) -> Result<bool> {
        self.state.write().unwrap().end_calls += 1;
        Ok(true)
    }

    async fn fetch_products(
        &self,
        skus: &[String],
        kind: ProductQueryKind,
    ) -> Result<Vec<RawProduct>> {
        let (failure, catalog) = {
            let mut state = self.state.write().unwrap();
            state.fetch_calls.push((skus.to_vec(), kind));
            (state.fetch_failure.clone(), state.catalog.clone())
        };
        self.check_failure(&failure)?;

        Ok(catalog
            .into_iter()
            .filter(|product| skus.contains(&product.id))
            .filter(|product| match kind {
                ProductQueryKind::All => true,
                ProductQueryKind::Subs => product.product_type.as_deref() == Some("subs"),
                ProductQueryKind::InApp => product.product_type.as_deref() != Some("subs"),
            })
            .collect())
    }

    async fn request_purchase(&self, request: PlatformPurchaseRequest) -> Result<()> {
        let failure = {
            let mut state = self.state.write().unwrap();
            state.purchase_requests.push(request);
            state.purchase_failure.clone()
        };
        self.check_failure(&failure)
    }

    async fn get_available_purchases(
        &self,
        options: Option<AvailablePurchasesOptions>,
    ) -> Result<Vec<RawPurchase>> {
        let (failure, purchases) = {
            let mut state = self.state.write().unwrap();
            state.available_calls.push(options);
            (
                state.available_failure.clone(),
                state.available_purchases.clone(),
            )
        };
        self.check_failure(&failure)?;
        Ok(purchases)
    }

    async fn finish_transaction(&self, params: FinishTransactionParams) -> Result<()> {
        let failure = {
            let mut state = self.state.write().unwrap();
            state.finish_calls.push(params);
            state.finish_failure.clone()
        };
        self.check_failure(&failure)
    }

    fn set_purchase_updated_listener(&self, listener: Option<RawPurchaseListener>) {
        let mut state = self.state.write().unwrap();
        match &listener {
            Some(_) => state.listener_counts.updated_sets += 1,
            None => state.listener_counts.updated_clears += 1,
        }
        state.purchase_updated_listener = listener;
    }

    fn set_purchase_error_listener(&self, listener: Option<RawPurchaseErrorListener>) {
        let mut state = self.state.write().unwrap();
        match &listener {
            Some(_) => state.listener_counts.error_sets += 1,
            None => state.listener_counts.error_clears += 1,
        }
        state.purchase_error_listener = listener;
    }

    fn set_promoted_product_listener(&self, listener: Option<RawProductListener>) {
        let mut state = self.state.write().unwrap();
        match &listener {
            Some(_) => state.listener_counts.promoted_sets += 1,
            None => state.listener_counts.promoted_clears += 1,
        }
        state.promoted_product_listener = listener;
    }

    async fn get_storefront_ios(&self) -> Result<String> {
        self.require_platform(IapPlatform::Ios, "get_storefront_ios")?;
        Ok(self.state.read().unwrap().storefront.clone())
    }

    async fn get_app_transaction_ios(&self) -> Result<Option<String>> {
        self.require_platform(IapPlatform::Ios, "get_app_transaction_ios")?;
        Ok(self.state.read().unwrap().app_transaction.clone())
    }

    async fn get_receipt_data_ios(&self) -> Result<String> {
        self.require_platform(IapPlatform::Ios, "get_receipt_data_ios")?;
        Ok(self.state.read().unwrap().receipt_data.clone())
    }

    async fn present_code_redemption_sheet_ios(&self) -> Result<bool> {
        self.require_platform(IapPlatform::Ios, "present_code_redemption_sheet_ios")?;
        Ok(true)
    }

    async fn begin_refund_request_ios(&self, sku: &str) -> Result<Option<String>> {
        self.require_platform(IapPlatform::Ios, "begin_refund_request_ios")?;
        let mut state = self.state.write().unwrap();
        state.refund_requests.push(sku.to_string());
        Ok(state.refund_status.clone())
    }

    async fn subscription_status_ios(&self, _sku: &str) -> Result<Vec<RawSubscriptionStatus>> {
        self.require_platform(IapPlatform::Ios, "subscription_status_ios")?;
        Ok(self.state.read().unwrap().subscription_statuses.clone())
    }

    async fn can_present_external_purchase_link_ios(&self) -> Result<bool> {
        self.require_platform(IapPlatform::Ios, "can_present_external_purchase_link_ios")?;
        Ok(self.state.read().unwrap().external_link_allowed)
    }

    async fn present_external_purchase_link_ios(
        &self,
        url: &str,
    ) -> Result<ExternalPurchaseLinkResultIos> {
        self.require_platform(IapPlatform::Ios, "present_external_purchase_link_ios")?;
        let mut state = self.state.write().unwrap();
        state.external_link_urls.push(url.to_string());
        if state.external_link_allowed {
            Ok(ExternalPurchaseLinkResultIos {
                success: true,
                error: None,
            })
        } else {
            Ok(ExternalPurchaseLinkResultIos {
                success: false,
                error: Some("external purchase links are not allowed".to_string()),
            })
        }
    }

    async fn check_alternative_billing_availability_android(&self) -> Result<bool> {
        self.require_platform(
            IapPlatform::Android,
            "check_alternative_billing_availability_android",
        )?;
        Ok(self.state.read().unwrap().alternative_billing_available)
    }

    async fn show_alternative_billing_dialog_android(&self) -> Result<bool> {
        self.require_platform(
            IapPlatform::Android,
            "show_alternative_billing_dialog_android",
        )?;
        Ok(true)
    }

    async fn create_alternative_billing_token_android(&self) -> Result<Option<String>> {
        self.require_platform(
            IapPlatform::Android,
            "create_alternative_billing_token_android",
        )?;
        Ok(self.state.read().unwrap().alternative_billing_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fetch_filters_by_sku_and_kind() {
        let provider = MockPurchaseProvider::android();
        provider.set_catalog(vec![
            fixtures::android_product("coins_100"),
            fixtures::android_subscription("premium_monthly"),
        ]);

        let skus = vec!["coins_100".to_string(), "premium_monthly".to_string()];

        let inapp = provider
            .fetch_products(&skus, ProductQueryKind::InApp)
            .await
            .unwrap();
        assert_eq!(inapp.len(), 1);
        assert_eq!(inapp[0].id, "coins_100");

        let subs = provider
            .fetch_products(&skus, ProductQueryKind::Subs)
            .await
            .unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, "premium_monthly");

        let all = provider
            .fetch_products(&skus, ProductQueryKind::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        assert_eq!(provider.fetch_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let provider = MockPurchaseProvider::android();
        provider.fail_fetch_products(ErrorCode::NetworkError, "offline");

        let err = provider
            .fetch_products(&["coins_100".to_string()], ProductQueryKind::All)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NetworkError));

        provider.clear_failures();
        assert!(provider
            .fetch_products(&["coins_100".to_string()], ProductQueryKind::All)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_emit_reaches_attached_listener() {
        let provider = MockPurchaseProvider::android();
        let delivered = Arc::new(AtomicUsize::new(0));

        // Nothing attached yet
        assert!(!provider.emit_purchase_updated(fixtures::android_purchase("o1", "coins_100")));

        let counter = delivered.clone();
        provider.set_purchase_updated_listener(Some(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        assert!(provider.emit_purchase_updated(fixtures::android_purchase("o2", "coins_100")));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        provider.set_purchase_updated_listener(None);
        assert!(!provider.emit_purchase_updated(fixtures::android_purchase("o3", "coins_100")));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        let counts = provider.listener_counts();
        assert_eq!(counts.updated_sets, 1);
        assert_eq!(counts.updated_clears, 1);
    }

    #[tokio::test]
    async fn test_platform_guard_on_exclusive_operations() {
        let provider = MockPurchaseProvider::android();
        let err = provider.get_storefront_ios().await.unwrap_err();
        assert!(err.to_string().contains("only available on ios"));

        let provider = MockPurchaseProvider::ios();
        assert_eq!(provider.get_storefront_ios().await.unwrap(), "USA");
        let err = provider
            .check_alternative_billing_availability_android()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("only available on android"));
    }

    #[tokio::test]
    async fn test_call_recording() {
        let provider = MockPurchaseProvider::ios();
        provider.init_connection(None).await.unwrap();
        provider.end_connection().await.unwrap();
        provider
            .finish_transaction(FinishTransactionParams::Ios {
                transaction_id: "txn-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(provider.init_calls().len(), 1);
        assert_eq!(provider.end_calls(), 1);
        assert_eq!(provider.finish_calls().len(), 1);
    }
}
