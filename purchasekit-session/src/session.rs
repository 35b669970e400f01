//! Stateful purchase lifecycle coordination.
//!
//! An [`IapSession`] owns the store connection, keeps a snapshot of loaded
//! products and owned purchases, and routes purchase events to application
//! callbacks. All async store calls go through the [`PurchaseProvider`] seam;
//! state lives behind a `std::sync::RwLock` and is never held across an await.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use purchasekit_lib::normalize::normalize_subscription_status;
use purchasekit_lib::{
    build_purchase_request, normalize_products, normalize_purchases,
    resolve_android_purchase_token, ActiveSubscription, AndroidFinishAction,
    AvailablePurchasesOptions, ConnectionConfig, ErrorCode, ExternalPurchaseLinkResultIos,
    FinishTransactionParams, IapError, IapPlatform, Product, ProductQueryKind, Purchase,
    PurchaseError, PurchaseProvider, PurchaseRequest, Result, SubscriptionStatusIos,
};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::events::{ListenerHandle, PurchaseEventManager};
use crate::subscriptions::derive_active_subscriptions;

/// Connection lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Callback invoked for every successful purchase update.
pub type PurchaseSuccessCallback = Arc<dyn Fn(&Purchase) + Send + Sync>;
/// Callback invoked for every purchase failure.
pub type PurchaseFailureCallback = Arc<dyn Fn(&PurchaseError) + Send + Sync>;
/// Callback invoked when the App Store delivers a promoted product.
pub type PromotedProductCallback = Arc<dyn Fn(&Product) + Send + Sync>;
/// Callback invoked when a background purchase sync fails.
pub type SyncErrorCallback = Arc<dyn Fn(&IapError) + Send + Sync>;
/// Callback invoked for session-level failures (connection setup and the like).
pub type SessionErrorCallback = Arc<dyn Fn(&IapError) + Send + Sync>;

/// Configuration and callbacks for a session.
#[derive(Clone, Default)]
pub struct SessionOptions {
    /// Connection configuration forwarded to the provider.
    pub connection: Option<ConnectionConfig>,
    pub on_purchase_success: Option<PurchaseSuccessCallback>,
    pub on_purchase_error: Option<PurchaseFailureCallback>,
    pub on_promoted_product_ios: Option<PromotedProductCallback>,
    pub on_sync_error: Option<SyncErrorCallback>,
    pub on_error: Option<SessionErrorCallback>,
}

impl SessionOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection configuration.
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Invoke the callback for every purchase delivered by the store.
    pub fn with_on_purchase_success(
        mut self,
        callback: impl Fn(&Purchase) + Send + Sync + 'static,
    ) -> Self {
        self.on_purchase_success = Some(Arc::new(callback));
        self
    }

    /// Invoke the callback for every purchase failure.
    pub fn with_on_purchase_error(
        mut self,
        callback: impl Fn(&PurchaseError) + Send + Sync + 'static,
    ) -> Self {
        self.on_purchase_error = Some(Arc::new(callback));
        self
    }

    /// Invoke the callback when the App Store delivers a promoted product.
    pub fn with_on_promoted_product_ios(
        mut self,
        callback: impl Fn(&Product) + Send + Sync + 'static,
    ) -> Self {
        self.on_promoted_product_ios = Some(Arc::new(callback));
        self
    }

    /// Invoke the callback when restoring purchases fails.
    pub fn with_on_sync_error(
        mut self,
        callback: impl Fn(&IapError) + Send + Sync + 'static,
    ) -> Self {
        self.on_sync_error = Some(Arc::new(callback));
        self
    }

    /// Invoke the callback for session-level failures.
    pub fn with_on_error(mut self, callback: impl Fn(&IapError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

/// A product catalog query.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRequest {
    pub skus: Vec<String>,
    pub kind: ProductQueryKind,
}

impl ProductRequest {
    /// Query in-app products for the given skus.
    pub fn new<I, S>(skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            skus: skus.into_iter().map(Into::into).collect(),
            kind: ProductQueryKind::InApp,
        }
    }

    /// Query subscription products for the given skus.
    pub fn subscriptions<I, S>(skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(skus).with_kind(ProductQueryKind::Subs)
    }

    /// Override which catalog the query targets.
    pub fn with_kind(mut self, kind: ProductQueryKind) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Default)]
struct SessionState {
    connection: ConnectionState,
    products: Vec<Product>,
    subscriptions: Vec<Product>,
    available_purchases: Vec<Purchase>,
    active_subscriptions: Vec<ActiveSubscription>,
    current_purchase: Option<Purchase>,
    current_purchase_error: Option<PurchaseError>,
    promoted_product_ios: Option<Product>,
}

/// A live purchase session over one store connection.
///
/// Created with [`IapSession::start`], torn down with [`IapSession::end`].
/// The session keeps the last known products, purchases and active
/// subscriptions readable through synchronous snapshot accessors while the
/// async operations refresh them.
pub struct IapSession {
    provider: Arc<dyn PurchaseProvider>,
    events: Arc<PurchaseEventManager>,
    options: SessionOptions,
    state: RwLock<SessionState>,
    handles: Mutex<Vec<ListenerHandle>>,
    closed: AtomicBool,
}

impl IapSession {
    /// Open the store connection and attach purchase listeners.
    ///
    /// Never fails: when the store is unreachable the session comes back in
    /// the [`ConnectionState::Failed`] state and the failure is routed to
    /// `on_error` (or logged when no callback is set). Listeners are attached
    /// before the session reports `connected() == true`, so no purchase event
    /// delivered after a successful start can be missed.
    pub async fn start(provider: Arc<dyn PurchaseProvider>, options: SessionOptions) -> Arc<Self> {
        let session = Arc::new(Self {
            events: PurchaseEventManager::new(provider.clone()),
            provider,
            options,
            state: RwLock::new(SessionState::default()),
            handles: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        session.connect().await;
        session
    }

    /// Tear down the session: detach listeners, end the store connection and
    /// reset all snapshot state. Safe to call at any point, more than once.
    pub async fn end(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            handle.remove();
        }
        self.events.detach_all();
        if let Err(err) = self.provider.end_connection().await {
            warn!(error = %err, "store connection teardown failed");
        }
        *self.state.write().unwrap() = SessionState::default();
    }

    /// The platform this session talks to.
    pub fn platform(&self) -> IapPlatform {
        self.provider.platform()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().unwrap().connection
    }

    /// Whether the store connection is up.
    pub fn connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Fetch products and merge them into the session snapshot.
    ///
    /// Subscriptions and in-app products are kept in separate buckets; a
    /// refetched id replaces the stored entry. Returns the fetched batch.
    pub async fn request_products(&self, request: &ProductRequest) -> Result<Vec<Product>> {
        self.ensure_connected()?;
        let raw = self.provider.fetch_products(&request.skus, request.kind).await?;
        let products = normalize_products(raw);
        self.store_products(products.clone());
        Ok(products)
    }

    /// Start the native purchase flow.
    ///
    /// Clears the current purchase and error views first; the outcome arrives
    /// through the purchase-updated or purchase-error listener.
    pub async fn request_purchase(&self, request: &PurchaseRequest) -> Result<()> {
        self.ensure_connected()?;
        {
            let mut state = self.state.write().unwrap();
            state.current_purchase = None;
            state.current_purchase_error = None;
        }
        let platform_request = build_purchase_request(request, self.provider.platform())?;
        self.provider.request_purchase(platform_request).await
    }

    /// Finalize a delivered purchase with the store.
    ///
    /// iOS finishes by transaction id; a rejection saying the transaction was
    /// already finished counts as success. Android consumes when
    /// `is_consumable`, acknowledges otherwise, resolving the purchase token
    /// through the documented fallback chain.
    pub async fn finish_transaction(&self, purchase: &Purchase, is_consumable: bool) -> Result<()> {
        self.ensure_connected()?;
        match purchase {
            Purchase::Ios(_) => {
                let transaction_id = purchase.id().trim();
                if transaction_id.is_empty() {
                    return Err(IapError::MissingTransactionId {
                        product_id: purchase.product_id().to_string(),
                    });
                }
                let params = FinishTransactionParams::Ios {
                    transaction_id: transaction_id.to_string(),
                };
                match self.provider.finish_transaction(params).await {
                    Err(err) if err.is_already_finished() => {
                        debug!(transaction_id, "transaction was already finished");
                        Ok(())
                    }
                    other => other,
                }
            }
            Purchase::Android(android) => {
                let purchase_token = resolve_android_purchase_token(android).ok_or_else(|| {
                    IapError::MissingPurchaseToken {
                        product_id: purchase.product_id().to_string(),
                    }
                })?;
                let action = if is_consumable {
                    AndroidFinishAction::Consume
                } else {
                    AndroidFinishAction::Acknowledge
                };
                self.provider
                    .finish_transaction(FinishTransactionParams::Android {
                        purchase_token,
                        action,
                    })
                    .await
            }
        }
    }

    /// Fetch the purchases the user still owns and refresh the snapshot,
    /// including the derived active subscriptions.
    pub async fn get_available_purchases(
        &self,
        options: Option<AvailablePurchasesOptions>,
    ) -> Result<Vec<Purchase>> {
        self.ensure_connected()?;
        let raw = self.provider.get_available_purchases(options).await?;
        let purchases = normalize_purchases(raw);
        self.store_available_purchases(&purchases);
        Ok(purchases)
    }

    /// Refresh owned purchases and derive the active subscriptions, optionally
    /// restricted to the given product ids.
    ///
    /// On fetch failure this returns an empty list and leaves the previously
    /// cached snapshot untouched.
    pub async fn get_active_subscriptions(
        &self,
        subscription_ids: Option<&[String]>,
    ) -> Vec<ActiveSubscription> {
        match self.get_available_purchases(None).await {
            Ok(purchases) => derive_active_subscriptions(&purchases, subscription_ids, Utc::now()),
            Err(err) => {
                warn!(error = %err, "active subscription refresh failed, keeping cached snapshot");
                Vec::new()
            }
        }
    }

    /// Whether the user holds at least one active subscription, optionally
    /// restricted to the given product ids. False when the refresh fails.
    pub async fn has_active_subscriptions(&self, subscription_ids: Option<&[String]>) -> bool {
        self.get_active_subscriptions(subscription_ids)
            .await
            .iter()
            .any(|subscription| subscription.is_active)
    }

    /// Re-sync owned purchases after reinstall or device change.
    ///
    /// Failures are logged and routed to `on_sync_error`, never returned.
    pub async fn restore_purchases(&self) {
        if let Err(err) = self.get_available_purchases(None).await {
            warn!(error = %err, "purchase restore failed");
            if let Some(on_sync_error) = &self.options.on_sync_error {
                on_sync_error(&err);
            }
        }
    }

    /// Full purchase history including expired and revoked items.
    ///
    /// Play Billing removed the history query, so Android returns an empty
    /// list with a warning instead of an error.
    pub async fn get_purchase_histories(&self) -> Result<Vec<Purchase>> {
        match self.provider.platform() {
            IapPlatform::Ios => {
                let options = AvailablePurchasesOptions::default().with_only_active_items(false);
                self.get_available_purchases(Some(options)).await
            }
            IapPlatform::Android => {
                warn!("purchase history queries are not supported by play billing, returning an empty list");
                Ok(Vec::new())
            }
        }
    }

    /// Loaded in-app products.
    pub fn products(&self) -> Vec<Product> {
        self.state.read().unwrap().products.clone()
    }

    /// Loaded subscription products.
    pub fn subscriptions(&self) -> Vec<Product> {
        self.state.read().unwrap().subscriptions.clone()
    }

    /// Last fetched snapshot of owned purchases.
    pub fn available_purchases(&self) -> Vec<Purchase> {
        self.state.read().unwrap().available_purchases.clone()
    }

    /// Active subscriptions derived from the last snapshot.
    pub fn active_subscriptions(&self) -> Vec<ActiveSubscription> {
        self.state.read().unwrap().active_subscriptions.clone()
    }

    /// The purchase delivered by the most recent purchase-updated event.
    pub fn current_purchase(&self) -> Option<Purchase> {
        self.state.read().unwrap().current_purchase.clone()
    }

    /// The failure delivered by the most recent purchase-error event.
    pub fn current_purchase_error(&self) -> Option<PurchaseError> {
        self.state.read().unwrap().current_purchase_error.clone()
    }

    /// The most recent App Store promoted product.
    pub fn promoted_product_ios(&self) -> Option<Product> {
        self.state.read().unwrap().promoted_product_ios.clone()
    }

    /// Drop the current purchase view. The underlying transaction, if any,
    /// is unaffected.
    pub fn clear_current_purchase(&self) {
        self.state.write().unwrap().current_purchase = None;
    }

    /// Drop the current purchase error view.
    pub fn clear_current_purchase_error(&self) {
        self.state.write().unwrap().current_purchase_error = None;
    }

    /// Storefront country code. iOS only.
    pub async fn get_storefront_ios(&self) -> Result<String> {
        self.require_platform("get_storefront_ios", IapPlatform::Ios)?;
        self.ensure_connected()?;
        self.provider.get_storefront_ios().await
    }

    /// App transaction JWS when the device supports it. iOS only.
    pub async fn get_app_transaction_ios(&self) -> Result<Option<String>> {
        self.require_platform("get_app_transaction_ios", IapPlatform::Ios)?;
        self.ensure_connected()?;
        self.provider.get_app_transaction_ios().await
    }

    /// Base64-encoded app receipt. iOS only.
    pub async fn get_receipt_data_ios(&self) -> Result<String> {
        self.require_platform("get_receipt_data_ios", IapPlatform::Ios)?;
        self.ensure_connected()?;
        self.provider.get_receipt_data_ios().await
    }

    /// Present the offer code redemption sheet. iOS only.
    pub async fn present_code_redemption_sheet_ios(&self) -> Result<bool> {
        self.require_platform("present_code_redemption_sheet_ios", IapPlatform::Ios)?;
        self.ensure_connected()?;
        self.provider.present_code_redemption_sheet_ios().await
    }

    /// Begin a refund request for a sku, returning the resulting status. iOS only.
    pub async fn begin_refund_request_ios(&self, sku: &str) -> Result<Option<String>> {
        self.require_platform("begin_refund_request_ios", IapPlatform::Ios)?;
        self.ensure_connected()?;
        self.provider.begin_refund_request_ios(sku).await
    }

    /// Normalized StoreKit subscription statuses for a sku. iOS only.
    pub async fn get_subscription_status_ios(&self, sku: &str) -> Result<Vec<SubscriptionStatusIos>> {
        self.require_platform("get_subscription_status_ios", IapPlatform::Ios)?;
        self.ensure_connected()?;
        let raw = self.provider.subscription_status_ios(sku).await?;
        Ok(raw.into_iter().map(normalize_subscription_status).collect())
    }

    /// Whether an external purchase link can be presented. iOS only.
    pub async fn can_present_external_purchase_link_ios(&self) -> Result<bool> {
        self.require_platform("can_present_external_purchase_link_ios", IapPlatform::Ios)?;
        self.ensure_connected()?;
        self.provider.can_present_external_purchase_link_ios().await
    }

    /// Present an external purchase link. iOS only.
    pub async fn present_external_purchase_link_ios(
        &self,
        url: &str,
    ) -> Result<ExternalPurchaseLinkResultIos> {
        self.require_platform("present_external_purchase_link_ios", IapPlatform::Ios)?;
        self.ensure_connected()?;
        self.provider.present_external_purchase_link_ios(url).await
    }

    /// Whether alternative billing is available for this user. Android only.
    pub async fn check_alternative_billing_availability_android(&self) -> Result<bool> {
        self.require_platform(
            "check_alternative_billing_availability_android",
            IapPlatform::Android,
        )?;
        self.ensure_connected()?;
        self.provider
            .check_alternative_billing_availability_android()
            .await
    }

    /// Show the alternative billing information dialog. Android only.
    pub async fn show_alternative_billing_dialog_android(&self) -> Result<bool> {
        self.require_platform("show_alternative_billing_dialog_android", IapPlatform::Android)?;
        self.ensure_connected()?;
        self.provider.show_alternative_billing_dialog_android().await
    }

    /// Create an alternative billing reporting token. Android only.
    pub async fn create_alternative_billing_token_android(&self) -> Result<Option<String>> {
        self.require_platform(
            "create_alternative_billing_token_android",
            IapPlatform::Android,
        )?;
        self.ensure_connected()?;
        self.provider.create_alternative_billing_token_android().await
    }

    async fn connect(self: &Arc<Self>) {
        self.set_connection_state(ConnectionState::Connecting);
        match self
            .provider
            .init_connection(self.options.connection.clone())
            .await
        {
            Ok(true) => {
                // Listeners must be live before anyone can observe Connected.
                self.attach_listeners();
                self.set_connection_state(ConnectionState::Connected);
            }
            Ok(false) => {
                self.set_connection_state(ConnectionState::Failed);
                self.report_error(IapError::provider(
                    ErrorCode::IapNotAvailable,
                    "store connection is unavailable on this device",
                ));
            }
            Err(err) => {
                self.set_connection_state(ConnectionState::Failed);
                self.report_error(err);
            }
        }
    }

    fn attach_listeners(self: &Arc<Self>) {
        let session = Arc::downgrade(self);
        let updated = self.events.on_purchase_updated(Arc::new(move |purchase| {
            if let Some(session) = session.upgrade() {
                session.handle_purchase_updated(purchase);
            }
        }));

        let session = Arc::downgrade(self);
        let errors = self.events.on_purchase_error(Arc::new(move |error| {
            if let Some(session) = session.upgrade() {
                session.handle_purchase_error(error);
            }
        }));

        let promoted = self.provider.platform().is_ios().then(|| {
            let session = Arc::downgrade(self);
            self.events.on_promoted_product(Arc::new(move |product| {
                if let Some(session) = session.upgrade() {
                    session.handle_promoted_product(product);
                }
            }))
        });

        let mut handles = self.handles.lock().unwrap();
        if self.closed.load(Ordering::SeqCst) {
            // The session ended while we were attaching; undo right away.
            updated.remove();
            errors.remove();
            if let Some(promoted) = promoted {
                promoted.remove();
            }
            return;
        }
        handles.push(updated);
        handles.push(errors);
        if let Some(promoted) = promoted {
            handles.push(promoted);
        }
    }

    fn handle_purchase_updated(self: &Arc<Self>, purchase: &Purchase) {
        {
            let mut state = self.state.write().unwrap();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            state.current_purchase_error = None;
            state.current_purchase = Some(purchase.clone());
        }
        // A subscription purchase changes entitlements beyond the purchase
        // itself, so refetch that product and the owned snapshot.
        if purchase.expiration_date_ios().is_some()
            && self.is_loaded_subscription(purchase.product_id())
        {
            self.spawn_subscription_refresh(purchase.product_id().to_string());
        }
        if let Some(on_success) = &self.options.on_purchase_success {
            on_success(purchase);
        }
    }

    fn handle_purchase_error(&self, error: &PurchaseError) {
        {
            let mut state = self.state.write().unwrap();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            state.current_purchase_error = Some(error.clone());
        }
        if let Some(on_error) = &self.options.on_purchase_error {
            on_error(error);
        }
    }

    fn handle_promoted_product(&self, product: &Product) {
        {
            let mut state = self.state.write().unwrap();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            state.promoted_product_ios = Some(product.clone());
        }
        if let Some(on_promoted) = &self.options.on_promoted_product_ios {
            on_promoted(product);
        }
    }

    fn spawn_subscription_refresh(self: &Arc<Self>, product_id: String) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(
                product_id = %product_id,
                "no tokio runtime available, skipping post-purchase subscription refresh"
            );
            return;
        };
        let session = Arc::downgrade(self);
        runtime.spawn(async move {
            let Some(session) = session.upgrade() else {
                return;
            };
            if let Err(err) = session.refresh_after_purchase(&product_id).await {
                debug!(product_id = %product_id, error = %err, "post-purchase refresh failed");
            }
        });
    }

    async fn refresh_after_purchase(&self, product_id: &str) -> Result<()> {
        let raw = self
            .provider
            .fetch_products(&[product_id.to_string()], ProductQueryKind::Subs)
            .await?;
        self.store_products(normalize_products(raw));
        self.get_available_purchases(None).await?;
        Ok(())
    }

    fn store_products(&self, products: Vec<Product>) {
        let mut state = self.state.write().unwrap();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        for product in products {
            let bucket = if product.is_subscription() {
                &mut state.subscriptions
            } else {
                &mut state.products
            };
            match bucket.iter_mut().find(|existing| existing.id() == product.id()) {
                Some(existing) => *existing = product,
                None => bucket.push(product),
            }
        }
    }

    fn store_available_purchases(&self, purchases: &[Purchase]) {
        let active = derive_active_subscriptions(purchases, None, Utc::now());
        let mut state = self.state.write().unwrap();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        state.available_purchases = purchases.to_vec();
        state.active_subscriptions = active;
    }

    fn is_loaded_subscription(&self, product_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .subscriptions
            .iter()
            .any(|product| product.id() == product_id)
    }

    fn set_connection_state(&self, connection: ConnectionState) {
        let mut state = self.state.write().unwrap();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        state.connection = connection;
    }

    fn report_error(&self, error: IapError) {
        match &self.options.on_error {
            Some(on_error) => on_error(&error),
            None => warn!(error = %error, "session error with no on_error handler"),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected() {
            Ok(())
        } else {
            Err(IapError::NotConnected)
        }
    }

    fn require_platform(&self, operation: &str, required: IapPlatform) -> Result<()> {
        let actual = self.provider.platform();
        if actual == required {
            Ok(())
        } else {
            Err(IapError::PlatformMismatch {
                operation: operation.to_string(),
                required,
                actual,
            })
        }
    }
}
