//! Purchase event fan-out.
//!
//! Any number of application listeners share one native subscription per
//! channel: the first registration attaches the provider listener, the last
//! removal detaches it. Raw payloads are normalized before fan-out, and
//! purchase events that fail validation are dropped with a warning instead of
//! reaching application code.

use std::sync::{Arc, Mutex, RwLock, Weak};

use purchasekit_lib::normalize::{
    normalize_product, normalize_purchase, normalize_purchase_error, validate_product,
    validate_purchase,
};
use purchasekit_lib::provider::PurchaseProvider;
use purchasekit_lib::{Product, Purchase, PurchaseError, RawProduct, RawPurchase, RawPurchaseError};
use tracing::warn;
use uuid::Uuid;

/// Application listener for normalized purchase updates.
pub type PurchaseUpdatedListener = Arc<dyn Fn(&Purchase) + Send + Sync>;
/// Application listener for normalized purchase failures.
pub type PurchaseErrorListener = Arc<dyn Fn(&PurchaseError) + Send + Sync>;
/// Application listener for App Store promoted products.
pub type PromotedProductListener = Arc<dyn Fn(&Product) + Send + Sync>;

/// Handle returned from listener registration.
///
/// Dropping the handle keeps the listener attached; only [`remove`] detaches
/// it. `remove` is idempotent.
///
/// [`remove`]: ListenerHandle::remove
pub struct ListenerHandle {
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenerHandle {
    fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// A handle whose removal does nothing.
    pub fn inert() -> Self {
        Self {
            detach: Mutex::new(None),
        }
    }

    /// Detach the listener. Calling again is a no-op.
    pub fn remove(&self) {
        let detach = self.detach.lock().unwrap().take();
        if let Some(detach) = detach {
            detach();
        }
    }

    /// Whether the listener was already removed (or the handle was inert).
    pub fn is_removed(&self) -> bool {
        self.detach.lock().unwrap().is_none()
    }
}

type Registry<L> = RwLock<Vec<(Uuid, L)>>;

/// Shared fan-out point between the native bridge and application listeners.
pub struct PurchaseEventManager {
    provider: Arc<dyn PurchaseProvider>,
    updated: Registry<PurchaseUpdatedListener>,
    errors: Registry<PurchaseErrorListener>,
    promoted: Registry<PromotedProductListener>,
}

impl PurchaseEventManager {
    /// Create a manager over the given provider. No native listener is
    /// attached until the first application listener registers.
    pub fn new(provider: Arc<dyn PurchaseProvider>) -> Arc<Self> {
        Arc::new(Self {
            provider,
            updated: RwLock::new(Vec::new()),
            errors: RwLock::new(Vec::new()),
            promoted: RwLock::new(Vec::new()),
        })
    }

    /// Register a purchase-updated listener.
    pub fn on_purchase_updated(self: &Arc<Self>, listener: PurchaseUpdatedListener) -> ListenerHandle {
        let id = Uuid::new_v4();
        {
            // The native listener is attached while the registry lock is
            // held so concurrent first registrations attach exactly once.
            let mut listeners = self.updated.write().unwrap();
            if listeners.is_empty() {
                let manager = Arc::downgrade(self);
                self.provider
                    .set_purchase_updated_listener(Some(Arc::new(move |raw| {
                        dispatch_purchase_updated(&manager, raw);
                    })));
            }
            listeners.push((id, listener));
        }

        let manager = Arc::downgrade(self);
        ListenerHandle::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.remove_purchase_updated(id);
            }
        })
    }

    /// Register a purchase-error listener.
    pub fn on_purchase_error(self: &Arc<Self>, listener: PurchaseErrorListener) -> ListenerHandle {
        let id = Uuid::new_v4();
        {
            let mut listeners = self.errors.write().unwrap();
            if listeners.is_empty() {
                let manager = Arc::downgrade(self);
                self.provider
                    .set_purchase_error_listener(Some(Arc::new(move |raw| {
                        dispatch_purchase_error(&manager, raw);
                    })));
            }
            listeners.push((id, listener));
        }

        let manager = Arc::downgrade(self);
        ListenerHandle::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.remove_purchase_error(id);
            }
        })
    }

    /// Register a promoted-product listener.
    ///
    /// Promoted products only exist on the App Store. On Android providers
    /// this warns and returns an inert handle without touching the provider.
    pub fn on_promoted_product(self: &Arc<Self>, listener: PromotedProductListener) -> ListenerHandle {
        if self.provider.platform().is_android() {
            warn!("promoted products are ios-only; this listener will never fire");
            return ListenerHandle::inert();
        }

        let id = Uuid::new_v4();
        {
            let mut listeners = self.promoted.write().unwrap();
            if listeners.is_empty() {
                let manager = Arc::downgrade(self);
                self.provider
                    .set_promoted_product_listener(Some(Arc::new(move |raw| {
                        dispatch_promoted_product(&manager, raw);
                    })));
            }
            listeners.push((id, listener));
        }

        let manager = Arc::downgrade(self);
        ListenerHandle::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.remove_promoted_product(id);
            }
        })
    }

    /// Remove every listener and detach the native subscriptions.
    pub fn detach_all(&self) {
        {
            let mut listeners = self.updated.write().unwrap();
            if !listeners.is_empty() {
                listeners.clear();
                self.provider.set_purchase_updated_listener(None);
            }
        }
        {
            let mut listeners = self.errors.write().unwrap();
            if !listeners.is_empty() {
                listeners.clear();
                self.provider.set_purchase_error_listener(None);
            }
        }
        {
            let mut listeners = self.promoted.write().unwrap();
            if !listeners.is_empty() {
                listeners.clear();
                self.provider.set_promoted_product_listener(None);
            }
        }
    }

    /// Number of registered listeners per channel (updated, error, promoted).
    pub fn listener_counts(&self) -> (usize, usize, usize) {
        (
            self.updated.read().unwrap().len(),
            self.errors.read().unwrap().len(),
            self.promoted.read().unwrap().len(),
        )
    }

    fn remove_purchase_updated(&self, id: Uuid) {
        let mut listeners = self.updated.write().unwrap();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        // Detach natively only when this call removed the last listener;
        // a registry already emptied elsewhere must not detach twice.
        if listeners.len() != before && listeners.is_empty() {
            self.provider.set_purchase_updated_listener(None);
        }
    }

    fn remove_purchase_error(&self, id: Uuid) {
        let mut listeners = self.errors.write().unwrap();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        if listeners.len() != before && listeners.is_empty() {
            self.provider.set_purchase_error_listener(None);
        }
    }

    fn remove_promoted_product(&self, id: Uuid) {
        let mut listeners = self.promoted.write().unwrap();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        if listeners.len() != before && listeners.is_empty() {
            self.provider.set_promoted_product_listener(None);
        }
    }

    fn updated_snapshot(&self) -> Vec<PurchaseUpdatedListener> {
        self.updated
            .read()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    fn errors_snapshot(&self) -> Vec<PurchaseErrorListener> {
        self.errors
            .read()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    fn promoted_snapshot(&self) -> Vec<PromotedProductListener> {
        self.promoted
            .read()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }
}

// Dispatchers run on the bridge's delivery context. Listeners are cloned out
// of the registry before invocation so a callback can remove itself (or
// register new listeners) without deadlocking.

fn dispatch_purchase_updated(manager: &Weak<PurchaseEventManager>, raw: RawPurchase) {
    let Some(manager) = manager.upgrade() else {
        return;
    };
    let purchase = normalize_purchase(raw);
    if !validate_purchase(&purchase) {
        warn!(id = purchase.id(), "dropping malformed purchase event");
        return;
    }
    for listener in manager.updated_snapshot() {
        listener(&purchase);
    }
}

fn dispatch_purchase_error(manager: &Weak<PurchaseEventManager>, raw: RawPurchaseError) {
    let Some(manager) = manager.upgrade() else {
        return;
    };
    let error = normalize_purchase_error(raw);
    for listener in manager.errors_snapshot() {
        listener(&error);
    }
}

fn dispatch_promoted_product(manager: &Weak<PurchaseEventManager>, raw: RawProduct) {
    let Some(manager) = manager.upgrade() else {
        return;
    };
    let product = normalize_product(raw);
    if !validate_product(&product) {
        warn!(id = product.id(), "dropping malformed promoted product event");
        return;
    }
    for listener in manager.promoted_snapshot() {
        listener(&product);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purchasekit_lib::test_utils::{fixtures, MockPurchaseProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: &Arc<AtomicUsize>) -> PurchaseUpdatedListener {
        let counter = counter.clone();
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_single_native_subscription_for_many_listeners() {
        let provider = MockPurchaseProvider::android();
        let manager = PurchaseEventManager::new(provider.clone());

        let counter = Arc::new(AtomicUsize::new(0));
        let first = manager.on_purchase_updated(counting_listener(&counter));
        let second = manager.on_purchase_updated(counting_listener(&counter));
        let third = manager.on_purchase_updated(counting_listener(&counter));

        // Three application listeners, one native attach
        assert_eq!(provider.listener_counts().updated_sets, 1);
        assert_eq!(manager.listener_counts().0, 3);

        provider.emit_purchase_updated(fixtures::android_purchase("o1", "coins_100"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        first.remove();
        second.remove();
        assert_eq!(provider.listener_counts().updated_clears, 0);

        third.remove();
        // Last removal detaches natively, exactly once
        assert_eq!(provider.listener_counts().updated_clears, 1);
        assert!(!provider.has_purchase_updated_listener());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let provider = MockPurchaseProvider::android();
        let manager = PurchaseEventManager::new(provider.clone());

        let handle = manager.on_purchase_updated(Arc::new(|_| {}));
        assert!(!handle.is_removed());

        handle.remove();
        handle.remove();
        handle.remove();

        assert!(handle.is_removed());
        assert_eq!(provider.listener_counts().updated_clears, 1);

        // Re-attach works after the channel went idle
        let _handle = manager.on_purchase_updated(Arc::new(|_| {}));
        assert_eq!(provider.listener_counts().updated_sets, 2);
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let provider = MockPurchaseProvider::android();
        let manager = PurchaseEventManager::new(provider.clone());

        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            let _ = manager.on_purchase_updated(Arc::new(move |_| {
                order.lock().unwrap().push(tag);
            }));
        }

        provider.emit_purchase_updated(fixtures::android_purchase("o1", "coins_100"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_malformed_purchase_events_are_dropped() {
        let provider = MockPurchaseProvider::android();
        let manager = PurchaseEventManager::new(provider.clone());

        let counter = Arc::new(AtomicUsize::new(0));
        let _handle = manager.on_purchase_updated(counting_listener(&counter));

        // No product id: fails validation, never delivered
        provider.emit_purchase_updated(purchasekit_lib::RawPurchase {
            id: Some("orphan".to_string()),
            transaction_date: Some(1.0),
            ..purchasekit_lib::RawPurchase::default()
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        provider.emit_purchase_updated(fixtures::android_purchase("o1", "coins_100"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_channel_normalizes_codes() {
        let provider = MockPurchaseProvider::android();
        let manager = PurchaseEventManager::new(provider.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _handle = manager.on_purchase_error(Arc::new(move |error| {
            sink.lock().unwrap().push(error.code);
        }));

        provider.emit_purchase_error(fixtures::purchase_error("E_USER_CANCELLED", "coins_100"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![purchasekit_lib::ErrorCode::UserCancelled]
        );
    }

    #[test]
    fn test_promoted_channel_is_inert_on_android() {
        let provider = MockPurchaseProvider::android();
        let manager = PurchaseEventManager::new(provider.clone());

        let handle = manager.on_promoted_product(Arc::new(|_| {}));
        assert!(handle.is_removed());
        assert_eq!(provider.listener_counts().promoted_sets, 0);
        assert!(!provider.has_promoted_product_listener());
        handle.remove();
    }

    #[test]
    fn test_promoted_channel_on_ios() {
        let provider = MockPurchaseProvider::ios();
        let manager = PurchaseEventManager::new(provider.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = manager.on_promoted_product(Arc::new(move |product| {
            sink.lock().unwrap().push(product.id().to_string());
        }));

        provider.emit_promoted_product(fixtures::ios_product("dev.purchasekit.premium.unlock"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["dev.purchasekit.premium.unlock".to_string()]
        );

        handle.remove();
        assert!(!provider.has_promoted_product_listener());
    }

    #[test]
    fn test_detach_all_then_handle_remove_does_not_double_detach() {
        let provider = MockPurchaseProvider::android();
        let manager = PurchaseEventManager::new(provider.clone());

        let updated = manager.on_purchase_updated(Arc::new(|_| {}));
        let errors = manager.on_purchase_error(Arc::new(|_| {}));

        manager.detach_all();
        assert_eq!(manager.listener_counts(), (0, 0, 0));
        assert_eq!(provider.listener_counts().updated_clears, 1);
        assert_eq!(provider.listener_counts().error_clears, 1);

        // Stale handles are harmless afterwards
        updated.remove();
        errors.remove();
        assert_eq!(provider.listener_counts().updated_clears, 1);
        assert_eq!(provider.listener_counts().error_clears, 1);
    }

    #[test]
    fn test_listener_can_remove_itself_during_dispatch() {
        let provider = MockPurchaseProvider::android();
        let manager = PurchaseEventManager::new(provider.clone());

        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let counter = Arc::new(AtomicUsize::new(0));

        let self_slot = slot.clone();
        let self_counter = counter.clone();
        let handle = manager.on_purchase_updated(Arc::new(move |_| {
            self_counter.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = self_slot.lock().unwrap().take() {
                handle.remove();
            }
        }));
        *slot.lock().unwrap() = Some(handle);

        provider.emit_purchase_updated(fixtures::android_purchase("o1", "coins_100"));
        provider.emit_purchase_updated(fixtures::android_purchase("o2", "coins_100"));

        // Delivered once, then the listener removed itself
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!provider.has_purchase_updated_listener());
    }
}
