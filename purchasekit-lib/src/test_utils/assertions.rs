//! Test assertions and verification helpers.

use crate::purchase::{ActiveSubscription, Purchase, PurchaseState};
use crate::IapPlatform;

/// Assert that a purchase completed.
///
/// # Panics
/// Panics if the purchase is not in the purchased state.
pub fn assert_purchase_purchased(purchase: &Purchase) {
    assert_eq!(
        purchase.purchase_state(),
        PurchaseState::Purchased,
        "purchase {} should be purchased, got {:?}",
        purchase.id(),
        purchase.purchase_state()
    );
}

/// Assert that a purchase is awaiting completion.
///
/// # Panics
/// Panics if the purchase is not in the pending state.
pub fn assert_purchase_pending(purchase: &Purchase) {
    assert_eq!(
        purchase.purchase_state(),
        PurchaseState::Pending,
        "purchase {} should be pending, got {:?}",
        purchase.id(),
        purchase.purchase_state()
    );
}

/// Assert that a derived subscription list contains an active entry for a sku.
///
/// # Panics
/// Panics if no entry for the sku exists or the entry is inactive.
pub fn assert_subscription_active(subscriptions: &[ActiveSubscription], product_id: &str) {
    let entry = subscriptions
        .iter()
        .find(|sub| sub.product_id == product_id)
        .unwrap_or_else(|| panic!("no subscription entry for {}", product_id));
    assert!(entry.is_active, "subscription {} is not active", product_id);
}

/// Assert that a derived subscription list has no entry for a sku.
///
/// # Panics
/// Panics if an entry for the sku exists.
pub fn assert_subscription_missing(subscriptions: &[ActiveSubscription], product_id: &str) {
    assert!(
        subscriptions.iter().all(|sub| sub.product_id != product_id),
        "unexpected subscription entry for {}",
        product_id
    );
}

/// Builder for compound purchase assertions.
pub struct PurchaseAssertion<'a> {
    purchase: &'a Purchase,
    checks: Vec<(&'static str, bool)>,
}

impl<'a> PurchaseAssertion<'a> {
    /// Create a new assertion builder.
    pub fn new(purchase: &'a Purchase) -> Self {
        Self {
            purchase,
            checks: Vec::new(),
        }
    }

    /// Assert the purchase state.
    pub fn in_state(mut self, expected: PurchaseState) -> Self {
        self.checks.push((
            "state matches",
            self.purchase.purchase_state() == expected,
        ));
        self
    }

    /// Assert the product id.
    pub fn for_product(mut self, product_id: &str) -> Self {
        self.checks
            .push(("product id matches", self.purchase.product_id() == product_id));
        self
    }

    /// Assert the platform.
    pub fn on_platform(mut self, platform: IapPlatform) -> Self {
        self.checks
            .push(("platform matches", self.purchase.platform() == platform));
        self
    }

    /// Assert a purchase token is present.
    pub fn has_token(mut self) -> Self {
        self.checks
            .push(("has purchase token", self.purchase.purchase_token().is_some()));
        self
    }

    /// Execute all assertions.
    ///
    /// # Panics
    /// Panics if any assertion fails.
    pub fn assert(self) {
        for (description, passed) in self.checks {
            assert!(passed, "Assertion failed: {}", description);
        }
    }

    /// Check if all assertions pass without panicking.
    pub fn check(self) -> bool {
        self.checks.iter().all(|(_, passed)| *passed)
    }
}
