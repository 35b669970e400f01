//! Test utilities for PurchaseKit.
//!
//! This module provides testing infrastructure including:
//! - A mock store bridge with configurable behavior and call recording
//! - Raw payload fixtures mirroring what the native bridges emit
//! - Assertion helpers for purchase verification
//!
//! ## Usage
//!
//! ```rust,ignore
//! use purchasekit_lib::test_utils::{fixtures, MockPurchaseProvider};
//!
//! // Create a mock Play store with one product on the shelf
//! let provider = MockPurchaseProvider::android();
//! provider.set_catalog(vec![fixtures::android_product("coins_100")]);
//!
//! // Drive a purchase event through whatever is listening
//! provider.emit_purchase_updated(fixtures::android_purchase("order-1", "coins_100"));
//! assert_eq!(provider.purchase_requests().len(), 0);
//! ```

mod assertions;
pub mod fixtures;
mod mock_provider;

pub use fixtures::{
    android_product, android_purchase, android_subscription, android_subscription_purchase,
    ios_product, ios_purchase, ios_subscription, ios_subscription_purchase, now_millis,
    purchase_error, TestFixtures,
};

pub use mock_provider::{ListenerCounts, MockPurchaseProvider};

pub use assertions::{
    assert_purchase_pending, assert_purchase_purchased, assert_subscription_active,
    assert_subscription_missing, PurchaseAssertion,
};
