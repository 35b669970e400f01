//! Purchase lifecycle coordination for PurchaseKit.
//!
//! This crate drives a [`purchasekit_lib::PurchaseProvider`] through the full
//! in-app purchase lifecycle:
//!
//! - [`session::IapSession`] owns the store connection and a snapshot of
//!   products, owned purchases and active subscriptions
//! - [`events::PurchaseEventManager`] shares one native listener per event
//!   channel across any number of application listeners
//! - [`subscriptions`] derives subscription entitlements from a purchase
//!   snapshot
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use purchasekit_session::{IapSession, ProductRequest, SessionOptions};
//!
//! # async fn run(provider: Arc<dyn purchasekit_lib::PurchaseProvider>) {
//! let session = IapSession::start(
//!     provider,
//!     SessionOptions::new()
//!         .with_on_purchase_success(|purchase| println!("purchased {}", purchase.product_id()))
//!         .with_on_purchase_error(|error| eprintln!("purchase failed: {error}")),
//! )
//! .await;
//!
//! session
//!     .request_products(&ProductRequest::subscriptions(["premium.monthly"]))
//!     .await
//!     .expect("catalog fetch");
//!
//! if session.has_active_subscriptions(None).await {
//!     println!("already subscribed");
//! }
//!
//! session.end().await;
//! # }
//! ```

pub mod events;
pub mod session;
pub mod subscriptions;

pub use events::{
    ListenerHandle, PromotedProductListener, PurchaseErrorListener, PurchaseEventManager,
    PurchaseUpdatedListener,
};
pub use session::{ConnectionState, IapSession, ProductRequest, SessionOptions};
pub use subscriptions::{
    derive_active_subscriptions, has_active_subscription, EXPIRY_WARNING_DAYS,
    SANDBOX_ACTIVE_WINDOW_MS,
};

pub use purchasekit_lib::{IapError, Result};
