//! Error types for PurchaseKit operations.
//!
//! Two layers live here: [`ErrorCode`] and [`PurchaseError`] model the
//! failures the native stores report on the event stream, while [`IapError`]
//! is the structured error type raised by this library's own operations.

use crate::IapPlatform;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Normalized purchase error codes shared by both store platforms.
///
/// Serialized in the kebab-case spelling used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unknown,
    UserCancelled,
    UserError,
    ItemUnavailable,
    RemoteError,
    NetworkError,
    ServiceError,
    ReceiptFailed,
    ReceiptFinished,
    ReceiptFinishedFailed,
    NotPrepared,
    NotEnded,
    AlreadyOwned,
    DeveloperError,
    BillingResponseJsonParseError,
    DeferredPayment,
    Interrupted,
    IapNotAvailable,
    PurchaseError,
    SyncError,
    TransactionValidationFailed,
    ActivityUnavailable,
    AlreadyPrepared,
    Pending,
    ConnectionClosed,
}

impl ErrorCode {
    /// Get the canonical kebab-case spelling of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "unknown",
            ErrorCode::UserCancelled => "user-cancelled",
            ErrorCode::UserError => "user-error",
            ErrorCode::ItemUnavailable => "item-unavailable",
            ErrorCode::RemoteError => "remote-error",
            ErrorCode::NetworkError => "network-error",
            ErrorCode::ServiceError => "service-error",
            ErrorCode::ReceiptFailed => "receipt-failed",
            ErrorCode::ReceiptFinished => "receipt-finished",
            ErrorCode::ReceiptFinishedFailed => "receipt-finished-failed",
            ErrorCode::NotPrepared => "not-prepared",
            ErrorCode::NotEnded => "not-ended",
            ErrorCode::AlreadyOwned => "already-owned",
            ErrorCode::DeveloperError => "developer-error",
            ErrorCode::BillingResponseJsonParseError => "billing-response-json-parse-error",
            ErrorCode::DeferredPayment => "deferred-payment",
            ErrorCode::Interrupted => "interrupted",
            ErrorCode::IapNotAvailable => "iap-not-available",
            ErrorCode::PurchaseError => "purchase-error",
            ErrorCode::SyncError => "sync-error",
            ErrorCode::TransactionValidationFailed => "transaction-validation-failed",
            ErrorCode::ActivityUnavailable => "activity-unavailable",
            ErrorCode::AlreadyPrepared => "already-prepared",
            ErrorCode::Pending => "pending",
            ErrorCode::ConnectionClosed => "connection-closed",
        }
    }

    /// Normalize a native error code string.
    ///
    /// Legacy bridges report `E_`-prefixed constant names (`E_USER_CANCELLED`),
    /// newer ones report kebab-case or camelCase spellings; single-l
    /// `userCanceled` variants appear on Android. All spellings of the same
    /// code collapse to one variant. Unrecognized values resolve to
    /// [`ErrorCode::Unknown`] with a warning rather than failing.
    pub fn from_native(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ErrorCode::Unknown;
        }

        // Strip the legacy prefix and every separator so that
        // E_USER_CANCELLED, user-cancelled and userCancelled share one key.
        let stripped = trimmed.strip_prefix("E_").unwrap_or(trimmed);
        let key: String = stripped
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match key.as_str() {
            "unknown" => ErrorCode::Unknown,
            "usercancelled" | "usercanceled" => ErrorCode::UserCancelled,
            "usererror" => ErrorCode::UserError,
            "itemunavailable" => ErrorCode::ItemUnavailable,
            "remoteerror" => ErrorCode::RemoteError,
            "networkerror" => ErrorCode::NetworkError,
            "serviceerror" => ErrorCode::ServiceError,
            "receiptfailed" => ErrorCode::ReceiptFailed,
            "receiptfinished" => ErrorCode::ReceiptFinished,
            "receiptfinishedfailed" => ErrorCode::ReceiptFinishedFailed,
            "notprepared" => ErrorCode::NotPrepared,
            "notended" => ErrorCode::NotEnded,
            "alreadyowned" => ErrorCode::AlreadyOwned,
            "developererror" => ErrorCode::DeveloperError,
            "billingresponsejsonparseerror" => ErrorCode::BillingResponseJsonParseError,
            "deferredpayment" => ErrorCode::DeferredPayment,
            "interrupted" => ErrorCode::Interrupted,
            "iapnotavailable" => ErrorCode::IapNotAvailable,
            "purchaseerror" => ErrorCode::PurchaseError,
            "syncerror" => ErrorCode::SyncError,
            "transactionvalidationfailed" => ErrorCode::TransactionValidationFailed,
            "activityunavailable" => ErrorCode::ActivityUnavailable,
            "alreadyprepared" => ErrorCode::AlreadyPrepared,
            "pending" => ErrorCode::Pending,
            "connectionclosed" => ErrorCode::ConnectionClosed,
            _ => {
                warn!(code = raw, "unrecognized native error code");
                ErrorCode::Unknown
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A purchase failure as reported by the native store, normalized.
///
/// Delivered through the purchase-error event stream and stored by the
/// session as the current purchase error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseError {
    pub code: ErrorCode,
    pub message: String,
    /// Product the failure belongs to, when the store reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl PurchaseError {
    /// Create a new purchase error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            product_id: None,
        }
    }

    /// Set the product id the failure belongs to.
    pub fn with_product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    /// True when the user dismissed the native purchase dialog.
    pub fn is_user_cancelled(&self) -> bool {
        self.code == ErrorCode::UserCancelled
    }
}

impl fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Comprehensive error type for PurchaseKit operations.
#[derive(thiserror::Error, Debug)]
pub enum IapError {
    /// A required request field is missing or invalid. Raised before any
    /// native call is made.
    #[error("developer error: {message}")]
    Developer { message: String },

    /// An operation was invoked on the wrong platform.
    #[error("{operation} is only available on {required} (current platform is {actual})")]
    PlatformMismatch {
        operation: String,
        required: IapPlatform,
        actual: IapPlatform,
    },

    /// The native store rejected a purchase.
    #[error("purchase failed: {0}")]
    Purchase(PurchaseError),

    /// The native provider rejected an operation.
    #[error("provider error [{code}]: {message}")]
    Provider { code: ErrorCode, message: String },

    /// No purchase token could be resolved for an Android transaction.
    #[error("purchase token missing for product {product_id}")]
    MissingPurchaseToken { product_id: String },

    /// The transaction id required to finish an iOS transaction is missing.
    #[error("transaction id missing for product {product_id}")]
    MissingTransactionId { product_id: String },

    /// An operation was invoked before the store connection was initialized.
    #[error("store connection is not initialized")]
    NotConnected,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl IapError {
    /// Create a developer error.
    pub fn developer(message: impl Into<String>) -> Self {
        Self::Developer {
            message: message.into(),
        }
    }

    /// Create a provider error from a normalized code and message.
    pub fn provider(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Provider {
            code,
            message: message.into(),
        }
    }

    /// Get the normalized store error code, when this error carries one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Purchase(err) => Some(err.code),
            Self::Provider { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Get the error message as an owned String (useful for FFI).
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// True when the user dismissed the native purchase dialog.
    pub fn is_user_cancelled(&self) -> bool {
        self.code() == Some(ErrorCode::UserCancelled)
    }

    /// True when a finish call failed only because the transaction was
    /// already finished on the store side.
    pub fn is_already_finished(&self) -> bool {
        self.code() == Some(ErrorCode::ReceiptFinished)
    }
}

impl From<PurchaseError> for IapError {
    fn from(err: PurchaseError) -> Self {
        Self::Purchase(err)
    }
}

impl From<serde_json::Error> for IapError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
