use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical classification of a PSP-side failure, independent of the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentErrorKind {
    PaymentError,
    RefundError,
    ConfigurationError,
    TemporaryError,
    UnknownError,
}

impl PaymentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentErrorKind::PaymentError => "PAYMENT_ERROR",
            PaymentErrorKind::RefundError => "REFUND_ERROR",
            PaymentErrorKind::ConfigurationError => "CONFIGURATION_ERROR",
            PaymentErrorKind::TemporaryError => "TEMPORARY_ERROR",
            PaymentErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PaymentErrorKind::PaymentError => "Payment execution failed",
            PaymentErrorKind::RefundError => "Refund failed",
            PaymentErrorKind::ConfigurationError => "Payment configuration is invalid",
            PaymentErrorKind::TemporaryError => "Temporary server error, please try again",
            PaymentErrorKind::UnknownError => "Unknown error occurred, please contact support",
        }
    }
}

impl fmt::Display for PaymentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentErrorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAYMENT_ERROR" => Ok(PaymentErrorKind::PaymentError),
            "REFUND_ERROR" => Ok(PaymentErrorKind::RefundError),
            "CONFIGURATION_ERROR" => Ok(PaymentErrorKind::ConfigurationError),
            "TEMPORARY_ERROR" => Ok(PaymentErrorKind::TemporaryError),
            "UNKNOWN_ERROR" => Ok(PaymentErrorKind::UnknownError),
            other => Err(anyhow::anyhow!("unknown payment error kind {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    AuthenticationError,
    ValidationError,
    MissingIdempotencyKey,
    PspConfForMerchantNotFound,
    PspImplNotFound,
    AliasNotFound,
    WrongAliasMerchantMapping,
    IncompleteAlias,
    MerchantNotFound,
    TransactionNotFound,
    PspTestModeInconsistent,
    TransactionNotAllowed,
    SepaNotAllowed,
    IncorrectRefundValue,
    IdempotencyViolation,
    UnsupportedOperation,
    PspModuleError,
    InternalError,
}

impl ApiErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ApiErrorCode::AuthenticationError => "AUTHENTICATION_ERROR",
            ApiErrorCode::ValidationError => "VALIDATION_ERROR",
            ApiErrorCode::MissingIdempotencyKey => "MISSING_IDEMPOTENCY_KEY",
            ApiErrorCode::PspConfForMerchantNotFound => "PSP_CONF_FOR_MERCHANT_NOT_FOUND",
            ApiErrorCode::PspImplNotFound => "PSP_IMPL_NOT_FOUND",
            ApiErrorCode::AliasNotFound => "ALIAS_NOT_FOUND",
            ApiErrorCode::WrongAliasMerchantMapping => "WRONG_ALIAS_MERCHANT_MAPPING",
            ApiErrorCode::IncompleteAlias => "INCOMPLETE_ALIAS",
            ApiErrorCode::MerchantNotFound => "MERCHANT_NOT_FOUND",
            ApiErrorCode::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            ApiErrorCode::PspTestModeInconsistent => "PSP_TEST_MODE_INCONSISTENT",
            ApiErrorCode::TransactionNotAllowed => "TRANSACTION_NOT_ALLOWED",
            ApiErrorCode::SepaNotAllowed => "SEPA_NOT_ALLOWED",
            ApiErrorCode::IncorrectRefundValue => "INCORRECT_REFUND_VALUE",
            ApiErrorCode::IdempotencyViolation => "IDEMPOTENCY_VIOLATION",
            ApiErrorCode::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            ApiErrorCode::PspModuleError => "PSP_MODULE_ERROR",
            ApiErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ApiErrorCode::AuthenticationError => "Authentication error",
            ApiErrorCode::ValidationError => "Validation error",
            ApiErrorCode::MissingIdempotencyKey => "Idempotent-Key header is required",
            ApiErrorCode::PspConfForMerchantNotFound => {
                "PSP configuration for given PSP type cannot be found from given merchant"
            }
            ApiErrorCode::PspImplNotFound => "PSP implementation for given PSP type cannot be found",
            ApiErrorCode::AliasNotFound => "Alias ID cannot be found",
            ApiErrorCode::WrongAliasMerchantMapping => "Alias does not map to correct merchant",
            ApiErrorCode::IncompleteAlias => {
                "Given alias is incomplete, please define a payment configuration on related alias"
            }
            ApiErrorCode::MerchantNotFound => "Given merchant id cannot be found",
            ApiErrorCode::TransactionNotFound => "Given transaction id cannot be found",
            ApiErrorCode::PspTestModeInconsistent => {
                "PSP-Test-Mode for this transaction is different than the mode for previous transaction"
            }
            ApiErrorCode::TransactionNotAllowed => "Transaction operation is not allowed",
            ApiErrorCode::SepaNotAllowed => "SEPA is not supported for this operation",
            ApiErrorCode::IncorrectRefundValue => "Refund amount exceeds the refundable amount",
            ApiErrorCode::IdempotencyViolation => {
                "Idempotent key was already used with a different request"
            }
            ApiErrorCode::UnsupportedOperation => "Operation is not supported by the PSP",
            ApiErrorCode::PspModuleError => "Unexpected PSP operation error",
            ApiErrorCode::InternalError => "Internal server error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::AuthenticationError => StatusCode::UNAUTHORIZED,
            ApiErrorCode::AliasNotFound
            | ApiErrorCode::MerchantNotFound
            | ApiErrorCode::TransactionNotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::IdempotencyViolation => StatusCode::CONFLICT,
            ApiErrorCode::PspModuleError => StatusCode::BAD_GATEWAY,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Client errors are safe to surface verbatim; server errors mean no state was written.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {message}", code.code())]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn of(code: ApiErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    pub fn with_message(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(e: anyhow::Error) -> Self {
        Self::with_message(ApiErrorCode::InternalError, e.to_string())
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorPayload {
                code: self.code.code().to_string(),
                message: self.message.clone(),
                details: None,
            },
        }
    }

    pub fn into_parts(self) -> (StatusCode, ErrorEnvelope) {
        (self.code.status(), self.envelope())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}
