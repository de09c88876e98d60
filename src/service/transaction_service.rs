use crate::domain::alias::{Alias, AliasExtra};
use crate::domain::error::{ApiError, ApiErrorCode};
use crate::domain::merchant::{Merchant, PspConfig};
use crate::domain::transaction::{
    CaptureRequest, Executed, PaymentMethod, PaymentRequest, PaymentResponse, RefundRequest,
    ReversalRequest, TransactionAction, TransactionRecord, TransactionStatus,
};
use crate::gateways::registry::PspRegistry;
use crate::gateways::{PspError, PspGateway, PspModificationRequest, PspOutcome, PspPaymentRequest};
use crate::repo::store::{AliasStore, InsertOutcome, MerchantStore, TransactionScope, TransactionStore};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

const TRANSACTION_ID_LEN: usize = 20;

#[derive(Clone)]
pub struct TransactionOrchestrator {
    pub merchants: Arc<dyn MerchantStore>,
    pub aliases: Arc<dyn AliasStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub registry: PspRegistry,
}

/// Everything needed to call the provider for an alias.
struct Resolved {
    alias: Alias,
    extra: AliasExtra,
    psp_config: PspConfig,
    gateway: Arc<dyn PspGateway>,
}

impl TransactionOrchestrator {
    pub fn new(
        merchants: Arc<dyn MerchantStore>,
        aliases: Arc<dyn AliasStore>,
        transactions: Arc<dyn TransactionStore>,
        registry: PspRegistry,
    ) -> Self {
        Self {
            merchants,
            aliases,
            transactions,
            registry,
        }
    }

    pub async fn preauthorize(
        &self,
        merchant_id: &str,
        idempotency_key: Option<&str>,
        test_mode: bool,
        request: &PaymentRequest,
    ) -> Result<Executed<PaymentResponse>, ApiError> {
        self.pay(TransactionAction::Preauth, merchant_id, idempotency_key, test_mode, request)
            .await
    }

    pub async fn authorize(
        &self,
        merchant_id: &str,
        idempotency_key: Option<&str>,
        test_mode: bool,
        request: &PaymentRequest,
    ) -> Result<Executed<PaymentResponse>, ApiError> {
        self.pay(TransactionAction::Auth, merchant_id, idempotency_key, test_mode, request)
            .await
    }

    async fn pay(
        &self,
        action: TransactionAction,
        merchant_id: &str,
        idempotency_key: Option<&str>,
        test_mode: bool,
        request: &PaymentRequest,
    ) -> Result<Executed<PaymentResponse>, ApiError> {
        let key = require_key(idempotency_key)?;
        validate_payment(request)?;
        let hash = request_hash(&(action, request));

        let merchant = self.load_merchant(merchant_id).await?;
        let resolved = self.resolve_alias(&merchant, &request.alias_id).await?;
        if action == TransactionAction::Preauth && resolved.extra.payment_method == PaymentMethod::Sepa {
            return Err(ApiError::of(ApiErrorCode::SepaNotAllowed));
        }

        let mut scope = self
            .transactions
            .begin(&format!("{merchant_id}:{key}:{}", action.as_str()))
            .await
            .map_err(ApiError::internal)?;
        if let Some(existing) = scope
            .find_by_idempotency(merchant_id, key, action)
            .await
            .map_err(ApiError::internal)?
        {
            return replay(existing, &hash);
        }

        let psp_request = PspPaymentRequest {
            alias_id: resolved.alias.id.clone(),
            psp_alias: resolved.alias.psp_alias.clone(),
            extra: resolved.extra.clone(),
            payment_data: request.payment_data.clone(),
            purchase_id: request.purchase_id.clone(),
            customer_id: request.customer_id.clone(),
            psp_config: resolved.psp_config.clone(),
        };
        let psp = resolved.gateway.provider();
        let outcome = match action {
            TransactionAction::Preauth => resolved.gateway.preauthorize(&psp_request, test_mode).await,
            _ => resolved.gateway.authorize(&psp_request, test_mode).await,
        }
        .map_err(|e| psp_failure(e, action.as_str()))?;

        let mut record = TransactionRecord {
            transaction_id: new_transaction_id(),
            idempotency_key: key.to_string(),
            action,
            status: TransactionStatus::Success,
            amount: request.payment_data.amount,
            currency: request.payment_data.currency.clone(),
            payment_method: resolved.extra.payment_method,
            psp_transaction_id: None,
            psp_customer_id: None,
            merchant_id: merchant_id.to_string(),
            alias_id: resolved.alias.id.clone(),
            merchant_transaction_id: request.purchase_id.clone(),
            merchant_customer_id: request.customer_id.clone(),
            reason: request.payment_data.reason.clone(),
            psp_test_mode: test_mode,
            request_hash: hash.clone(),
            error_kind: None,
            error_message: None,
            created_at: Utc::now(),
        };
        apply_outcome(&mut record, outcome);
        info!(
            psp = %psp,
            merchant_id = %merchant_id,
            transaction_id = %record.transaction_id,
            action = record.action.as_str(),
            status = record.status.as_str(),
            "payment executed"
        );
        persist(scope, record, &hash).await
    }

    pub async fn capture(
        &self,
        merchant_id: &str,
        transaction_id: &str,
        idempotency_key: Option<&str>,
        test_mode: bool,
        request: &CaptureRequest,
    ) -> Result<Executed<PaymentResponse>, ApiError> {
        let merchant = self.load_merchant(merchant_id).await?;
        let alias = self.parent_alias(&merchant, transaction_id, test_mode).await?;
        let mut scope = self.open_parent_scope(transaction_id).await?;
        let history = load_history(scope.as_mut(), transaction_id, &merchant, test_mode).await?;

        let preauth = find_success(&history, TransactionAction::Preauth)
            .ok_or_else(|| not_allowed("capture requires a successful preauthorization"))?;
        let key = idempotency_key.unwrap_or(preauth.idempotency_key.as_str()).to_string();
        let hash = request_hash(&(TransactionAction::Capture, transaction_id, request));

        if let Some(existing) = scope
            .find_by_idempotency(merchant_id, &key, TransactionAction::Capture)
            .await
            .map_err(ApiError::internal)?
        {
            return replay(existing, &hash);
        }
        if let Some(captured) = find_success(&history, TransactionAction::Capture) {
            return Ok(stored(captured));
        }
        if find_success(&history, TransactionAction::Reversal).is_some() {
            return Err(not_allowed("transaction was already reversed"));
        }

        let amount = request.amount.unwrap_or(preauth.amount);
        if amount < 1 || amount > preauth.amount {
            return Err(ApiError::with_message(
                ApiErrorCode::ValidationError,
                format!("capture amount must be between 1 and {}", preauth.amount),
            ));
        }

        let resolved = alias?;
        let psp_request = modification(preauth, amount, None, &resolved);
        let outcome = resolved
            .gateway
            .capture(&psp_request, test_mode)
            .await
            .map_err(|e| psp_failure(e, TransactionAction::Capture.as_str()))?;

        let record = follow_up(preauth, TransactionAction::Capture, key, amount, None, hash.clone(), outcome);
        info!(
            transaction_id = %transaction_id,
            amount,
            status = record.status.as_str(),
            "capture executed"
        );
        persist(scope, record, &hash).await
    }

    pub async fn reverse(
        &self,
        merchant_id: &str,
        transaction_id: &str,
        idempotency_key: Option<&str>,
        test_mode: bool,
        request: &ReversalRequest,
    ) -> Result<Executed<PaymentResponse>, ApiError> {
        let merchant = self.load_merchant(merchant_id).await?;
        let alias = self.parent_alias(&merchant, transaction_id, test_mode).await?;
        let mut scope = self.open_parent_scope(transaction_id).await?;
        let history = load_history(scope.as_mut(), transaction_id, &merchant, test_mode).await?;

        let preauth = find_success(&history, TransactionAction::Preauth)
            .ok_or_else(|| not_allowed("reversal requires a successful preauthorization"))?;
        let key = idempotency_key.unwrap_or(preauth.idempotency_key.as_str()).to_string();
        let hash = request_hash(&(TransactionAction::Reversal, transaction_id, request));

        if let Some(existing) = scope
            .find_by_idempotency(merchant_id, &key, TransactionAction::Reversal)
            .await
            .map_err(ApiError::internal)?
        {
            return replay(existing, &hash);
        }
        if let Some(reversed) = find_success(&history, TransactionAction::Reversal) {
            return Ok(stored(reversed));
        }
        if find_success(&history, TransactionAction::Capture).is_some() {
            return Err(not_allowed("captured transactions cannot be reversed"));
        }

        let resolved = alias?;
        let psp_request = modification(preauth, preauth.amount, request.reason.clone(), &resolved);
        let outcome = resolved
            .gateway
            .reverse(&psp_request, test_mode)
            .await
            .map_err(|e| psp_failure(e, TransactionAction::Reversal.as_str()))?;

        let record = follow_up(
            preauth,
            TransactionAction::Reversal,
            key,
            preauth.amount,
            request.reason.clone(),
            hash.clone(),
            outcome,
        );
        info!(transaction_id = %transaction_id, status = record.status.as_str(), "reversal executed");
        persist(scope, record, &hash).await
    }

    pub async fn refund(
        &self,
        merchant_id: &str,
        transaction_id: &str,
        idempotency_key: Option<&str>,
        test_mode: bool,
        request: &RefundRequest,
    ) -> Result<Executed<PaymentResponse>, ApiError> {
        let key = require_key(idempotency_key)?;
        let merchant = self.load_merchant(merchant_id).await?;
        let alias = self.parent_alias(&merchant, transaction_id, test_mode).await?;
        let mut scope = self.open_parent_scope(transaction_id).await?;
        let history = load_history(scope.as_mut(), transaction_id, &merchant, test_mode).await?;
        let hash = request_hash(&(TransactionAction::Refund, transaction_id, request));

        if let Some(existing) = scope
            .find_by_idempotency(merchant_id, key, TransactionAction::Refund)
            .await
            .map_err(ApiError::internal)?
        {
            return replay(existing, &hash);
        }

        let base = find_success(&history, TransactionAction::Capture)
            .or_else(|| find_success(&history, TransactionAction::Auth))
            .ok_or_else(|| not_allowed("refund requires a successful authorization or capture"))?;
        if let Some(currency) = request.currency.as_deref() {
            if !currency.eq_ignore_ascii_case(&base.currency) {
                return Err(ApiError::with_message(
                    ApiErrorCode::ValidationError,
                    format!("refund currency must be {}", base.currency),
                ));
            }
        }
        let refunded: i64 = history
            .iter()
            .filter(|r| r.action == TransactionAction::Refund && r.is_success())
            .map(|r| r.amount)
            .sum();
        let exceeds = refunded
            .checked_add(request.amount)
            .map_or(true, |total| total > base.amount);
        if request.amount <= 0 || exceeds {
            return Err(ApiError::with_message(
                ApiErrorCode::IncorrectRefundValue,
                format!(
                    "refund of {} exceeds refundable amount {}",
                    request.amount,
                    base.amount.saturating_sub(refunded)
                ),
            ));
        }

        let resolved = alias?;
        let psp_request = modification(base, request.amount, request.reason.clone(), &resolved);
        let outcome = resolved
            .gateway
            .refund(&psp_request, test_mode)
            .await
            .map_err(|e| psp_failure(e, TransactionAction::Refund.as_str()))?;

        let record = follow_up(
            base,
            TransactionAction::Refund,
            key.to_string(),
            request.amount,
            request.reason.clone(),
            hash.clone(),
            outcome,
        );
        info!(
            transaction_id = %transaction_id,
            amount = request.amount,
            refunded_before = refunded,
            status = record.status.as_str(),
            "refund executed"
        );
        persist(scope, record, &hash).await
    }

    async fn load_merchant(&self, merchant_id: &str) -> Result<Merchant, ApiError> {
        self.merchants
            .find(merchant_id)
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::of(ApiErrorCode::MerchantNotFound))
    }

    async fn resolve_alias(&self, merchant: &Merchant, alias_id: &str) -> Result<Resolved, ApiError> {
        let alias = self
            .aliases
            .find_active(alias_id)
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::of(ApiErrorCode::AliasNotFound))?;
        if alias.merchant_id != merchant.id {
            return Err(ApiError::of(ApiErrorCode::WrongAliasMerchantMapping));
        }
        let extra = match (&alias.psp_alias, &alias.extra) {
            (Some(_), Some(extra)) => extra.clone(),
            _ => return Err(ApiError::of(ApiErrorCode::IncompleteAlias)),
        };
        let psp_config = merchant
            .psp_config(alias.psp)
            .cloned()
            .ok_or_else(|| ApiError::of(ApiErrorCode::PspConfForMerchantNotFound))?;
        let gateway = self
            .registry
            .find(alias.psp)
            .ok_or_else(|| ApiError::of(ApiErrorCode::PspImplNotFound))?;
        Ok(Resolved {
            alias,
            extra,
            psp_config,
            gateway,
        })
    }

    /// Reads the parent rows and resolves their alias before any scope opens.
    /// A scope keeps its connection until it ends, so nothing inside one may
    /// go back to the pool. Alias errors are deferred until a provider call needs the alias.
    async fn parent_alias(
        &self,
        merchant: &Merchant,
        transaction_id: &str,
        test_mode: bool,
    ) -> Result<Result<Resolved, ApiError>, ApiError> {
        let history = self
            .transactions
            .list_by_transaction_id(transaction_id)
            .await
            .map_err(ApiError::internal)?;
        let parent = check_history(&history, merchant, test_mode)?;
        Ok(self.resolve_alias(merchant, &parent.alias_id).await)
    }

    /// Follow-ups on one transaction serialize on its id.
    async fn open_parent_scope(&self, transaction_id: &str) -> Result<Box<dyn TransactionScope>, ApiError> {
        self.transactions
            .begin(transaction_id)
            .await
            .map_err(ApiError::internal)
    }
}

async fn load_history(
    scope: &mut dyn TransactionScope,
    transaction_id: &str,
    merchant: &Merchant,
    test_mode: bool,
) -> Result<Vec<TransactionRecord>, ApiError> {
    let history = scope
        .list_by_transaction_id(transaction_id)
        .await
        .map_err(ApiError::internal)?;
    check_history(&history, merchant, test_mode)?;
    Ok(history)
}

fn check_history<'a>(
    history: &'a [TransactionRecord],
    merchant: &Merchant,
    test_mode: bool,
) -> Result<&'a TransactionRecord, ApiError> {
    let Some(first) = history.iter().find(|r| r.is_success()) else {
        return Err(ApiError::of(ApiErrorCode::TransactionNotFound));
    };
    if first.merchant_id != merchant.id {
        return Err(ApiError::of(ApiErrorCode::WrongAliasMerchantMapping));
    }
    if first.psp_test_mode != test_mode {
        return Err(ApiError::of(ApiErrorCode::PspTestModeInconsistent));
    }
    Ok(first)
}

fn find_success(history: &[TransactionRecord], action: TransactionAction) -> Option<&TransactionRecord> {
    history.iter().find(|r| r.action == action && r.is_success())
}

fn modification(
    base: &TransactionRecord,
    amount: i64,
    reason: Option<String>,
    resolved: &Resolved,
) -> PspModificationRequest {
    PspModificationRequest {
        psp_transaction_id: base.psp_transaction_id.clone().unwrap_or_default(),
        amount,
        currency: base.currency.clone(),
        purchase_id: base.merchant_transaction_id.clone(),
        payment_method: base.payment_method,
        original_action: base.action,
        reason,
        psp_config: resolved.psp_config.clone(),
    }
}

fn follow_up(
    base: &TransactionRecord,
    action: TransactionAction,
    idempotency_key: String,
    amount: i64,
    reason: Option<String>,
    request_hash: String,
    outcome: PspOutcome,
) -> TransactionRecord {
    let mut record = TransactionRecord {
        idempotency_key,
        action,
        status: TransactionStatus::Success,
        amount,
        reason,
        request_hash,
        error_kind: None,
        error_message: None,
        created_at: Utc::now(),
        ..base.clone()
    };
    apply_outcome(&mut record, outcome);
    record
}

fn apply_outcome(record: &mut TransactionRecord, outcome: PspOutcome) {
    match outcome {
        PspOutcome::Approved {
            psp_transaction_id,
            customer_id,
        } => {
            record.status = TransactionStatus::Success;
            if psp_transaction_id.is_some() {
                record.psp_transaction_id = psp_transaction_id;
            }
            if customer_id.is_some() {
                record.psp_customer_id = customer_id;
            }
        }
        PspOutcome::Declined {
            psp_transaction_id,
            kind,
            message,
        } => {
            record.status = TransactionStatus::Fail;
            if psp_transaction_id.is_some() {
                record.psp_transaction_id = psp_transaction_id;
            }
            record.error_kind = Some(kind);
            record.error_message = Some(message.unwrap_or_else(|| kind.description().to_string()));
        }
    }
}

async fn persist(
    mut scope: Box<dyn TransactionScope>,
    record: TransactionRecord,
    hash: &str,
) -> Result<Executed<PaymentResponse>, ApiError> {
    match scope.insert(&record).await.map_err(ApiError::internal)? {
        InsertOutcome::Inserted => {
            scope.commit().await.map_err(ApiError::internal)?;
            Ok(Executed {
                value: PaymentResponse::from(&record),
                created: true,
            })
        }
        InsertOutcome::Duplicate(existing) => replay(existing, hash),
    }
}

fn replay(existing: TransactionRecord, hash: &str) -> Result<Executed<PaymentResponse>, ApiError> {
    if existing.request_hash != hash {
        return Err(ApiError::of(ApiErrorCode::IdempotencyViolation));
    }
    Ok(stored(&existing))
}

fn stored(record: &TransactionRecord) -> Executed<PaymentResponse> {
    Executed {
        value: PaymentResponse::from(record),
        created: false,
    }
}

fn not_allowed(message: &str) -> ApiError {
    ApiError::with_message(ApiErrorCode::TransactionNotAllowed, message)
}

fn require_key(key: Option<&str>) -> Result<&str, ApiError> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::of(ApiErrorCode::MissingIdempotencyKey))
}

fn validate_payment(request: &PaymentRequest) -> Result<(), ApiError> {
    if request.alias_id.trim().is_empty() {
        return Err(ApiError::with_message(ApiErrorCode::ValidationError, "aliasId is required"));
    }
    if request.payment_data.amount <= 0 {
        return Err(ApiError::with_message(
            ApiErrorCode::ValidationError,
            "amount must be greater than zero",
        ));
    }
    let currency = request.payment_data.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::with_message(
            ApiErrorCode::ValidationError,
            "currency must be a three letter ISO code",
        ));
    }
    Ok(())
}

pub(crate) fn psp_failure(e: PspError, operation: &str) -> ApiError {
    match e {
        PspError::Configuration(message) => ApiError::with_message(ApiErrorCode::ValidationError, message),
        PspError::UnsupportedOperation(message) => {
            ApiError::with_message(ApiErrorCode::UnsupportedOperation, message)
        }
        PspError::Transport(message) => {
            warn!(operation, error = %message, "psp call failed");
            ApiError::with_message(ApiErrorCode::PspModuleError, message)
        }
    }
}

/// SHA-256 hex of the canonical JSON of a request payload.
pub fn request_hash<T: Serialize>(payload: &T) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

pub fn new_transaction_id() -> String {
    random_alphanumeric(TRANSACTION_ID_LEN)
}

pub(crate) fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
