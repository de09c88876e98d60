use crate::config::NotificationSettings;
use crate::domain::error::{ApiError, ApiErrorCode};
use crate::domain::merchant::Psp;
use crate::domain::notification::{
    MerchantNotification, MerchantNotificationBatch, Notification, NotificationStatus,
};
use crate::gateways::registry::PspRegistry;
use crate::gateways::PspGateway;
use crate::repo::store::{NotificationClaim, NotificationStore};
use anyhow::{anyhow, bail, Result};
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub claimed: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl AddAssign for DispatchReport {
    fn add_assign(&mut self, other: Self) {
        self.claimed += other.claimed;
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Forwards stored PSP notifications to merchant webhooks.
#[derive(Clone)]
pub struct NotificationDispatcher {
    pub notifications: Arc<dyn NotificationStore>,
    pub registry: PspRegistry,
    pub client: reqwest::Client,
    pub settings: NotificationSettings,
    deliveries: Arc<Semaphore>,
}

impl NotificationDispatcher {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        registry: PspRegistry,
        settings: NotificationSettings,
        webhook_timeout_ms: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(webhook_timeout_ms))
            .build()?;
        let deliveries = Arc::new(Semaphore::new(settings.max_concurrent_deliveries.max(1)));
        Ok(Self {
            notifications,
            registry,
            client,
            settings,
            deliveries,
        })
    }

    pub async fn run(self) {
        let (providers, unknown) = self.settings.providers();
        for name in unknown {
            warn!(psp = %name, "unknown psp in notification list, skipping");
        }
        info!(
            providers = ?providers,
            parallelism = self.settings.parallelism,
            interval_ms = self.settings.interval_ms,
            "notification dispatcher started"
        );

        let mut ticker = tokio::time::interval(Duration::from_millis(self.settings.interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = self.tick(&providers).await;
            if report.claimed > 0 {
                info!(
                    claimed = report.claimed,
                    delivered = report.delivered,
                    failed = report.failed,
                    "notification tick finished"
                );
            }
        }
    }

    /// Runs `parallelism` claim workers per provider and waits for all of them.
    pub async fn tick(&self, providers: &[Psp]) -> DispatchReport {
        let mut workers = JoinSet::new();
        for &psp in providers {
            for _ in 0..self.settings.parallelism.max(1) {
                let dispatcher = self.clone();
                workers.spawn(async move { (psp, dispatcher.process(psp).await) });
            }
        }

        let mut total = DispatchReport::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(report))) => total += report,
                Ok((psp, Err(e))) => error!(psp = %psp, error = %e, "notification batch failed"),
                Err(e) => error!(error = %e, "notification worker panicked"),
            }
        }
        total
    }

    /// Claims one batch for `psp` and delivers every row in it. Lookups go
    /// through the claim so a worker never needs a second connection.
    pub async fn process(&self, psp: Psp) -> Result<DispatchReport, ApiError> {
        let gateway = self
            .registry
            .find(psp)
            .ok_or_else(|| ApiError::of(ApiErrorCode::PspImplNotFound))?;
        let mut claim = self
            .notifications
            .claim(psp, self.settings.batch_size, self.settings.max_attempts)
            .await
            .map_err(ApiError::internal)?;
        let rows = claim.notifications().to_vec();

        let mut report = DispatchReport {
            claimed: rows.len(),
            ..Default::default()
        };
        for row in &rows {
            let status = match self.deliver(gateway.as_ref(), claim.as_mut(), row).await {
                Ok(()) => {
                    report.delivered += 1;
                    NotificationStatus::Success
                }
                Err(e) => {
                    warn!(
                        psp = %psp,
                        psp_transaction_id = %row.id.psp_transaction_id,
                        psp_event = %row.id.psp_event,
                        attempts = row.attempts + 1,
                        error = %e,
                        "notification delivery failed"
                    );
                    report.failed += 1;
                    NotificationStatus::Fail
                }
            };
            claim.mark(&row.id, status).await.map_err(ApiError::internal)?;
        }
        claim.commit().await.map_err(ApiError::internal)?;
        Ok(report)
    }

    async fn deliver(
        &self,
        gateway: &dyn PspGateway,
        claim: &mut dyn NotificationClaim,
        row: &Notification,
    ) -> Result<()> {
        let parsed = gateway.parse_notification(row)?;
        let owner = claim
            .owning_transaction(&parsed.psp_transaction_id)
            .await?
            .ok_or_else(|| anyhow!("no transaction for psp transaction {}", parsed.psp_transaction_id))?;
        let merchant = claim
            .merchant(&owner.merchant_id)
            .await?
            .ok_or_else(|| anyhow!("merchant {} not found", owner.merchant_id))?;
        let Some(url) = merchant.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            bail!("merchant {} has no webhook url", merchant.id);
        };

        let batch = MerchantNotificationBatch {
            notifications: vec![MerchantNotification {
                transaction_id: owner.transaction_id.clone(),
                status: parsed.status,
                action: parsed.action,
                payment_method: owner.payment_method,
                amount: parsed.amount,
                currency: parsed.currency,
                reason: parsed.reason,
                created_date: row.created_at,
            }],
        };

        let _permit = self.deliveries.acquire().await?;
        let mut request = self.client.put(url).json(&batch);
        if let Some(username) = merchant.webhook_username.as_deref() {
            request = request.basic_auth(username, merchant.webhook_password.as_deref());
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("merchant webhook answered {status}");
        }
        info!(
            merchant_id = %merchant.id,
            transaction_id = %owner.transaction_id,
            psp_event = %row.id.psp_event,
            "notification delivered"
        );
        Ok(())
    }
}
