// Outbound status notifications
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::error::{PreauthError, PreauthResult};
use crate::models::{PreauthRequest, PreauthStatus};

/// Payload sent when a request reaches a status someone has to act on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub request_id: Uuid,
    pub order_id: Uuid,
    pub status: PreauthStatus,
    pub carrier_name: String,
    pub tracking_number: Option<String>,
    pub requires_manual_verification: bool,
    pub requires_manual_submission: bool,
}

impl NotificationEvent {
    pub fn for_request(request: &PreauthRequest, requires_manual_submission: bool) -> Self {
        Self {
            request_id: request.id,
            order_id: request.order_id,
            status: request.status,
            carrier_name: request.carrier_name.clone(),
            tracking_number: request.external_tracking_id.clone(),
            requires_manual_verification: request.requires_manual_verification,
            requires_manual_submission,
        }
    }
}

/// Statuses that trigger a notification
pub fn is_notifiable(status: PreauthStatus) -> bool {
    matches!(
        status,
        PreauthStatus::Submitted
            | PreauthStatus::Approved
            | PreauthStatus::Denied
            | PreauthStatus::NeedInfo
            | PreauthStatus::ManualRequired
    )
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, event: &NotificationEvent) -> PreauthResult<()>;
}

/// Writes notifications to the log only
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn notify(&self, event: &NotificationEvent) -> PreauthResult<()> {
        info!(
            request_id = %event.request_id,
            order_id = %event.order_id,
            status = %event.status,
            tracking = ?event.tracking_number,
            manual_verification = event.requires_manual_verification,
            "Preauth status notification"
        );
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: &NotificationEvent) -> PreauthResult<()> {
        let response = self.client.post(&self.url).json(event).send().await?;
        if !response.status().is_success() {
            return Err(PreauthError::Integration(format!(
                "notification webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_facing_statuses_are_notifiable() {
        let notifiable: Vec<PreauthStatus> = PreauthStatus::ALL
            .into_iter()
            .filter(|status| is_notifiable(*status))
            .collect();
        assert_eq!(
            notifiable,
            vec![
                PreauthStatus::Submitted,
                PreauthStatus::Approved,
                PreauthStatus::Denied,
                PreauthStatus::NeedInfo,
                PreauthStatus::ManualRequired,
            ]
        );
    }
}
