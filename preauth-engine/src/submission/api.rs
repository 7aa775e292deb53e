// Carrier API channel
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{StatusCheck, SubmissionChannel, SubmissionOutcome};
use crate::error::{PreauthError, PreauthResult};
use crate::models::{PreauthRequest, PreauthRule, SubmissionMethod};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierReceipt {
    pub tracking_number: Option<String>,
    pub response: Value,
}

/// One carrier's proprietary preauth API
#[async_trait]
pub trait CarrierApiAdapter: Send + Sync {
    /// Carrier this adapter speaks for, matched case-insensitively
    fn carrier(&self) -> &str;

    async fn submit(&self, request: &PreauthRequest, rule: &PreauthRule) -> PreauthResult<CarrierReceipt>;

    async fn check_status(&self, request: &PreauthRequest) -> PreauthResult<StatusCheck>;
}

/// Routes to the adapter registered for the request's carrier
#[derive(Clone, Default)]
pub struct ApiChannel {
    adapters: Arc<RwLock<HashMap<String, Arc<dyn CarrierApiAdapter>>>>,
}

impl ApiChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_adapter(&self, adapter: Arc<dyn CarrierApiAdapter>) {
        let key = adapter.carrier().trim().to_ascii_lowercase();
        self.adapters.write().await.insert(key, adapter);
    }

    async fn adapter(&self, carrier_name: &str) -> PreauthResult<Arc<dyn CarrierApiAdapter>> {
        self.adapters
            .read()
            .await
            .get(&carrier_name.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                PreauthError::AdapterMissing(format!("no carrier API adapter for '{}'", carrier_name))
            })
    }
}

#[async_trait]
impl SubmissionChannel for ApiChannel {
    fn method(&self) -> SubmissionMethod {
        SubmissionMethod::Api
    }

    async fn submit(&self, request: &PreauthRequest, rule: &PreauthRule) -> PreauthResult<SubmissionOutcome> {
        let adapter = self.adapter(&request.carrier_name).await?;
        let receipt = adapter.submit(request, rule).await?;

        Ok(SubmissionOutcome::accepted(
            SubmissionMethod::Api,
            format!("carrier_api:{}", adapter.carrier().trim().to_ascii_lowercase()),
            receipt.tracking_number,
            json!({
                "endpoint": rule.api_endpoint,
                "carrier_response": receipt.response,
            }),
        ))
    }

    async fn check_status(&self, request: &PreauthRequest) -> PreauthResult<StatusCheck> {
        self.adapter(&request.carrier_name).await?.check_status(request).await
    }
}
