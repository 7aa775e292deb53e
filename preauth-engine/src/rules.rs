// Rule Resolver
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::PreauthResult;
use crate::models::PreauthRule;

/// Read-only source of preauth rules
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Rules that could apply to a carrier: its own plus wildcard-carrier rules.
    /// Inactive rules may be included; the resolver filters them.
    async fn rules_for_carrier(&self, carrier_name: &str) -> PreauthResult<Vec<PreauthRule>>;
}

/// Outcome of a rule lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDecision {
    pub required: bool,
    pub reason: String,
    pub rule: Option<PreauthRule>,
}

/// Decides whether a carrier/code/quantity triple needs preauthorization
pub struct RuleResolver {
    repository: Arc<dyn RuleRepository>,
}

impl RuleResolver {
    pub fn new(repository: Arc<dyn RuleRepository>) -> Self {
        Self { repository }
    }

    pub async fn resolve(
        &self,
        carrier_name: &str,
        hcpcs_code: &str,
        quantity: u32,
    ) -> PreauthResult<RuleDecision> {
        let rules = self.repository.rules_for_carrier(carrier_name).await?;
        let decision = decide(&rules, carrier_name, hcpcs_code, quantity);
        debug!(
            carrier = carrier_name,
            hcpcs = hcpcs_code,
            quantity,
            required = decision.required,
            rule_id = ?decision.rule.as_ref().map(|rule| rule.id),
            "Resolved preauth rule"
        );
        Ok(decision)
    }
}

/// Pure decision over a candidate rule set
///
/// No matching active rule means preauth is required. Among matches the
/// highest priority wins, then the more specific rule, then the lowest id so
/// the answer never depends on storage order.
pub fn decide(rules: &[PreauthRule], carrier_name: &str, hcpcs_code: &str, quantity: u32) -> RuleDecision {
    let winner = rules
        .iter()
        .filter(|rule| rule.active && rule.matches(carrier_name, hcpcs_code))
        .max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.specificity().cmp(&b.specificity()))
                .then(b.id.cmp(&a.id))
        });

    let Some(rule) = winner else {
        return RuleDecision {
            required: true,
            reason: format!(
                "No active preauth rule for {} / {}; preauth required by default",
                carrier_name, hcpcs_code
            ),
            rule: None,
        };
    };

    if let Some(threshold) = rule.quantity_threshold {
        if quantity > threshold {
            return RuleDecision {
                required: true,
                reason: format!(
                    "Quantity {} exceeds carrier threshold of {} for {}",
                    quantity, threshold, hcpcs_code
                ),
                rule: Some(rule.clone()),
            };
        }
    }

    let reason = if rule.requires_preauth {
        format!("{} requires preauth for {}", rule.carrier_name, hcpcs_code)
    } else {
        format!("{} does not require preauth for {}", rule.carrier_name, hcpcs_code)
    };

    RuleDecision {
        required: rule.requires_preauth,
        reason,
        rule: Some(rule.clone()),
    }
}

/// Rule set held in memory, e.g. loaded from a file or seeded in tests
#[derive(Clone, Default)]
pub struct InMemoryRuleRepository {
    rules: Arc<RwLock<Vec<PreauthRule>>>,
}

impl InMemoryRuleRepository {
    pub fn new(rules: Vec<PreauthRule>) -> Self {
        Self {
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    pub fn insert(&self, rule: PreauthRule) {
        self.rules.write().push(rule);
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn rules_for_carrier(&self, carrier_name: &str) -> PreauthResult<Vec<PreauthRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|rule| {
                rule.carrier_name == crate::models::RULE_WILDCARD
                    || rule.carrier_name.trim().eq_ignore_ascii_case(carrier_name.trim())
            })
            .cloned()
            .collect())
    }
}
