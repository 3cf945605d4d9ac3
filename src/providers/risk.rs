//! Pre-trade risk gate.
//!
//! Affordability check with an assumed adverse move: the position's
//! worst-case loss after the configured adverse move must fit inside
//! the account's risk budget. A rejection is non-fatal to the run —
//! the trade is simply not placed and the reason recorded.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{ExecutionService, RiskGate};
use crate::types::RiskAssessment;

pub struct BasicRiskGate {
    exec: Arc<dyn ExecutionService>,
    /// Maximum share of balance a single trade may put at risk.
    max_risk_fraction: f64,
}

impl BasicRiskGate {
    pub fn new(exec: Arc<dyn ExecutionService>, max_risk_fraction: f64) -> Self {
        BasicRiskGate {
            exec,
            max_risk_fraction,
        }
    }
}

#[async_trait]
impl RiskGate for BasicRiskGate {
    async fn can_trade(
        &self,
        account_id: &str,
        symbol: &str,
        qty: f64,
        price: f64,
        assumed_adverse_move_pct: f64,
    ) -> Result<RiskAssessment> {
        let snapshot = self.exec.account(account_id).await?;
        let notional = qty * price;

        if notional > snapshot.balance {
            return Ok(RiskAssessment::blocked(format!(
                "notional {notional:.2} exceeds balance {:.2}",
                snapshot.balance
            )));
        }

        let worst_case_loss = notional * assumed_adverse_move_pct / 100.0;
        let risk_budget = snapshot.balance * self.max_risk_fraction;
        if worst_case_loss > risk_budget {
            return Ok(RiskAssessment::blocked(format!(
                "worst-case loss {worst_case_loss:.2} exceeds risk budget {risk_budget:.2}"
            )));
        }

        debug!(
            account_id,
            symbol, qty, price, worst_case_loss, "Risk check passed"
        );
        Ok(RiskAssessment::allowed())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
