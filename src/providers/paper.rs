//! Paper execution venue.
//!
//! Deterministic in-memory `ExecutionService`: settable mark prices,
//! per-account balances, recorded fills, and a forced-error hook. Used
//! as the default venue until a real exchange adapter lands, and by
//! every test that needs an execution side.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::ExecutionService;
use crate::types::{
    AccountSnapshot, OrderAck, OrderRequest, OrderStatus, OrderType, Side, Ticker,
};

/// A fill recorded by the paper venue, for assertions and display.
#[derive(Debug, Clone)]
pub struct PaperFill {
    pub account_id: String,
    pub order: OrderRequest,
    pub fill_price: f64,
    pub order_id: String,
}

pub struct PaperExchange {
    balances: Mutex<HashMap<String, f64>>,
    prices: Mutex<HashMap<String, f64>>,
    fills: Mutex<Vec<PaperFill>>,
    /// If set, all operations will return this error.
    force_error: Mutex<Option<String>>,
}

impl PaperExchange {
    pub fn new(account_ids: &[String], initial_balance: f64) -> Self {
        let balances = account_ids
            .iter()
            .map(|id| (id.clone(), initial_balance))
            .collect();
        PaperExchange {
            balances: Mutex::new(balances),
            prices: Mutex::new(HashMap::new()),
            fills: Mutex::new(Vec::new()),
            force_error: Mutex::new(None),
        }
    }

    /// Set the mark price used for fills and ticker queries.
    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_balance(&self, account_id: &str, balance: f64) {
        self.balances
            .lock()
            .unwrap()
            .insert(account_id.to_string(), balance);
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// All fills recorded so far.
    pub fn fills(&self) -> Vec<PaperFill> {
        self.fills.lock().unwrap().clone()
    }

    fn check_error(&self) -> Result<()> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionService for PaperExchange {
    async fn place_order(&self, account_id: &str, order: &OrderRequest) -> Result<OrderAck> {
        self.check_error()?;

        if order.side == Side::Neutral {
            return Err(anyhow!("cannot place an order with NEUTRAL side"));
        }
        if order.qty <= 0.0 {
            return Err(anyhow!("order qty must be positive, got {}", order.qty));
        }

        let fill_price = match order.order_type {
            OrderType::Market => *self
                .prices
                .lock()
                .unwrap()
                .get(&order.symbol)
                .ok_or_else(|| anyhow!("no mark price for {}", order.symbol))?,
            OrderType::Limit => order
                .price
                .ok_or_else(|| anyhow!("limit order requires a price"))?,
        };

        let notional = order.qty * fill_price;
        {
            let mut balances = self.balances.lock().unwrap();
            let balance = balances
                .get_mut(account_id)
                .ok_or_else(|| anyhow!("unknown account {account_id}"))?;
            match order.side {
                Side::Long => {
                    if *balance < notional {
                        return Err(anyhow!(
                            "insufficient balance: need {notional:.2}, have {:.2}",
                            *balance
                        ));
                    }
                    *balance -= notional;
                }
                Side::Short => *balance += notional,
                Side::Neutral => unreachable!(),
            }
        }

        let order_id = format!("paper-{}", Uuid::new_v4());
        info!(
            account_id,
            symbol = %order.symbol,
            side = %order.side,
            qty = order.qty,
            fill_price,
            order_id = %order_id,
            "Paper fill"
        );

        self.fills.lock().unwrap().push(PaperFill {
            account_id: account_id.to_string(),
            order: order.clone(),
            fill_price,
            order_id: order_id.clone(),
        });

        Ok(OrderAck {
            id: order_id,
            status: OrderStatus::Filled,
            fill_price: Some(fill_price),
        })
    }

    async fn account(&self, account_id: &str) -> Result<AccountSnapshot> {
        self.check_error()?;
        let balances = self.balances.lock().unwrap();
        let balance = balances
            .get(account_id)
            .copied()
            .ok_or_else(|| anyhow!("unknown account {account_id}"))?;
        Ok(AccountSnapshot { balance })
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        self.check_error()?;
        let price = *self
            .prices
            .lock()
            .unwrap()
            .get(symbol)
            .ok_or_else(|| anyhow!("no mark price for {symbol}"))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            price,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
