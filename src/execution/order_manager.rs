use crate::api::{Exchange, ExchangeError};
use crate::models::{OrderStatus, Side, TrackedOrder};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("exchange rejected order: {0}")]
    ExchangeRejected(String),

    #[error("transient network error: {0}")]
    TransientNetworkError(String),

    #[error("{open} orders still open (limit {limit})")]
    OpenOrderLimit { open: usize, limit: usize },
}

impl From<ExchangeError> for OrderError {
    fn from(e: ExchangeError) -> Self {
        match e {
            ExchangeError::InsufficientBalance(msg) => OrderError::InsufficientBalance(msg),
            ExchangeError::Network(msg) | ExchangeError::RateLimited(msg) => {
                OrderError::TransientNetworkError(msg)
            }
            other => OrderError::ExchangeRejected(other.to_string()),
        }
    }
}

/// Result of a best-effort batch cancel
#[derive(Debug, Default)]
pub struct CancelReport {
    pub cancelled: Vec<String>,
    /// Already filled or purged on the exchange side
    pub already_gone: Vec<String>,
    pub failures: Vec<(String, ExchangeError)>,
}

impl CancelReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.cancelled.len() + self.already_gone.len() + self.failures.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrderPolicy {
    pub cancel_previous: bool,
    pub max_open_orders: usize,
}

/// What `place_with_policy` did: the cancel pass (if the policy ran one) and the placement
#[derive(Debug)]
pub struct PolicyOutcome {
    pub cancel_report: Option<CancelReport>,
    pub placement: Result<TrackedOrder, OrderError>,
}

/// Sole owner of the orders this process has placed
pub struct OrderManager {
    exchange: Arc<dyn Exchange>,
    symbol: String,
    dry_run: bool,
    orders: BTreeMap<u64, TrackedOrder>,
    next_key: u64,
}

impl OrderManager {
    pub fn new(exchange: Arc<dyn Exchange>, symbol: impl Into<String>, dry_run: bool) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            dry_run,
            orders: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Orders still live on the book, oldest first
    pub fn open_orders(&self) -> impl Iterator<Item = &TrackedOrder> {
        self.orders.values().filter(|o| o.status.is_live())
    }

    pub fn open_count(&self) -> usize {
        self.open_orders().count()
    }

    /// Every tracked order, including terminal ones awaiting cleanup
    pub fn tracked(&self) -> impl Iterator<Item = &TrackedOrder> {
        self.orders.values()
    }

    pub fn tracked_count(&self) -> usize {
        self.orders.len()
    }

    /// Place a limit order, or record a simulated one in dry run
    pub async fn place(
        &mut self,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<TrackedOrder, OrderError> {
        let id = if self.dry_run {
            format!("dry-run-{}", Uuid::new_v4())
        } else {
            self.exchange
                .place_order(&self.symbol, side, price, quantity)
                .await?
        };

        let key = self.next_key;
        self.next_key += 1;

        let order = TrackedOrder {
            key,
            id,
            side,
            price,
            quantity,
            status: OrderStatus::Open,
            created_at: Utc::now(),
            simulated: self.dry_run,
        };
        self.orders.insert(key, order.clone());

        tracing::debug!(
            "📝 Tracking order #{} {} ({} {:.6} @ {:.4})",
            key,
            order.id,
            side,
            quantity,
            price
        );

        Ok(order)
    }

    /// Cancel every live order; individual failures never stop the batch
    pub async fn cancel_all_open(&mut self) -> CancelReport {
        let mut report = CancelReport::default();
        let live: Vec<(u64, String, bool)> = self
            .open_orders()
            .map(|o| (o.key, o.id.clone(), o.simulated))
            .collect();

        for (key, id, simulated) in live {
            if simulated {
                self.orders.remove(&key);
                report.cancelled.push(id);
                continue;
            }

            match self.exchange.cancel_order(&self.symbol, &id).await {
                Ok(()) => {
                    self.orders.remove(&key);
                    tracing::debug!("🗑️  Cancelled order {}", id);
                    report.cancelled.push(id);
                }
                Err(ExchangeError::OrderNotFound(_)) => {
                    self.orders.remove(&key);
                    tracing::debug!("Order {} already gone", id);
                    report.already_gone.push(id);
                }
                Err(e) => {
                    tracing::warn!("⚠️  Failed to cancel order {}: {}", id, e);
                    report.failures.push((id, e));
                }
            }
        }

        report
    }

    /// Refresh statuses from the exchange and evict finished orders.
    ///
    /// Returns how many orders were evicted. A failed open-order listing
    /// leaves local state untouched.
    pub async fn reconcile(&mut self) -> Result<usize, OrderError> {
        if self.dry_run {
            for order in self.orders.values_mut().filter(|o| o.simulated) {
                order.status = OrderStatus::Filled;
            }
            return Ok(self.purge_terminal());
        }

        if self.orders.is_empty() {
            return Ok(0);
        }

        let open_ids: HashSet<String> = self
            .exchange
            .list_open_orders(&self.symbol)
            .await?
            .into_iter()
            .collect();

        let keys: Vec<u64> = self.orders.keys().copied().collect();
        for key in keys {
            let Some(id) = self.orders.get(&key).map(|o| o.id.clone()) else {
                continue;
            };
            if open_ids.contains(&id) {
                continue;
            }

            let status = match self.exchange.order_status(&self.symbol, &id).await {
                Ok(status) => status,
                // Unknown to the exchange: nothing left to manage
                Err(ExchangeError::OrderNotFound(_)) => OrderStatus::Unknown,
                Err(e) => {
                    tracing::warn!("Status lookup for order {} failed, keeping it: {}", id, e);
                    continue;
                }
            };

            if let Some(order) = self.orders.get_mut(&key) {
                order.status = status;
            }
        }

        Ok(self.purge_terminal())
    }

    /// Drop terminal-state orders from the local view
    pub fn purge_terminal(&mut self) -> usize {
        let before = self.orders.len();
        self.orders.retain(|_, o| o.status.is_live());
        before - self.orders.len()
    }

    /// Reconcile then purge; safe to run any number of times
    pub async fn periodic_cleanup(&mut self) -> usize {
        let reconciled = match self.reconcile().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("⚠️  Order reconciliation failed: {}", e);
                0
            }
        };
        let purged = self.purge_terminal();

        if reconciled + purged > 0 {
            tracing::info!(
                "🧹 Cleanup evicted {} orders, {} still open",
                reconciled + purged,
                self.open_count()
            );
        }
        reconciled + purged
    }

    /// Place under the cancel policy: cancel first, then place only while under the bound
    pub async fn place_with_policy(
        &mut self,
        policy: OrderPolicy,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> PolicyOutcome {
        if !policy.cancel_previous {
            return PolicyOutcome {
                cancel_report: None,
                placement: self.place(side, price, quantity).await,
            };
        }

        let report = self.cancel_all_open().await;
        let open = self.open_count();
        let placement = if open >= policy.max_open_orders {
            Err(OrderError::OpenOrderLimit {
                open,
                limit: policy.max_open_orders,
            })
        } else {
            self.place(side, price, quantity).await
        };

        PolicyOutcome {
            cancel_report: Some(report),
            placement,
        }
    }
}
