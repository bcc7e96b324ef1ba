use super::{Exchange, ExchangeError};
use crate::models::{Balance, MarketSnapshot, OrderStatus, Side, SymbolRules};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Parameters of the simulated venue
#[derive(Debug, Clone)]
pub struct SimulatedExchangeConfig {
    pub initial_price: f64,
    /// Relative bid/ask spread
    pub spread: f64,
    /// Max relative mid move per snapshot
    pub volatility: f64,
    /// Fraction of the gap between a fill price and mid that the mid moves by
    pub impact: f64,
    pub top_qty: f64,
    pub balance: Balance,
    pub rules: SymbolRules,
    pub seed: u64,
}

impl Default for SimulatedExchangeConfig {
    fn default() -> Self {
        Self {
            initial_price: 2000.0,
            spread: 0.001,
            volatility: 0.0005,
            impact: 0.5,
            top_qty: 10.0,
            balance: Balance {
                base: 5.0,
                quote: 10_000.0,
            },
            rules: SymbolRules {
                min_qty: 0.0001,
                qty_step: 0.0001,
                tick_size: 0.01,
                min_notional: 1.0,
            },
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct RestingOrder {
    side: Side,
    price: f64,
    quantity: f64,
}

struct SimState {
    rng: StdRng,
    mid: f64,
    /// Fixed (bid, ask) installed by `set_book`
    pinned_book: Option<(f64, f64)>,
    balance: Balance,
    resting: BTreeMap<u64, RestingOrder>,
    statuses: HashMap<String, OrderStatus>,
    next_id: u64,
    failing_cancels: HashSet<String>,
    place_failures: VecDeque<ExchangeError>,
    snapshot_failures: VecDeque<ExchangeError>,
    balance_failures: VecDeque<ExchangeError>,
    status_failures: VecDeque<ExchangeError>,
    list_failures: VecDeque<ExchangeError>,
    orders_placed: usize,
    cancel_calls: usize,
}

/// In-memory exchange with a random-walk book.
///
/// Used for `EXCHANGE=simulated` and as the exchange double in tests: the
/// book can be pinned and failures can be scripted.
pub struct SimulatedExchange {
    config: SimulatedExchangeConfig,
    state: Mutex<SimState>,
}

impl SimulatedExchange {
    pub fn new(config: SimulatedExchangeConfig) -> Self {
        let state = SimState {
            rng: StdRng::seed_from_u64(config.seed),
            mid: config.initial_price,
            pinned_book: None,
            balance: config.balance,
            resting: BTreeMap::new(),
            statuses: HashMap::new(),
            next_id: 1,
            failing_cancels: HashSet::new(),
            place_failures: VecDeque::new(),
            snapshot_failures: VecDeque::new(),
            balance_failures: VecDeque::new(),
            status_failures: VecDeque::new(),
            list_failures: VecDeque::new(),
            orders_placed: 0,
            cancel_calls: 0,
        };

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Freeze the book at the given prices
    pub fn set_book(&self, bid: f64, ask: f64) {
        let mut state = self.state();
        state.pinned_book = Some((bid, ask));
        state.mid = (bid + ask) / 2.0;
    }

    /// Resume the random walk from the current mid
    pub fn unpin_book(&self) {
        self.state().pinned_book = None;
    }

    pub fn set_balance(&self, balance: Balance) {
        self.state().balance = balance;
    }

    /// Cancelling this order id will fail with a network error
    pub fn fail_cancel(&self, order_id: &str) {
        self.state().failing_cancels.insert(order_id.to_string());
    }

    /// The next `place_order` call returns this error
    pub fn push_place_failure(&self, error: ExchangeError) {
        self.state().place_failures.push_back(error);
    }

    /// The next `snapshot` call returns this error
    pub fn push_snapshot_failure(&self, error: ExchangeError) {
        self.state().snapshot_failures.push_back(error);
    }

    /// The next `balance` call returns this error
    pub fn push_balance_failure(&self, error: ExchangeError) {
        self.state().balance_failures.push_back(error);
    }

    /// The next `order_status` call returns this error
    pub fn push_status_failure(&self, error: ExchangeError) {
        self.state().status_failures.push_back(error);
    }

    /// The next `list_open_orders` call returns this error
    pub fn push_list_failure(&self, error: ExchangeError) {
        self.state().list_failures.push_back(error);
    }

    /// Mark a resting order filled as if the market traded through it
    pub fn fill(&self, order_id: &str) {
        let mut state = self.state();
        if let Ok(key) = order_id.parse::<u64>() {
            if let Some(order) = state.resting.remove(&key) {
                settle_fill(&mut state, &order, self.config.impact);
                state.statuses.insert(order_id.to_string(), OrderStatus::Filled);
            }
        }
    }

    /// Drop every trace of an order, as a venue purging old history would
    pub fn forget(&self, order_id: &str) {
        let mut state = self.state();
        if let Ok(key) = order_id.parse::<u64>() {
            state.resting.remove(&key);
        }
        state.statuses.remove(order_id);
    }

    pub fn open_order_ids(&self) -> Vec<String> {
        self.state().resting.keys().map(|k| k.to_string()).collect()
    }

    pub fn orders_placed(&self) -> usize {
        self.state().orders_placed
    }

    pub fn cancel_calls(&self) -> usize {
        self.state().cancel_calls
    }

    pub fn current_balance(&self) -> Balance {
        self.state().balance
    }

    fn book(&self, state: &SimState) -> (f64, f64) {
        state.pinned_book.unwrap_or_else(|| {
            let half = state.mid * self.config.spread / 2.0;
            (state.mid - half, state.mid + half)
        })
    }
}

impl Default for SimulatedExchange {
    fn default() -> Self {
        Self::new(SimulatedExchangeConfig::default())
    }
}

fn crosses(order: &RestingOrder, bid: f64, ask: f64) -> bool {
    match order.side {
        Side::Buy => order.price >= ask,
        Side::Sell => order.price <= bid,
    }
}

/// Credit the proceeds of a fill; the order's reservation was already debited
fn settle_fill(state: &mut SimState, order: &RestingOrder, impact: f64) {
    match order.side {
        Side::Buy => state.balance.base += order.quantity,
        Side::Sell => state.balance.quote += order.price * order.quantity,
    }
    if state.pinned_book.is_none() {
        state.mid += (order.price - state.mid) * impact;
    }
}

fn release_reservation(state: &mut SimState, order: &RestingOrder) {
    match order.side {
        Side::Buy => state.balance.quote += order.price * order.quantity,
        Side::Sell => state.balance.base += order.quantity,
    }
}

#[async_trait]
impl Exchange for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn snapshot(&self, _symbol: &str) -> Result<MarketSnapshot, ExchangeError> {
        let mut state = self.state();

        if let Some(error) = state.snapshot_failures.pop_front() {
            return Err(error);
        }

        if state.pinned_book.is_none() {
            let drift = state.rng.gen_range(-self.config.volatility..=self.config.volatility);
            state.mid *= 1.0 + drift;
        }

        let (bid, ask) = self.book(&state);

        // Resting orders the new book trades through get filled
        let crossed: Vec<u64> = state
            .resting
            .iter()
            .filter(|(_, order)| crosses(order, bid, ask))
            .map(|(key, _)| *key)
            .collect();
        for key in crossed {
            if let Some(order) = state.resting.remove(&key) {
                settle_fill(&mut state, &order, self.config.impact);
                state.statuses.insert(key.to_string(), OrderStatus::Filled);
            }
        }

        let (bid, ask) = self.book(&state);
        Ok(MarketSnapshot {
            bid,
            ask,
            bid_qty: self.config.top_qty,
            ask_qty: self.config.top_qty,
            last_price: state.mid,
            timestamp: Utc::now(),
        })
    }

    async fn balance(&self, _symbol: &str) -> Result<Balance, ExchangeError> {
        let mut state = self.state();
        match state.balance_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(state.balance),
        }
    }

    async fn symbol_rules(&self, _symbol: &str) -> Result<SymbolRules, ExchangeError> {
        Ok(self.config.rules)
    }

    async fn place_order(
        &self,
        _symbol: &str,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<String, ExchangeError> {
        let mut state = self.state();

        if let Some(error) = state.place_failures.pop_front() {
            return Err(error);
        }

        let rules = self.config.rules;
        if quantity < rules.min_qty || price * quantity < rules.min_notional {
            return Err(ExchangeError::Rejected(format!(
                "order {} @ {} below minimums",
                quantity, price
            )));
        }

        match side {
            Side::Buy if state.balance.quote < price * quantity => {
                return Err(ExchangeError::InsufficientBalance(format!(
                    "need {:.2} quote, have {:.2}",
                    price * quantity,
                    state.balance.quote
                )));
            }
            Side::Sell if state.balance.base < quantity => {
                return Err(ExchangeError::InsufficientBalance(format!(
                    "need {:.6} base, have {:.6}",
                    quantity, state.balance.base
                )));
            }
            Side::Buy => state.balance.quote -= price * quantity,
            Side::Sell => state.balance.base -= quantity,
        }

        let key = state.next_id;
        state.next_id += 1;
        state.orders_placed += 1;

        let order = RestingOrder {
            side,
            price,
            quantity,
        };
        let (bid, ask) = self.book(&state);
        let id = key.to_string();

        if crosses(&order, bid, ask) {
            settle_fill(&mut state, &order, self.config.impact);
            state.statuses.insert(id.clone(), OrderStatus::Filled);
        } else {
            state.resting.insert(key, order);
            state.statuses.insert(id.clone(), OrderStatus::Open);
        }

        Ok(id)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<(), ExchangeError> {
        let mut state = self.state();
        state.cancel_calls += 1;

        if state.failing_cancels.contains(order_id) {
            return Err(ExchangeError::Network(format!(
                "connection reset while cancelling {}",
                order_id
            )));
        }

        let order = order_id
            .parse::<u64>()
            .ok()
            .and_then(|key| state.resting.remove(&key))
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))?;

        release_reservation(&mut state, &order);
        state.statuses.insert(order_id.to_string(), OrderStatus::Cancelled);
        Ok(())
    }

    async fn list_open_orders(&self, _symbol: &str) -> Result<Vec<String>, ExchangeError> {
        let mut state = self.state();
        if let Some(error) = state.list_failures.pop_front() {
            return Err(error);
        }
        Ok(state.resting.keys().map(|k| k.to_string()).collect())
    }

    async fn order_status(
        &self,
        _symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatus, ExchangeError> {
        let mut state = self.state();
        if let Some(error) = state.status_failures.pop_front() {
            return Err(error);
        }
        state
            .statuses
            .get(order_id)
            .copied()
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))
    }
}
