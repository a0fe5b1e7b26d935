/*
[INPUT]:  Fill deltas, or cumulative order snapshots from the private stream
[OUTPUT]: Per-symbol weighted-average positions and PositionChange records
[POS]:    State layer - position reconciliation (single writer)
[UPDATE]: When position accounting rules change
*/

use std::collections::{HashMap, HashSet, VecDeque};

use cexlink_adapter::types::{Order, Side, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What happens when an opposite fill is larger than the open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalPolicy {
    /// Flatten and drop the excess.
    #[default]
    ClampAtZero,
    /// Open a position on the fill side with the excess.
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    /// Never negative; direction lives in `side`.
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_price: Decimal,
    /// Cost basis of the open quantity.
    #[serde(with = "rust_decimal::serde::str")]
    pub accumulated_quote_qty: Decimal,
    pub last_order_id: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub last_filled_qty: Decimal,
}

impl Position {
    fn open(symbol: Symbol, side: Side, qty: Decimal, quote: Decimal) -> Self {
        Self {
            symbol,
            side,
            qty,
            avg_price: quote / qty,
            accumulated_quote_qty: quote,
            last_order_id: None,
            last_filled_qty: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.qty.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionChange {
    pub qty_before: Decimal,
    pub price_before: Decimal,
    pub qty_after: Decimal,
    pub price_after: Decimal,
}

impl PositionChange {
    pub fn is_noop(&self) -> bool {
        self.qty_before == self.qty_after && self.price_before == self.price_after
    }
}

/// Cumulative progress already applied for one order id.
#[derive(Debug, Clone, Copy, Default)]
struct OrderProgress {
    filled_qty: Decimal,
    quote_qty: Decimal,
}

/// Weighted-average position book.
///
/// Same-side fills accumulate quote cost and divide once, so the result does
/// not depend on fill order. Order snapshots are reduced to deltas against the
/// last applied cumulative fill, which makes redelivery a no-op.
#[derive(Debug)]
pub struct PositionTracker {
    policy: ReversalPolicy,
    positions: HashMap<Symbol, Position>,
    /// Fill progress of orders that may still fill.
    orders: HashMap<String, OrderProgress>,
    /// Ids of terminal orders, oldest first, capped at `retired_capacity`.
    retired: VecDeque<String>,
    retired_ids: HashSet<String>,
    retired_capacity: usize,
}

/// Terminal order ids remembered so late redeliveries stay no-ops.
pub const DEFAULT_RETIRED_ORDER_CAPACITY: usize = 4096;

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new(ReversalPolicy::default())
    }
}

impl PositionTracker {
    pub fn new(policy: ReversalPolicy) -> Self {
        Self::with_retired_capacity(policy, DEFAULT_RETIRED_ORDER_CAPACITY)
    }

    pub fn with_retired_capacity(policy: ReversalPolicy, retired_capacity: usize) -> Self {
        Self {
            policy,
            positions: HashMap::new(),
            orders: HashMap::new(),
            retired: VecDeque::new(),
            retired_ids: HashSet::new(),
            retired_capacity: retired_capacity.max(1),
        }
    }

    pub fn policy(&self) -> ReversalPolicy {
        self.policy
    }

    /// Apply one fill of `fill_qty` at `fill_price`.
    pub fn update(&mut self, symbol: &Symbol, side: Side, fill_qty: Decimal, fill_price: Decimal) -> PositionChange {
        self.apply_fill(symbol, side, fill_qty, fill_qty * fill_price)
    }

    fn apply_fill(&mut self, symbol: &Symbol, side: Side, fill_qty: Decimal, fill_quote: Decimal) -> PositionChange {
        let (qty_before, price_before) = self
            .positions
            .get(symbol)
            .map(|position| (position.qty, position.avg_price))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));
        let unchanged = PositionChange {
            qty_before,
            price_before,
            qty_after: qty_before,
            price_after: price_before,
        };
        if fill_qty <= Decimal::ZERO {
            return unchanged;
        }

        let position = match self.positions.get_mut(symbol) {
            Some(position) if !position.is_flat() => position,
            _ => {
                let position = Position::open(symbol.clone(), side, fill_qty, fill_quote);
                let change = PositionChange {
                    qty_before,
                    price_before,
                    qty_after: position.qty,
                    price_after: position.avg_price,
                };
                self.positions.insert(symbol.clone(), position);
                return change;
            }
        };

        if position.side == side {
            position.qty += fill_qty;
            position.accumulated_quote_qty += fill_quote;
            position.avg_price = position.accumulated_quote_qty / position.qty;
        } else if fill_qty < position.qty {
            position.qty -= fill_qty;
            position.accumulated_quote_qty = position.avg_price * position.qty;
        } else {
            let excess = fill_qty - position.qty;
            match self.policy {
                ReversalPolicy::Reverse if !excess.is_zero() => {
                    let excess_quote = fill_quote * excess / fill_qty;
                    position.side = side;
                    position.qty = excess;
                    position.accumulated_quote_qty = excess_quote;
                    position.avg_price = excess_quote / excess;
                }
                policy => {
                    if !excess.is_zero() {
                        debug!(%symbol, %excess, ?policy, "opposite fill exceeds position; excess dropped");
                    }
                    position.qty = Decimal::ZERO;
                    position.accumulated_quote_qty = Decimal::ZERO;
                    position.avg_price = Decimal::ZERO;
                }
            }
        }

        PositionChange {
            qty_before,
            price_before,
            qty_after: position.qty,
            price_after: position.avg_price,
        }
    }

    /// Apply the fill implied by a cumulative order snapshot.
    ///
    /// Returns `None` when the snapshot carries no new fill (duplicate or
    /// stale) or cannot be priced. A terminal snapshot retires the order:
    /// its progress entry is dropped and later snapshots for the id are
    /// ignored while it stays in the retired ring.
    pub fn apply_order(&mut self, order: &Order) -> Option<PositionChange> {
        if self.retired_ids.contains(&order.order_id) {
            debug!(order_id = %order.order_id, "snapshot for retired order ignored");
            return None;
        }
        let change = self.apply_progress(order);
        if order.status.is_terminal() {
            self.retire(&order.order_id);
        }
        change
    }

    fn retire(&mut self, order_id: &str) {
        self.orders.remove(order_id);
        if !self.retired_ids.insert(order_id.to_string()) {
            return;
        }
        self.retired.push_back(order_id.to_string());
        while self.retired.len() > self.retired_capacity {
            if let Some(oldest) = self.retired.pop_front() {
                self.retired_ids.remove(&oldest);
            }
        }
    }

    fn apply_progress(&mut self, order: &Order) -> Option<PositionChange> {
        let applied = self.orders.get(&order.order_id).copied().unwrap_or_default();
        if order.filled_qty <= applied.filled_qty {
            if order.filled_qty < applied.filled_qty {
                debug!(
                    order_id = %order.order_id,
                    applied = %applied.filled_qty,
                    snapshot = %order.filled_qty,
                    "stale order snapshot ignored"
                );
            }
            return None;
        }

        let delta_qty = order.filled_qty - applied.filled_qty;
        let (cumulative_quote, delta_quote) = match (order.avg_fill_price, order.price) {
            (Some(avg), _) => {
                let cumulative = avg * order.filled_qty;
                let delta = cumulative - applied.quote_qty;
                if delta > Decimal::ZERO {
                    (cumulative, delta)
                } else {
                    (applied.quote_qty + avg * delta_qty, avg * delta_qty)
                }
            }
            (None, Some(price)) => (applied.quote_qty + price * delta_qty, price * delta_qty),
            (None, None) => {
                warn!(order_id = %order.order_id, "order fill without any price; skipped");
                return None;
            }
        };

        self.orders.insert(
            order.order_id.clone(),
            OrderProgress {
                filled_qty: order.filled_qty,
                quote_qty: cumulative_quote,
            },
        );

        let change = self.apply_fill(&order.symbol, order.side, delta_qty, delta_quote);
        if let Some(position) = self.positions.get_mut(&order.symbol) {
            position.last_order_id = Some(order.order_id.clone());
            position.last_filled_qty = order.filled_qty;
        }
        Some(change)
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> &HashMap<Symbol, Position> {
        &self.positions
    }

    /// Drop all bookkeeping for an order, retired or not. A later snapshot
    /// for the same id is applied from zero again.
    pub fn forget_order(&mut self, order_id: &str) -> bool {
        let retired = self.retired_ids.remove(order_id);
        if retired {
            self.retired.retain(|id| id != order_id);
        }
        self.orders.remove(order_id).is_some() || retired
    }

    /// Orders with fill progress that are not yet terminal.
    pub fn tracked_orders(&self) -> usize {
        self.orders.len()
    }

    pub fn retired_orders(&self) -> usize {
        self.retired.len()
    }
}
