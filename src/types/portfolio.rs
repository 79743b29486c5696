//! Simulated portfolio state

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-wide simulated portfolio. Mutated only by the risk gate
/// (position reservation) and the execution simulator (fills); readers
/// receive cloned snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioState {
    /// Current equity in quote units.
    pub equity: Decimal,
    pub available_capital: Decimal,
    /// Simulated exposure per venue, keyed by the first leg's venue.
    pub exposure: HashMap<String, Decimal>,
    /// Cumulative P&L since the last daily reset; negative when losing.
    pub daily_pnl: Decimal,
    pub peak_equity: Decimal,
    pub active_positions: u32,
    pub day_anchor: NaiveDate,
}

impl PortfolioState {
    pub fn new(starting_capital: Decimal, today: NaiveDate) -> Self {
        Self {
            equity: starting_capital,
            available_capital: starting_capital,
            exposure: HashMap::new(),
            daily_pnl: Decimal::ZERO,
            peak_equity: starting_capital,
            active_positions: 0,
            day_anchor: today,
        }
    }

    pub fn total_exposure(&self) -> Decimal {
        self.exposure.values().copied().sum()
    }

    /// Losses accumulated today, as a non-negative number.
    pub fn daily_loss(&self) -> Decimal {
        if self.daily_pnl < Decimal::ZERO {
            -self.daily_pnl
        } else {
            Decimal::ZERO
        }
    }

    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.equity) / self.peak_equity).max(Decimal::ZERO)
    }
}

/// Single-writer wrapper. The lock is only ever held for short,
/// non-suspending critical sections.
pub struct Portfolio {
    state: RwLock<PortfolioState>,
    reset_hour_utc: u32,
}

impl Portfolio {
    pub fn new(starting_capital: Decimal, reset_hour_utc: u32) -> Self {
        Self {
            state: RwLock::new(PortfolioState::new(starting_capital, Utc::now().date_naive())),
            reset_hour_utc,
        }
    }

    pub fn snapshot(&self) -> PortfolioState {
        self.state.read().expect("portfolio lock poisoned").clone()
    }

    /// Reserve capital for an approved position.
    pub fn open_position(&self, venue: &str, sized_quote: Decimal) {
        let mut state = self.state.write().expect("portfolio lock poisoned");
        *state.exposure.entry(venue.to_string()).or_default() += sized_quote;
        state.available_capital -= sized_quote;
        state.active_positions += 1;
    }

    /// Apply a simulated fill: release the reserved capital and book the
    /// realized P&L against equity, daily P&L, and peak equity.
    pub fn settle_position(&self, venue: &str, sized_quote: Decimal, realized_pnl: Decimal) {
        let mut state = self.state.write().expect("portfolio lock poisoned");
        if let Some(exposure) = state.exposure.get_mut(venue) {
            *exposure = (*exposure - sized_quote).max(Decimal::ZERO);
        }
        state.available_capital += sized_quote + realized_pnl;
        state.equity += realized_pnl;
        state.daily_pnl += realized_pnl;
        if state.equity > state.peak_equity {
            state.peak_equity = state.equity;
        }
        state.active_positions = state.active_positions.saturating_sub(1);
    }

    /// Reset daily P&L once the configured wall-clock boundary passes.
    pub fn roll_day(&self, now: DateTime<Utc>) {
        let mut state = self.state.write().expect("portfolio lock poisoned");
        let boundary_passed = now.date_naive() > state.day_anchor
            && now.time().hour() >= self.reset_hour_utc;
        if boundary_passed {
            state.day_anchor = now.date_naive();
            state.daily_pnl = Decimal::ZERO;
        }
    }
}
