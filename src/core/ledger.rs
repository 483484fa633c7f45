//! Account balance ledger with staged and confirmed state.
//!
//! Mutations land in a staged overlay while a block's transactions are being
//! processed. `confirm` folds the overlay into the confirmed balances when
//! the whole block succeeds; `reject` discards it when any transaction
//! fails, leaving confirmed state untouched.

use crate::types::address::Address;
use std::collections::HashMap;

/// Where the ledger is in its mutation lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerState {
    /// No staged changes; reads reflect confirmed state only.
    Idle,
    /// Staged changes pending a `confirm` or `reject`.
    Staging,
}

/// Balance ledger. Balances are signed; sufficiency is a transaction
/// processor concern, not a ledger invariant.
#[derive(Clone, Debug)]
pub struct Ledger {
    confirmed: HashMap<Address, i64>,
    staged: HashMap<Address, i64>,
    state: LedgerState,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            confirmed: HashMap::new(),
            staged: HashMap::new(),
            state: LedgerState::Idle,
        }
    }

    /// Returns the effective balance: confirmed plus staged delta.
    ///
    /// Unknown addresses have balance 0. Balances saturate at the i64
    /// extremes rather than wrapping.
    pub fn get_balance(&self, address: &Address) -> i64 {
        self.confirmed
            .get(address)
            .copied()
            .unwrap_or(0)
            .saturating_add(self.staged.get(address).copied().unwrap_or(0))
    }

    /// Stages a credit to `address`.
    pub fn credit(&mut self, address: Address, amount: i64) {
        let staged = self.staged.entry(address).or_insert(0);
        *staged = staged.saturating_add(amount);
        self.state = LedgerState::Staging;
    }

    /// Stages a debit from `address`.
    pub fn debit(&mut self, address: Address, amount: i64) {
        let staged = self.staged.entry(address).or_insert(0);
        *staged = staged.saturating_sub(amount);
        self.state = LedgerState::Staging;
    }

    /// Stages a transfer of `amount` from `from` to `to`.
    pub fn transfer(&mut self, from: Address, to: Address, amount: i64) {
        self.debit(from, amount);
        self.credit(to, amount);
    }

    /// Folds staged deltas into confirmed balances and returns to idle.
    pub fn confirm(&mut self) {
        for (address, delta) in self.staged.drain() {
            let confirmed = self.confirmed.entry(address).or_insert(0);
            *confirmed = confirmed.saturating_add(delta);
        }
        self.state = LedgerState::Idle;
    }

    /// Discards all staged deltas and returns to idle.
    pub fn reject(&mut self) {
        self.staged.clear();
        self.state = LedgerState::Idle;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LedgerState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    #[test]
    fn unknown_address_has_zero_balance() {
        let ledger = Ledger::new();
        assert_eq!(ledger.get_balance(&addr(1)), 0);
        assert_eq!(ledger.state(), LedgerState::Idle);
    }

    #[test]
    fn staged_credit_visible_before_confirm() {
        let mut ledger = Ledger::new();
        ledger.credit(addr(1), 100);
        assert_eq!(ledger.get_balance(&addr(1)), 100);
        assert_eq!(ledger.state(), LedgerState::Staging);
    }

    #[test]
    fn confirm_folds_staged_into_confirmed() {
        let mut ledger = Ledger::new();
        ledger.credit(addr(1), 100);
        ledger.confirm();

        assert_eq!(ledger.get_balance(&addr(1)), 100);
        assert_eq!(ledger.state(), LedgerState::Idle);

        // A later reject must not touch the confirmed 100.
        ledger.credit(addr(1), 50);
        assert_eq!(ledger.get_balance(&addr(1)), 150);
        ledger.reject();
        assert_eq!(ledger.get_balance(&addr(1)), 100);
    }

    #[test]
    fn reject_discards_all_staged_deltas() {
        let mut ledger = Ledger::new();
        ledger.credit(addr(1), 10);
        ledger.debit(addr(2), 5);
        ledger.reject();

        assert_eq!(ledger.get_balance(&addr(1)), 0);
        assert_eq!(ledger.get_balance(&addr(2)), 0);
        assert_eq!(ledger.state(), LedgerState::Idle);
    }

    #[test]
    fn transfer_moves_funds() {
        let mut ledger = Ledger::new();
        ledger.credit(addr(1), 100);
        ledger.confirm();

        ledger.transfer(addr(1), addr(2), 30);
        assert_eq!(ledger.get_balance(&addr(1)), 70);
        assert_eq!(ledger.get_balance(&addr(2)), 30);

        ledger.confirm();
        assert_eq!(ledger.get_balance(&addr(1)), 70);
        assert_eq!(ledger.get_balance(&addr(2)), 30);
    }

    #[test]
    fn balances_may_go_negative() {
        let mut ledger = Ledger::new();
        ledger.debit(addr(1), 25);
        ledger.confirm();
        assert_eq!(ledger.get_balance(&addr(1)), -25);
    }

    #[test]
    fn balances_saturate_instead_of_wrapping() {
        let mut ledger = Ledger::new();
        ledger.credit(addr(1), i64::MAX);
        ledger.confirm();

        ledger.credit(addr(1), i64::MAX);
        assert_eq!(ledger.get_balance(&addr(1)), i64::MAX);
        ledger.confirm();
        assert_eq!(ledger.get_balance(&addr(1)), i64::MAX);

        ledger.debit(addr(2), i64::MAX);
        ledger.debit(addr(2), i64::MAX);
        assert_eq!(ledger.get_balance(&addr(2)), i64::MIN);
    }

    #[test]
    fn repeated_staging_accumulates() {
        let mut ledger = Ledger::new();
        ledger.credit(addr(1), 10);
        ledger.credit(addr(1), 15);
        ledger.debit(addr(1), 5);
        assert_eq!(ledger.get_balance(&addr(1)), 20);
    }
}
