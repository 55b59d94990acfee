//! # Funds
//!
//! Payment sources and destinations. The variants only name *which*
//! account money moves from or to; a [`Funds`] ledger supplied by the host
//! performs the movement.

use crate::resolver::Resolver;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A ledger of named accounts
pub trait Funds {
    /// Current balance of an account (0 if unknown)
    fn balance(&self, account: &str) -> i64;

    /// Remove `amount` if the account can cover it
    fn try_withdraw(&mut self, account: &str, amount: i64) -> bool;

    /// Add `amount` to an account
    fn deposit(&mut self, account: &str, amount: i64) -> bool;
}

/// Where purchase money comes from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentSource {
    /// The actor's household funds
    #[default]
    Household,
    /// A fixed named account
    Account { account: String },
}

impl PaymentSource {
    /// Account charged for a resolver
    pub fn account<'a>(&'a self, actor: &'a Resolver) -> &'a str {
        match self {
            PaymentSource::Household => &actor.household,
            PaymentSource::Account { account } => account,
        }
    }

    pub fn try_remove_funds(&self, funds: &mut dyn Funds, actor: &Resolver, amount: i64) -> bool {
        let account = self.account(actor);
        let removed = funds.try_withdraw(account, amount);
        debug!("Withdraw {} from {}: {}", amount, account, removed);
        removed
    }

    /// Return money taken for a unit that was not delivered
    pub fn refund(&self, funds: &mut dyn Funds, actor: &Resolver, amount: i64) -> bool {
        funds.deposit(self.account(actor), amount)
    }
}

/// Where collected money goes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentDestination {
    /// Money leaves the economy
    #[default]
    Discard,
    /// A named account (a business till, the seller's household)
    Account { account: String },
}

impl PaymentDestination {
    pub fn give_payment(&self, funds: &mut dyn Funds, amount: i64) -> bool {
        match self {
            PaymentDestination::Discard => true,
            PaymentDestination::Account { account } => funds.deposit(account, amount),
        }
    }
}

/// Account balances held in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryFunds {
    accounts: HashMap<String, i64>,
}

impl InMemoryFunds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: open an account with a starting balance
    pub fn with_account(mut self, account: impl Into<String>, balance: i64) -> Self {
        self.accounts.insert(account.into(), balance);
        self
    }

    /// Open an account if it does not exist yet
    pub fn ensure_account(&mut self, account: &str, balance: i64) {
        self.accounts.entry(account.to_string()).or_insert(balance);
    }
}

impl Funds for InMemoryFunds {
    fn balance(&self, account: &str) -> i64 {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    fn try_withdraw(&mut self, account: &str, amount: i64) -> bool {
        if amount < 0 {
            return false;
        }
        match self.accounts.get_mut(account) {
            Some(balance) if *balance >= amount => {
                *balance -= amount;
                true
            }
            _ => false,
        }
    }

    fn deposit(&mut self, account: &str, amount: i64) -> bool {
        if amount < 0 {
            return false;
        }
        *self.accounts.entry(account.to_string()).or_insert(0) += amount;
        true
    }
}
