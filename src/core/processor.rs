//! Transaction validation and ledger mutation, one processor per kind.
//!
//! `validate` is read-only and answers "could this apply right now";
//! `process` re-validates and then stages the ledger mutation. Neither
//! confirms: folding or discarding staged state is the chain's call once
//! the whole block is known to succeed or fail.

use crate::core::ledger::Ledger;
use crate::core::transaction::{Transaction, TxKind, TxPayload, CALL_METHOD_TRANSFER};
use crate::types::address::Address;
use minichain_derive::Error;

/// Errors produced while validating or processing transactions.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("no processor registered for transaction type `{0}`")]
    Unregistered(String),

    #[error("processor for `{expected}` received a `{actual}` transaction")]
    WrongVariant { expected: TxKind, actual: TxKind },

    #[error("insufficient balance for {address}: have {available}, need {required}")]
    InsufficientBalance {
        address: Address,
        available: i64,
        required: i64,
    },

    #[error("transaction amounts overflow")]
    AmountOverflow,

    #[error("unsupported contract method `{0}`")]
    UnsupportedMethod(String),
}

/// Validates and applies one kind of transaction against the ledger.
///
/// Implementations must be thread-safe; the registry shares them across
/// every chain operation.
pub trait TransactionProcessor: Send + Sync {
    /// Checks the transaction against current balances without mutating.
    fn validate(&self, tx: &Transaction, ledger: &Ledger) -> Result<(), ProcessorError>;

    /// Re-validates, then stages the ledger mutation.
    ///
    /// Fails with the same error `validate` would.
    fn process(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), ProcessorError>;
}

fn require_balance(
    ledger: &Ledger,
    address: &Address,
    required: i64,
) -> Result<(), ProcessorError> {
    let available = ledger.get_balance(address);
    if available < required {
        return Err(ProcessorError::InsufficientBalance {
            address: *address,
            available,
            required,
        });
    }
    Ok(())
}

/// Total the sender is charged. Amounts are attacker-controlled, so the sum
/// must not wrap.
fn charge(value: i64, fee: i64) -> Result<i64, ProcessorError> {
    value.checked_add(fee).ok_or(ProcessorError::AmountOverflow)
}

fn wrong_variant(expected: TxKind, tx: &Transaction) -> ProcessorError {
    ProcessorError::WrongVariant {
        expected,
        actual: tx.kind,
    }
}

/// Plain currency transfer. The coinbase sender mints and skips the
/// balance check; everyone else pays `value + fee`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoinTransferProcessor;

impl TransactionProcessor for CoinTransferProcessor {
    fn validate(&self, tx: &Transaction, ledger: &Ledger) -> Result<(), ProcessorError> {
        match tx.payload {
            TxPayload::CoinTransfer { .. } => {}
            _ => return Err(wrong_variant(TxKind::CoinTransfer, tx)),
        }

        if tx.sender.is_coinbase() {
            return Ok(());
        }
        require_balance(ledger, &tx.sender, charge(tx.value, tx.fee)?)
    }

    fn process(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), ProcessorError> {
        self.validate(tx, ledger)?;

        let recipient = match tx.payload {
            TxPayload::CoinTransfer { recipient } => recipient,
            _ => return Err(wrong_variant(TxKind::CoinTransfer, tx)),
        };

        if !tx.sender.is_coinbase() {
            ledger.debit(tx.sender, charge(tx.value, tx.fee)?);
        }
        ledger.credit(recipient, tx.value);
        Ok(())
    }
}

/// Token transfer. Ledger effect mirrors a coin transfer; the token
/// address rides along as metadata.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenTransferProcessor;

impl TransactionProcessor for TokenTransferProcessor {
    fn validate(&self, tx: &Transaction, ledger: &Ledger) -> Result<(), ProcessorError> {
        match tx.payload {
            TxPayload::TokenTransfer { .. } => {}
            _ => return Err(wrong_variant(TxKind::TokenTransfer, tx)),
        }
        require_balance(ledger, &tx.sender, charge(tx.value, tx.fee)?)
    }

    fn process(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), ProcessorError> {
        self.validate(tx, ledger)?;

        let recipient = match tx.payload {
            TxPayload::TokenTransfer { recipient, .. } => recipient,
            _ => return Err(wrong_variant(TxKind::TokenTransfer, tx)),
        };

        ledger.debit(tx.sender, charge(tx.value, tx.fee)?);
        ledger.credit(recipient, tx.value);
        Ok(())
    }
}

/// Contract deployment. The sender funds the contract's initial supply,
/// credited to the address derived from the transaction id.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContractDeployProcessor;

impl TransactionProcessor for ContractDeployProcessor {
    fn validate(&self, tx: &Transaction, ledger: &Ledger) -> Result<(), ProcessorError> {
        let initial_supply = match tx.payload {
            TxPayload::ContractDeploy { initial_supply, .. } => initial_supply,
            _ => return Err(wrong_variant(TxKind::ContractDeploy, tx)),
        };
        require_balance(ledger, &tx.sender, charge(initial_supply, tx.fee)?)
    }

    fn process(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), ProcessorError> {
        self.validate(tx, ledger)?;

        let initial_supply = match tx.payload {
            TxPayload::ContractDeploy { initial_supply, .. } => initial_supply,
            _ => return Err(wrong_variant(TxKind::ContractDeploy, tx)),
        };

        ledger.debit(tx.sender, charge(initial_supply, tx.fee)?);
        ledger.credit(Address::from_hash(&tx.id), initial_supply);
        Ok(())
    }
}

/// Contract call. Only the `transfer` method exists: the sender pays
/// `amount + fee` and `amount` is credited to the call's target.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContractCallProcessor;

impl TransactionProcessor for ContractCallProcessor {
    fn validate(&self, tx: &Transaction, ledger: &Ledger) -> Result<(), ProcessorError> {
        let (method, amount) = match &tx.payload {
            TxPayload::ContractCall { method, amount, .. } => (method, *amount),
            _ => return Err(wrong_variant(TxKind::ContractCall, tx)),
        };

        if method != CALL_METHOD_TRANSFER {
            return Err(ProcessorError::UnsupportedMethod(method.clone()));
        }
        require_balance(ledger, &tx.sender, charge(amount, tx.fee)?)
    }

    fn process(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), ProcessorError> {
        self.validate(tx, ledger)?;

        let (to, amount) = match &tx.payload {
            TxPayload::ContractCall { to, amount, .. } => (*to, *amount),
            _ => return Err(wrong_variant(TxKind::ContractCall, tx)),
        };

        ledger.debit(tx.sender, charge(amount, tx.fee)?);
        ledger.credit(to, amount);
        Ok(())
    }
}
