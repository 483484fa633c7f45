//! Dispatch table mapping transaction kinds to constructors and processors.
//!
//! The table is built explicitly at startup and never mutated afterwards;
//! the chain holds it for its whole lifetime. Lookups fail closed: a kind
//! without a registered constructor cannot be created and a kind without a
//! registered processor cannot be validated or applied.

use crate::core::ledger::Ledger;
use crate::core::processor::{
    CoinTransferProcessor, ContractCallProcessor, ContractDeployProcessor, ProcessorError,
    TokenTransferProcessor, TransactionProcessor,
};
use crate::core::transaction::{
    address_param, hex_param, i64_param, str_param, Transaction, TransactionError, TxKind,
    TxPayload,
};
use crate::types::address::Address;
use crate::types::hash::Hash;
use serde_json::Value;
use std::collections::HashMap;

/// Builds a fresh transaction of one kind from a JSON parameter object.
pub type TxConstructor = fn(Address, i64, i64, &Value) -> Result<Transaction, TransactionError>;

/// Immutable kind dispatch table.
pub struct TransactionRegistry {
    constructors: HashMap<TxKind, TxConstructor>,
    processors: HashMap<TxKind, Box<dyn TransactionProcessor>>,
}

impl TransactionRegistry {
    /// Creates an empty registry. Nothing can be created or processed until
    /// kinds are registered.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            processors: HashMap::new(),
        }
    }

    /// Registry with the four built-in kinds wired to their processors.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(
            TxKind::CoinTransfer,
            new_coin_transfer,
            Box::new(CoinTransferProcessor),
        );
        registry.register(
            TxKind::TokenTransfer,
            new_token_transfer,
            Box::new(TokenTransferProcessor),
        );
        registry.register(
            TxKind::ContractDeploy,
            new_contract_deploy,
            Box::new(ContractDeployProcessor),
        );
        registry.register(
            TxKind::ContractCall,
            new_contract_call,
            Box::new(ContractCallProcessor),
        );
        registry
    }

    /// Registers a kind's constructor and processor, replacing any previous
    /// registration for that kind.
    pub fn register(
        &mut self,
        kind: TxKind,
        constructor: TxConstructor,
        processor: Box<dyn TransactionProcessor>,
    ) {
        self.constructors.insert(kind, constructor);
        self.processors.insert(kind, processor);
    }

    /// Creates an unsigned transaction from a string tag and JSON params.
    pub fn create(
        &self,
        tag: &str,
        sender: &str,
        value: i64,
        fee: i64,
        params: &Value,
    ) -> Result<Transaction, TransactionError> {
        let kind = self.registered_kind(tag)?;
        let constructor = self.constructors[&kind];
        let sender =
            Address::from_hex(sender).map_err(|e| TransactionError::InvalidParam {
                name: "sender".to_string(),
                reason: e.to_string(),
            })?;
        constructor(sender, value, fee, params)
    }

    /// Looks up the processor for a kind, failing closed when absent.
    pub fn processor(&self, kind: TxKind) -> Result<&dyn TransactionProcessor, ProcessorError> {
        self.processors
            .get(&kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| ProcessorError::Unregistered(kind.tag().to_string()))
    }

    /// Read-only validation via the kind's processor.
    pub fn validate(&self, tx: &Transaction, ledger: &Ledger) -> Result<(), ProcessorError> {
        self.processor(tx.kind)?.validate(tx, ledger)
    }

    /// Stages the transaction's ledger mutation via the kind's processor.
    pub fn process(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), ProcessorError> {
        self.processor(tx.kind)?.process(tx, ledger)
    }

    /// Reconstructs a transaction from the JSON form of
    /// [`Transaction::to_json`], including id, signature, and timestamp.
    pub fn from_json(&self, value: &Value) -> Result<Transaction, TransactionError> {
        let tag = str_param(value, "type")?;
        let kind = self.registered_kind(tag)?;
        let payload = TxPayload::from_params(kind, value)?;

        Ok(Transaction {
            kind,
            id: hash_field(value, "id")?,
            sender: address_param(value, "sender")?,
            value: i64_param(value, "value")?,
            fee: i64_param(value, "fee")?,
            timestamp: i64_param(value, "timestamp")?,
            signature: hex_param(value, "signature")?,
            public_key: hex_param(value, "publicKey")?,
            payload,
        })
    }

    /// Parses a JSON string into a transaction.
    pub fn parse(&self, json: &str) -> Result<Transaction, TransactionError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| TransactionError::MalformedJson(e.to_string()))?;
        self.from_json(&value)
    }

    fn registered_kind(&self, tag: &str) -> Result<TxKind, TransactionError> {
        let kind =
            TxKind::from_tag(tag).ok_or_else(|| TransactionError::UnknownType(tag.to_string()))?;
        if !self.constructors.contains_key(&kind) {
            return Err(TransactionError::UnknownType(tag.to_string()));
        }
        Ok(kind)
    }
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn hash_field(value: &Value, name: &str) -> Result<Hash, TransactionError> {
    let bytes = hex_param(value, name)?;
    let raw: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| TransactionError::InvalidParam {
            name: name.to_string(),
            reason: "expected 32 hex-encoded bytes".to_string(),
        })?;
    Ok(Hash(raw))
}

fn new_coin_transfer(
    sender: Address,
    value: i64,
    fee: i64,
    params: &Value,
) -> Result<Transaction, TransactionError> {
    let payload = TxPayload::from_params(TxKind::CoinTransfer, params)?;
    Ok(Transaction::new(sender, value, fee, payload))
}

fn new_token_transfer(
    sender: Address,
    value: i64,
    fee: i64,
    params: &Value,
) -> Result<Transaction, TransactionError> {
    let payload = TxPayload::from_params(TxKind::TokenTransfer, params)?;
    Ok(Transaction::new(sender, value, fee, payload))
}

fn new_contract_deploy(
    sender: Address,
    value: i64,
    fee: i64,
    params: &Value,
) -> Result<Transaction, TransactionError> {
    let payload = TxPayload::from_params(TxKind::ContractDeploy, params)?;
    Ok(Transaction::new(sender, value, fee, payload))
}

fn new_contract_call(
    sender: Address,
    value: i64,
    fee: i64,
    params: &Value,
) -> Result<Transaction, TransactionError> {
    let payload = TxPayload::from_params(TxKind::ContractCall, params)?;
    Ok(Transaction::new(sender, value, fee, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ecdsa::EcdsaSigner;
    use crate::crypto::signer::Signer;
    use serde_json::json;

    fn hex_addr(n: u8) -> String {
        hex::encode([n; 20])
    }

    #[test]
    fn create_builds_registered_kind() {
        let registry = TransactionRegistry::standard();
        let tx = registry
            .create(
                "coin_transfer",
                &hex_addr(1),
                10,
                1,
                &json!({ "recipient": hex_addr(9) }),
            )
            .unwrap();

        assert_eq!(tx.kind, TxKind::CoinTransfer);
        assert_eq!(tx.value, 10);
        assert_eq!(tx.sender, Address([1; 20]));
        assert_eq!(tx.id, tx.compute_id());
    }

    #[test]
    fn create_rejects_unknown_tag() {
        let registry = TransactionRegistry::standard();
        let result = registry.create("stake", &hex_addr(1), 10, 1, &json!({}));
        assert!(matches!(result, Err(TransactionError::UnknownType(_))));
    }

    #[test]
    fn empty_registry_fails_closed() {
        let registry = TransactionRegistry::new();

        let create = registry.create(
            "coin_transfer",
            &hex_addr(1),
            10,
            1,
            &json!({ "recipient": hex_addr(9) }),
        );
        assert!(matches!(create, Err(TransactionError::UnknownType(_))));

        assert!(matches!(
            registry.processor(TxKind::CoinTransfer),
            Err(ProcessorError::Unregistered(_))
        ));
    }

    #[test]
    fn create_rejects_bad_sender() {
        let registry = TransactionRegistry::standard();
        let result = registry.create(
            "coin_transfer",
            "not-an-address",
            10,
            1,
            &json!({ "recipient": hex_addr(9) }),
        );
        assert!(matches!(
            result,
            Err(TransactionError::InvalidParam { .. })
        ));
    }

    #[test]
    fn validate_and_process_dispatch_by_kind() {
        let registry = TransactionRegistry::standard();
        let mut ledger = Ledger::new();
        ledger.credit(Address([1; 20]), 50);
        ledger.confirm();

        let tx = registry
            .create(
                "coin_transfer",
                &hex_addr(1),
                10,
                1,
                &json!({ "recipient": hex_addr(9) }),
            )
            .unwrap();

        registry.validate(&tx, &ledger).unwrap();
        registry.process(&tx, &mut ledger).unwrap();
        ledger.confirm();
        assert_eq!(ledger.get_balance(&Address([9; 20])), 10);
    }

    #[test]
    fn json_roundtrip_preserves_signed_transaction() {
        let registry = TransactionRegistry::standard();
        let signer = EcdsaSigner;
        let keys = signer.generate_key_pair().unwrap();

        let mut tx = registry
            .create(
                "contract_call",
                &hex_addr(1),
                0,
                2,
                &json!({
                    "contractAddress": hex_addr(7),
                    "method": "transfer",
                    "to": hex_addr(9),
                    "amount": 20,
                }),
            )
            .unwrap();
        tx.sign(&signer, &keys).unwrap();

        let restored = registry
            .parse(&tx.to_json().to_string())
            .expect("parse failed");
        assert_eq!(tx, restored);
        assert!(restored.verify(&signer).is_ok());
    }

    #[test]
    fn from_json_rejects_unknown_type() {
        let registry = TransactionRegistry::standard();
        let result = registry.from_json(&json!({ "type": "stake" }));
        assert!(matches!(result, Err(TransactionError::UnknownType(_))));
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let registry = TransactionRegistry::standard();
        assert!(matches!(
            registry.parse("{ not json"),
            Err(TransactionError::MalformedJson(_))
        ));
    }
}
