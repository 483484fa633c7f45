//! Demo node: spins up a chain, submits a few transactions, mines them,
//! and prints the resulting state.

use minichain::core::blockchain::Blockchain;
use minichain::core::registry::TransactionRegistry;
use minichain::crypto::ecdsa::EcdsaSigner;
use minichain::crypto::signer::Signer;
use minichain::types::address::Address;
use minichain::types::hash::Hash;
use minichain::{error, info};
use serde_json::json;
use std::error::Error;
use std::process;

const REWARD: i64 = 50;
const DIFFICULTY: u32 = 16;

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        process::exit(1);
    }
}

/// Deterministic demo address derived from a label.
fn named_address(label: &str) -> Address {
    Address::from_hash(&Hash::sha256().chain(label.as_bytes()).finalize())
}

fn run() -> Result<(), Box<dyn Error>> {
    let alice = named_address("alice");
    let bob = named_address("bob");
    let miner = named_address("miner");

    let signer = EcdsaSigner;
    let alice_keys = signer.generate_key_pair()?;

    let chain = Blockchain::new(
        REWARD,
        DIFFICULTY,
        alice,
        EcdsaSigner,
        TransactionRegistry::standard(),
    )?;
    info!("alice starts with {}", chain.get_balance(&alice));

    let mut transfer = chain.registry().create(
        "coin_transfer",
        &alice.to_string(),
        10,
        1,
        &json!({ "recipient": bob.to_string() }),
    )?;
    transfer.sign(&signer, &alice_keys)?;
    chain.add_transaction_to_pool(transfer)?;

    let mut deploy = chain.registry().create(
        "contract_deploy",
        &alice.to_string(),
        0,
        1,
        &json!({
            "code": "deadbeef",
            "owner": alice.to_string(),
            "initialSupply": 5,
        }),
    )?;
    deploy.sign(&signer, &alice_keys)?;
    let contract = deploy
        .contract_address()
        .ok_or("deploy transaction has no contract address")?;
    chain.add_transaction_to_pool(deploy)?;

    chain.mine_block_from_pool(miner, 0)?;
    chain.verify(0)?;

    println!("{}", chain);
    println!("alice    {}", chain.get_balance(&alice));
    println!("bob      {}", chain.get_balance(&bob));
    println!("miner    {}", chain.get_balance(&miner));
    println!("contract {}", chain.get_balance(&contract));
    Ok(())
}
