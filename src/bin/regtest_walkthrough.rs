//! Regtest Walkthrough
//! Mint, mature, spend, attempt a double spend, then reorg the spend away.
//!
//! Usage: regtest_walkthrough [config.json]

use anyhow::{bail, Context, Result};
use zerocoin_core::{
    Block, ChainHandle, ChainState, Denomination, Network, NodeConfig, ProofEngine, SecurityLevel,
    SpendInput, SpendRequest, SpendWorker, Validation, WalletMintStore,
};

fn extend_to(chain: &ChainHandle, height: u64) -> Result<()> {
    while chain.tip().map_or(true, |tip| tip < height) {
        let next = chain.tip().map_or(0, |tip| tip + 1);
        chain.connect_block(Block::new(next))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => NodeConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => NodeConfig::for_network(Network::Regtest),
    };
    config.validate()?;
    let params = config.consensus.clone();

    println!("🪙 Zerocoin regtest walkthrough");
    println!("{}", "=".repeat(40));
    println!(
        "   K={} M={} P={} finality={}",
        params.maturity_confirmations,
        params.min_subsequent_mints,
        params.checkpoint_period,
        params.finality_depth
    );

    let chain = ChainHandle::new(ChainState::new(params.clone())?);
    let wallet = WalletMintStore::new([0x5a; 32], config.wallet.clone())?;
    let worker = SpendWorker::new(&config.worker, ProofEngine::default())?;

    println!("\n1️⃣  Minting three coins of denomination 10...");
    let mut genesis = Block::new(0);
    for _ in 0..3 {
        genesis = genesis.with_mint(wallet.create_deterministic_mint(Denomination::Ten)?);
    }
    let target = genesis.mints[0].commitment;
    chain.connect_block(genesis)?;
    println!("   Mint commitment: {}", target);

    println!("\n2️⃣  Advancing until a checkpoint covering the mint is final...");
    // Genesis mints fold at height K - 1
    let fold_height = params.maturity_confirmations - 1;
    let checkpoint = fold_height.div_ceil(params.checkpoint_period) * params.checkpoint_period;
    extend_to(&chain, checkpoint + params.finality_depth)?;
    wallet.sync_with_chain(&chain.read());
    let balance = wallet.balance();
    println!("   Tip: {:?}", chain.tip());
    println!("   Mature balance: {} base units", balance.mature);

    println!("\n3️⃣  Generating spend proof at security level 42...");
    let task = worker.spawn_spend(SpendRequest {
        chain: chain.clone(),
        reservation: wallet.reserve(&target)?,
        destination: None,
        security_level: SecurityLevel::new(42)?,
        checkpoint_height: None,
    });
    let outcome = task.join().await?;
    println!(
        "   Proof against checkpoint {} ({} bytes)",
        outcome.proof.checkpoint_height,
        outcome.proof.to_bytes()?.len()
    );

    let spend = SpendInput {
        proof: outcome.proof,
        destination: outcome.destination,
    };
    let accepted = chain.read().validate_spend_input(&spend);
    println!("   Validation: {:?}", accepted);
    if !accepted.is_accepted() {
        bail!("fresh spend proof rejected: {:?}", accepted);
    }

    let spend_height = chain.tip().map_or(0, |tip| tip + 1);
    chain.connect_block(Block::new(spend_height).with_spend(spend.clone()))?;
    wallet.sync_with_chain(&chain.read());
    println!("   Spent at height {}", spend_height);

    println!("\n4️⃣  Replaying the same proof...");
    match chain.read().validate_spend_input(&spend) {
        Validation::Rejected(reason) => println!("   Rejected: {} (score {})", reason.code(), reason.misbehavior_score()),
        Validation::Accepted => bail!("double spend accepted"),
    }

    println!("\n5️⃣  Reorganising the spend block away...");
    let ancestor = spend_height - 1;
    chain.disconnect_to(ancestor)?;
    wallet.handle_reorg(ancestor);
    wallet.sync_with_chain(&chain.read());
    let serial_spent = chain.read().ledger().contains(&spend.proof.serial);
    let state = wallet
        .mint(&target)
        .map(|m| m.spend_state())
        .context("wallet lost the mint")?;
    println!("   Serial still spent: {}", serial_spent);
    println!("   Wallet spend state: {:?}", state);

    println!("\n✅ Walkthrough complete");
    Ok(())
}
