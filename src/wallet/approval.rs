use std::time::Duration;

use alloy_primitives::{Address, U256};
use log::{debug, info};

use super::{parse_units, Erc20Token, Wallet};

// Canonical Permit2 deployment, same address on every chain
pub const PERMIT2_ADDRESS: &str = "0x000000000022D473030F116dDEE9F6B43aC78BA3";

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOutcome {
    pub decimals: u8,
    pub allowance_before: U256,
    pub allowance_after: U256,
    pub tx_hash: Option<String>,
}

// Makes sure `spender` may pull at least `amount` tokens (decimal string) from
// the wallet. Sends an `approve` only when the current allowance is short and
// waits for its receipt. Callers bound the total wait.
pub async fn ensure_approval(
    token: &Erc20Token,
    wallet: &Wallet,
    spender: Address,
    amount: &str,
    poll_interval: Duration,
) -> Result<ApprovalOutcome, String> {
    let decimals = token.decimals().await?;
    let required = parse_units(amount, decimals)?;
    let allowance_before = token.allowance(wallet.address(), spender).await?;

    if allowance_before >= required {
        debug!("Allowance {} already covers {}", allowance_before, required);
        return Ok(ApprovalOutcome {
            decimals,
            allowance_before,
            allowance_after: allowance_before,
            tx_hash: None,
        });
    }

    info!("Approving {} for {}", amount, spender);
    let tx_hash = token.approve(wallet, spender, required).await?;
    info!("Approval sent: {}", tx_hash);

    loop {
        match token.receipt_status(&tx_hash).await? {
            Some(true) => break,
            Some(false) => return Err(format!("approval transaction {tx_hash} reverted")),
            None => tokio::time::sleep(poll_interval).await,
        }
    }

    let allowance_after = token.allowance(wallet.address(), spender).await?;
    Ok(ApprovalOutcome {
        decimals,
        allowance_before,
        allowance_after,
        tx_hash: Some(tx_hash),
    })
}
