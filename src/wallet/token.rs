use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use log::warn;
use serde_json::{json, Value};

use super::rpc::JsonRpc;
use super::tx::Eip1559Tx;
use super::{
    format_units, parse_address, parse_small_word, parse_word, Balance, Wallet, WalletError,
};
use crate::bounded::run_bounded;

const BALANCE_OF_SELECTOR: &str = "70a08231";
const DECIMALS_SELECTOR: &str = "313ce567";
const ALLOWANCE_SELECTOR: &str = "dd62ed3e";
const APPROVE_SELECTOR: &str = "095ea7b3";
const DEFAULT_APPROVE_GAS: u64 = 100_000;

// An ERC-20 contract reached over JSON-RPC
pub struct Erc20Token {
    rpc: Arc<dyn JsonRpc>,
    address: Address,
    timeout: Duration,
}

impl Erc20Token {
    pub fn new(
        rpc: Arc<dyn JsonRpc>,
        address: &str,
        timeout: Duration,
    ) -> Result<Self, WalletError> {
        Ok(Self {
            rpc,
            address: parse_address(address)?,
            timeout,
        })
    }

    // Human-readable balance. Never fails: an error or a slow node becomes an
    // inline error string.
    pub async fn balance(&self, owner: Address) -> Balance {
        match run_bounded(self.timeout, self.try_balance(owner)).await {
            Ok(amount) => Balance::Amount(amount),
            Err(e) => {
                if e.is_timeout() {
                    warn!("Balance read for {} timed out", owner);
                }
                Balance::failed(e)
            }
        }
    }

    async fn try_balance(&self, owner: Address) -> Result<f64, String> {
        let raw = self.balance_of(owner).await?;
        let decimals = self.decimals().await?;
        format_units(raw, decimals)
    }

    pub async fn balance_of(&self, owner: Address) -> Result<U256, String> {
        let calldata = format!("0x{BALANCE_OF_SELECTOR}{}", word_for_address(owner));
        let result = self.eth_call(&calldata).await?;
        parse_word(&result, "balanceOf")
    }

    pub async fn decimals(&self) -> Result<u8, String> {
        let result = self.eth_call(&format!("0x{DECIMALS_SELECTOR}")).await?;
        parse_small_word(&result, "decimals")
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, String> {
        let calldata = format!(
            "0x{ALLOWANCE_SELECTOR}{}{}",
            word_for_address(owner),
            word_for_address(spender)
        );
        let result = self.eth_call(&calldata).await?;
        parse_word(&result, "allowance")
    }

    // Signs and broadcasts `approve(spender, amount)`; returns the tx hash
    pub async fn approve(
        &self,
        wallet: &Wallet,
        spender: Address,
        amount: U256,
    ) -> Result<String, String> {
        let from = hex_address(wallet.address());
        let to = hex_address(self.address);
        let data = approve_calldata(spender, amount);
        let data_hex = format!("0x{}", hex::encode(&data));

        let chain_id = self.quantity("eth_chainId", json!([])).await?;
        let nonce = self
            .quantity("eth_getTransactionCount", json!([from, "pending"]))
            .await?;
        let gas_price = self.quantity("eth_gasPrice", json!([])).await?;
        let gas_limit = self
            .quantity(
                "eth_estimateGas",
                json!([{"from": from, "to": to, "data": data_hex}]),
            )
            .await
            .unwrap_or_else(|error| {
                warn!("eth_estimateGas failed, using {}: {}", DEFAULT_APPROVE_GAS, error);
                U256::from(DEFAULT_APPROVE_GAS)
            });

        let tx = Eip1559Tx {
            chain_id,
            nonce,
            max_priority_fee_per_gas: gas_price,
            max_fee_per_gas: gas_price * U256::from(2u64),
            gas_limit,
            to: self.address,
            value: U256::ZERO,
            data,
        };
        let raw = tx.sign(wallet.signing_key())?;

        let hash = self
            .rpc
            .request(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await
            .map_err(|error| format!("eth_sendRawTransaction failed: {error}"))?;
        hash.as_str()
            .map(str::to_string)
            .ok_or_else(|| "eth_sendRawTransaction result was missing".to_string())
    }

    // None while the transaction is pending, else whether it succeeded
    pub async fn receipt_status(&self, tx_hash: &str) -> Result<Option<bool>, String> {
        let receipt = self
            .rpc
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await
            .map_err(|error| format!("eth_getTransactionReceipt failed: {error}"))?;
        if receipt.is_null() {
            return Ok(None);
        }
        let status = receipt
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| "receipt status was missing".to_string())?;
        Ok(Some(parse_word(status, "receipt status")? == U256::from(1u64)))
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<U256, String> {
        let result = self
            .rpc
            .request(method, params)
            .await
            .map_err(|error| format!("{method} failed: {error}"))?;
        let raw = result
            .as_str()
            .ok_or_else(|| format!("{method} result was missing"))?;
        parse_word(raw, method)
    }

    async fn eth_call(&self, calldata: &str) -> Result<String, String> {
        let result = self
            .rpc
            .request(
                "eth_call",
                json!([{"to": hex_address(self.address), "data": calldata}, "latest"]),
            )
            .await
            .map_err(|error| format!("eth_call failed: {error}"))?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "eth_call result was missing".to_string())
    }
}

fn hex_address(address: Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

fn word_for_address(address: Address) -> String {
    format!("{:0>64}", hex::encode(address.as_slice()))
}

fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&[0x09, 0x5e, 0xa7, 0xb3]);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(spender.as_slice());
    data.extend_from_slice(&amount.to_be_bytes::<32>());
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_OPG_TOKEN;
    use crate::wallet::rpc::stub::ScriptedRpc;
    use crate::wallet::HttpJsonRpc;
    use tokio::net::TcpListener;

    fn word(hex_value: &str) -> Value {
        json!(format!("0x{hex_value:0>64}"))
    }

    fn token_over(rpc: Arc<dyn JsonRpc>, timeout: Duration) -> Erc20Token {
        Erc20Token::new(rpc, DEFAULT_OPG_TOKEN, timeout).unwrap()
    }

    #[tokio::test]
    async fn balance_is_scaled_by_decimals() {
        let rpc = ScriptedRpc::new()
            .answer("eth_call:70a08231", word("112210f47de98000"))
            .answer("eth_call:313ce567", word("12"));
        let token = token_over(Arc::new(rpc), Duration::from_secs(1));

        assert_eq!(token.balance(Address::ZERO).await, Balance::Amount(1.2346));
    }

    #[tokio::test]
    async fn rpc_error_renders_inline() {
        let rpc = ScriptedRpc::new().answer("eth_call:313ce567", word("12"));
        let token = token_over(Arc::new(rpc), Duration::from_secs(1));

        let balance = token.balance(Address::ZERO).await;
        assert!(matches!(balance, Balance::Error(ref m) if m.starts_with("error(eth_call failed")));
    }

    #[tokio::test]
    async fn unreachable_node_renders_inline_error() {
        let rpc = HttpJsonRpc::new("http://127.0.0.1:9", Duration::from_secs(1));
        let token = token_over(Arc::new(rpc), Duration::from_secs(5));

        let balance = token.balance(Address::ZERO).await;
        assert!(matches!(balance, Balance::Error(ref m) if m.starts_with("error(")));
    }

    #[tokio::test]
    async fn silent_node_times_out() {
        // accepts connections and never writes a byte back
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let rpc = HttpJsonRpc::new(url, Duration::from_secs(1));
        let token = token_over(Arc::new(rpc), Duration::from_secs(1));

        let started = std::time::Instant::now();
        let balance = token.balance(Address::ZERO).await;
        assert_eq!(balance, Balance::failed("Timed out after 1s"));
        assert!(started.elapsed() < Duration::from_secs(5));
        holder.abort();
    }

    #[tokio::test]
    async fn allowance_encodes_owner_and_spender() {
        let rpc = Arc::new(ScriptedRpc::new().answer("eth_call:dd62ed3e", word("64")));
        let token = token_over(rpc.clone(), Duration::from_secs(1));
        let owner = Address::repeat_byte(0x11);
        let spender = Address::repeat_byte(0x22);

        assert_eq!(token.allowance(owner, spender).await.unwrap(), U256::from(100u64));

        let params = rpc.params_of("eth_call").unwrap();
        let data = params[0]["data"].as_str().unwrap();
        assert_eq!(data.len(), 2 + 8 + 128);
        assert!(data.ends_with(&"22".repeat(20)));
        assert!(data[10..74].ends_with(&"11".repeat(20)));
    }

    #[test]
    fn approve_calldata_layout() {
        let data = approve_calldata(Address::repeat_byte(0xaa), U256::from(5u64));
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(hex::encode(&data[..4]), APPROVE_SELECTOR);
        assert_eq!(&data[16..36], &[0xaa; 20]);
        assert_eq!(data[67], 5);
        assert_eq!(data.len(), 68);
    }

    #[tokio::test]
    async fn pending_receipt_is_none() {
        let rpc = ScriptedRpc::new().answer("eth_getTransactionReceipt", Value::Null);
        let token = token_over(Arc::new(rpc), Duration::from_secs(1));
        assert_eq!(token.receipt_status("0xabc").await.unwrap(), None);
    }
}
