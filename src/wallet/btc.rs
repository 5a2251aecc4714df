use super::ScanWallet;
use crate::builder::{select, TransactionAssembler};
use crate::chain::types::{decode_transaction_hex, parse_txid};
use crate::chain::{
    AddressResolver, Block, CoinTransaction, Mempool, RawTransaction, ScannedTransaction, UnspentOutput, UnspentResolver,
};
use crate::config::WalletConfig;
use crate::electrum::{ElectrumClient, HeaderNotification, ScripthashBalance};
use crate::error::{Error, Result};
use crate::keys::{curve_context, Address, KeyDeriver};
use crate::node::{HttpNodeClient, NodeClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NO_TOKENS: &str = "Tokens are not supported by the Bitcoin blockchain";

/// UTXO wallet: keys from a BIP39 phrase, reads from a full node and an
/// Electrum server, sends through coin selection and local signing.
pub struct BitcoinWallet {
    config: WalletConfig,
    deriver: KeyDeriver,
    node: Arc<dyn NodeClient>,
    electrum: ElectrumClient,
    unspent: UnspentResolver,
    resolver: AddressResolver,
    assembler: TransactionAssembler,
}

impl BitcoinWallet {
    pub fn new(mnemonic: &str, config: WalletConfig) -> Result<Self> {
        let node = Arc::new(HttpNodeClient::new(&config.node_url, config.request_timeout)?);
        Self::with_node_client(mnemonic, config, node)
    }

    /// Same as [`BitcoinWallet::new`] with a caller-supplied node client.
    pub fn with_node_client(mnemonic: &str, config: WalletConfig, node: Arc<dyn NodeClient>) -> Result<Self> {
        let secp = curve_context();
        let deriver = KeyDeriver::from_mnemonic(secp.clone(), mnemonic, config.network, &config.derivation_path)?;
        let electrum = ElectrumClient::new(config.electrum()?);

        info!(
            network = config.network.as_str(),
            electrum = config.electrum_url(),
            fee_sat = config.fee_sat,
            "Bitcoin wallet ready"
        );
        Ok(Self {
            unspent: UnspentResolver::new(electrum.clone(), config.network),
            resolver: AddressResolver::new(node.clone(), config.network),
            assembler: TransactionAssembler::new(secp, config.network),
            config,
            deriver,
            node,
            electrum,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    pub async fn list_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        self.unspent.list_unspent(address).await
    }

    /// Confirmed and unconfirmed balance as the Electrum server sees it.
    pub async fn get_balance_detail(&self, address: &str) -> Result<ScripthashBalance> {
        self.unspent.balance(address).await
    }

    pub async fn get_tip(&self) -> Result<HeaderNotification> {
        self.electrum.tip().await
    }

    pub async fn get_block_header(&self, height: u64) -> Result<String> {
        self.electrum.block_header(height).await
    }

    /// Resolve every owner in `block`. Unresolvable inputs and outputs are
    /// left as `None`.
    pub async fn scan_block(&self, block: &Block) -> Result<Vec<ScannedTransaction>> {
        let mut scanned = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            scanned.push(self.resolver.scan_transaction(tx).await?);
        }
        debug!(height = block.height, transactions = scanned.len(), "Block scanned");
        Ok(scanned)
    }

    async fn block_at(&self, height: u64) -> Result<Block> {
        let hash = self.node.block_hash(height).await?;
        let block = self.node.block(&hash).await?;
        let transactions = block
            .tx
            .iter()
            .map(|entry| {
                let coin = CoinTransaction::from_transaction(&decode_transaction_hex(&entry.hex)?);
                if coin.hash.to_string() != entry.txid {
                    return Err(Error::MalformedTransaction(format!("block {} lists {} with body {}", hash, entry.txid, coin.hash)));
                }
                Ok(coin)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Block { height, hash, transactions })
    }
}

#[async_trait]
impl ScanWallet for BitcoinWallet {
    async fn get_last_block_height(&self) -> Result<u64> {
        let info = self.node.blockchain_info().await?;
        debug!(height = info.blocks, chain = info.chain.as_deref().unwrap_or("?"), "Node tip");
        Ok(info.blocks)
    }

    async fn get_address(&self, index: u32, account_index: u32) -> Result<Address> {
        self.deriver.derive(account_index, index)
    }

    async fn get_mempool(&self) -> Result<Mempool> {
        Ok(Mempool { transaction_hashes: self.node.raw_mempool().await? })
    }

    async fn get_blocks(&self, from_height: u64, to_height: u64) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for height in from_height..=to_height {
            blocks.push(self.block_at(height).await?);
        }
        Ok(blocks)
    }

    async fn get_transactions(&self, hashes: &[String]) -> Result<Vec<CoinTransaction>> {
        let txids = hashes.iter().map(|h| parse_txid(h)).collect::<Result<Vec<_>>>()?;
        let txs = self.electrum.get_transactions(&txids).await?;
        Ok(txs.iter().map(CoinTransaction::from_transaction).collect())
    }

    async fn get_transaction(&self, hash: &str) -> Result<CoinTransaction> {
        let tx = self.node.raw_transaction(&parse_txid(hash)?).await?;
        Ok(CoinTransaction::from_transaction(&tx))
    }

    async fn create_transaction(&self, from: &Address, to: &str, value: u64) -> Result<RawTransaction> {
        if value == 0 {
            return Err(Error::UnsupportedOperation("zero-value payment".into()));
        }
        let unspent = self.unspent.list_unspent(&from.hash).await?;
        let selection = select(&unspent, value, self.config.fee_sat)?;
        debug!(
            from = %from.hash,
            inputs = selection.inputs.len(),
            total = selection.total,
            change = selection.change(),
            "Coins selected"
        );
        self.assembler.build(&selection, from, to)
    }

    async fn create_token_transaction(&self, _contract: &str, _from: &Address, _to: &str, _value: u64) -> Result<RawTransaction> {
        Err(Error::UnsupportedOperation(NO_TOKENS.into()))
    }

    async fn estimate_transaction_fee(&self, _from: &Address, _to: &str, _value: u64) -> Result<u64> {
        Ok(self.config.fee_sat)
    }

    async fn estimate_token_transaction_fee(&self, _contract: &str, _from: &Address, _to: &str, _value: u64) -> Result<u64> {
        Err(Error::UnsupportedOperation(NO_TOKENS.into()))
    }

    async fn broadcast_transaction(&self, transaction: &RawTransaction) -> Result<String> {
        transaction.verify_hash()?;
        let txid = self.node.send_raw_transaction(&transaction.data).await?;
        if txid != transaction.hash {
            warn!(expected = %transaction.hash, reported = %txid, "Node reported a different txid");
        }
        info!(txid = %txid, "Transaction broadcast");
        Ok(txid)
    }

    async fn get_address_balance(&self, address: &str) -> Result<u64> {
        Ok(self.unspent.balance(address).await?.confirmed)
    }

    async fn get_address_token_balance(&self, _contract: &str, _address: &str) -> Result<u64> {
        Err(Error::UnsupportedOperation(NO_TOKENS.into()))
    }

    /// Confirmed once the tip is `confirmations - 1` blocks past `tx_height`.
    /// Height 0 is the mempool.
    async fn is_transaction_confirmed(&self, tx_height: u64) -> Result<bool> {
        if tx_height == 0 {
            return Ok(false);
        }
        let tip = self.get_last_block_height().await?;
        if tx_height > tip {
            return Ok(false);
        }
        Ok(tip - tx_height + 1 >= u64::from(self.config.confirmations))
    }
}
