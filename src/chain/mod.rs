//! Chain - transaction value objects and the resolvers that fill them in.

pub mod resolver;
pub mod types;
pub mod unspent;

pub use resolver::{AddressResolver, ResolvedInput, ResolvedOutput, ScannedTransaction, BLOCK_REWARD};
pub use types::{Block, CoinTransaction, Mempool, RawTransaction, TransactionInput, TransactionOutput, UnspentOutput};
pub use unspent::UnspentResolver;
