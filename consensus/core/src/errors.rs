use chain_math::MathError;
use thiserror::Error;

use crate::tx::TxOutputKey;
use crate::{Hash, U256};

/// The consensus rule a block or transaction broke.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    #[error("Block target {block_target:#x} is easier than the required {required:#x}")]
    TargetAboveRequired { block_target: U256, required: U256 },

    #[error("Block hash is above target {target:#x}")]
    HashAboveTarget { target: U256 },

    #[error("Cumulative work overflows 256 bits")]
    TotalWorkOverflow,

    #[error("Block has no transactions")]
    NoTransactions,

    #[error("Coinbase must have exactly one input, found {0}")]
    CoinbaseInputCount(usize),

    #[error("Transaction {0} appears twice or is already unspent")]
    DuplicateTransaction(Hash),

    #[error("Transaction {tx} spends unknown output {key}")]
    MissingPreviousOutput { tx: Hash, key: TxOutputKey },

    #[error("Transaction {tx} spends {key} from a transaction at or after itself in the block")]
    SpendsLaterTransaction { tx: Hash, key: TxOutputKey },

    #[error("Transaction {tx} spends {key}, which does not exist")]
    OutputIndexOutOfRange { tx: Hash, key: TxOutputKey },

    #[error("Transaction {tx} spends {key}, already spent in this block")]
    DoubleSpend { tx: Hash, key: TxOutputKey },

    #[error("Transaction {tx} outputs {output_value} exceed inputs {input_value}")]
    OutputsExceedInputs { tx: Hash, input_value: u64, output_value: u64 },

    #[error("Transaction {tx} value overflows")]
    ValueOverflow { tx: Hash },

    #[error("Script verification failed for input {input_index} of transaction {tx}")]
    ScriptVerificationFailed { tx: Hash, input_index: usize },

    #[error("Coinbase claims {claimed}, allowed at most {allowed}")]
    CoinbaseOverpays { claimed: u64, allowed: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Block {block} rejected: {violation}")]
    Validation { block: Hash, violation: RuleViolation },

    #[error("Block {block} has malformed target bits {bits:#010x}: {source}")]
    InvalidBits {
        block: Hash,
        bits: u32,
        #[source]
        source: MathError,
    },

    #[error("Missing data for block {0}")]
    MissingData(Hash),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Internal invariant violated: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ConsensusError {
    pub fn validation(block: Hash, violation: RuleViolation) -> Self {
        Self::Validation { block, violation }
    }

    /// Consensus-rule failures, including malformed encodings. These reject a
    /// branch but never stop the node.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::InvalidBits { .. })
    }

    /// Failures that indicate a bug rather than bad input.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// The block the error is about, when known.
    pub fn block(&self) -> Option<Hash> {
        match self {
            Self::Validation { block, .. } | Self::InvalidBits { block, .. } => Some(*block),
            Self::MissingData(hash) => Some(*hash),
            _ => None,
        }
    }
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
