//! Transaction validation for consensus
//!
//! This module validates transactions including:
//! - Previous output lookup, in the UTXO view or earlier in the same block
//! - Input and output value sums
//! - Fee calculation
//! - Script verification through the injected verifier

use std::collections::HashMap;
use std::sync::Arc;

use consensus_core::api::ScriptVerifier;
use consensus_core::block::Block;
use consensus_core::errors::{ConsensusError, ConsensusResult, RuleViolation};
use consensus_core::tx::{TxOutput, TxOutputKey};
use consensus_core::utxo::UtxoView;
use consensus_core::Hash;
use tracing::debug;

use crate::config::RulesConfig;

/// Hashes and positions of a block's transactions, computed once per block.
pub struct BlockContext<'a> {
    pub block: &'a Block,
    pub block_hash: Hash,
    pub tx_hashes: Vec<Hash>,
    tx_positions: HashMap<Hash, usize>,
}

impl<'a> BlockContext<'a> {
    pub fn new(block: &'a Block) -> Self {
        let tx_hashes = block.tx_hashes();
        let mut tx_positions = HashMap::with_capacity(tx_hashes.len());
        for (index, hash) in tx_hashes.iter().enumerate() {
            tx_positions.entry(*hash).or_insert(index);
        }
        Self { block, block_hash: block.hash(), tx_hashes, tx_positions }
    }

    /// Position of the first transaction with `tx_hash` in the block.
    pub fn position(&self, tx_hash: &Hash) -> Option<usize> {
        self.tx_positions.get(tx_hash).copied()
    }

    /// Whether two transactions of the block share a hash.
    pub fn duplicate_tx(&self) -> Option<Hash> {
        if self.tx_positions.len() == self.tx_hashes.len() {
            return None;
        }
        self.tx_hashes.iter().enumerate().find(|(index, hash)| self.tx_positions[*hash] != *index).map(|(_, hash)| *hash)
    }

    fn reject(&self, violation: RuleViolation) -> ConsensusError {
        ConsensusError::validation(self.block_hash, violation)
    }
}

/// Transaction validator for consensus rules
pub struct TransactionValidator {
    script_verifier: Arc<dyn ScriptVerifier>,
    ignore_script_errors: bool,
}

impl TransactionValidator {
    pub fn new(script_verifier: Arc<dyn ScriptVerifier>, config: &RulesConfig) -> Self {
        Self { script_verifier, ignore_script_errors: config.ignore_script_errors }
    }

    /// Validates the non-coinbase transaction at `tx_index` and returns its fee.
    pub fn validate_transaction<V: UtxoView + ?Sized>(
        &self,
        ctx: &BlockContext<'_>,
        tx_index: usize,
        view: &V,
    ) -> ConsensusResult<u64> {
        let tx = &ctx.block.transactions[tx_index];
        let tx_hash = ctx.tx_hashes[tx_index];

        let mut input_value = 0u64;
        for (input_index, input) in tx.inputs.iter().enumerate() {
            let previous = self.lookup_previous_output(ctx, tx_index, &input.previous_output, view)?;
            input_value = input_value
                .checked_add(previous.value)
                .ok_or_else(|| ctx.reject(RuleViolation::ValueOverflow { tx: tx_hash }))?;

            let mut script = Vec::with_capacity(input.script_signature.len() + previous.script_public_key.len());
            script.extend_from_slice(&input.script_signature);
            script.extend_from_slice(&previous.script_public_key);
            if !self.script_verifier.verify(&script, tx, input_index) {
                if !self.ignore_script_errors {
                    return Err(ctx.reject(RuleViolation::ScriptVerificationFailed { tx: tx_hash, input_index }));
                }
                debug!("Ignoring script failure for input {} of transaction {}", input_index, tx_hash);
            }
        }

        let output_value = tx.output_value().ok_or_else(|| ctx.reject(RuleViolation::ValueOverflow { tx: tx_hash }))?;
        if output_value > input_value {
            return Err(ctx.reject(RuleViolation::OutputsExceedInputs { tx: tx_hash, input_value, output_value }));
        }
        Ok(input_value - output_value)
    }

    /// Resolves `key` from the UTXO view, then from transactions earlier in the block.
    fn lookup_previous_output<'v, V: UtxoView + ?Sized>(
        &self,
        ctx: &BlockContext<'v>,
        tx_index: usize,
        key: &TxOutputKey,
        view: &'v V,
    ) -> ConsensusResult<&'v TxOutput> {
        if let Some(output) = view.try_get_output(key) {
            return Ok(output);
        }

        let tx = ctx.tx_hashes[tx_index];
        match ctx.position(&key.tx_hash) {
            Some(position) if position < tx_index => ctx.block.transactions[position]
                .outputs
                .get(key.output_index as usize)
                .ok_or_else(|| ctx.reject(RuleViolation::OutputIndexOutOfRange { tx, key: *key })),
            Some(_) => Err(ctx.reject(RuleViolation::SpendsLaterTransaction { tx, key: *key })),
            None => Err(ctx.reject(RuleViolation::MissingPreviousOutput { tx, key: *key })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{coinbase_key, spend, TestChainBuilder};
    use consensus_core::tx::Transaction;
    use consensus_core::utxo::UtxoSet;

    struct RejectAll;

    impl ScriptVerifier for RejectAll {
        fn verify(&self, _script: &[u8], _tx: &Transaction, _input_index: usize) -> bool {
            false
        }
    }

    struct ExpectScript(Vec<u8>);

    impl ScriptVerifier for ExpectScript {
        fn verify(&self, script: &[u8], _tx: &Transaction, _input_index: usize) -> bool {
            script == self.0.as_slice()
        }
    }

    fn create_test_validator() -> TransactionValidator {
        TransactionValidator::new(Arc::new(consensus_core::api::AcceptAllScripts), &RulesConfig::default())
    }

    /// UTXO set holding the coinbase of one mined block, plus a block spending from it.
    fn funded_set(chain: &mut TestChainBuilder) -> (UtxoSet, TxOutputKey) {
        let genesis = chain.genesis.clone();
        let (funding, _) = chain.mine_on(&genesis, vec![]);
        let mut set = UtxoSet::new();
        set.apply_block(&funding).unwrap();
        (set, coinbase_key(&funding))
    }

    #[test]
    fn test_fee_is_unspent_remainder() {
        let mut chain = TestChainBuilder::regtest();
        let (set, key) = funded_set(&mut chain);
        let genesis = chain.genesis.clone();
        let (block, _) = chain.mine_on(&genesis, vec![spend(&[key], &[40 * 100_000_000])]);

        let fee = create_test_validator().validate_transaction(&BlockContext::new(&block), 1, &set).unwrap();
        assert_eq!(fee, 10 * 100_000_000);
    }

    #[test]
    fn test_outputs_exceeding_inputs_rejected() {
        let mut chain = TestChainBuilder::regtest();
        let (set, key) = funded_set(&mut chain);
        let genesis = chain.genesis.clone();
        let (block, _) = chain.mine_on(&genesis, vec![spend(&[key], &[51 * 100_000_000])]);

        let err = create_test_validator().validate_transaction(&BlockContext::new(&block), 1, &set).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Validation { violation: RuleViolation::OutputsExceedInputs { .. }, .. }
        ));
    }

    #[test]
    fn test_spend_of_earlier_same_block_transaction() {
        let mut chain = TestChainBuilder::regtest();
        let (set, key) = funded_set(&mut chain);
        let first = spend(&[key], &[30, 20]);
        let second = spend(&[TxOutputKey::new(first.hash(), 1)], &[15]);
        let genesis = chain.genesis.clone();
        let (block, _) = chain.mine_on(&genesis, vec![first, second]);

        let ctx = BlockContext::new(&block);
        assert_eq!(create_test_validator().validate_transaction(&ctx, 2, &set).unwrap(), 5);
    }

    #[test]
    fn test_spend_of_later_same_block_transaction_rejected() {
        let mut chain = TestChainBuilder::regtest();
        let (set, key) = funded_set(&mut chain);
        let later = spend(&[key], &[30]);
        let early = spend(&[TxOutputKey::new(later.hash(), 0)], &[10]);
        let genesis = chain.genesis.clone();
        let (block, _) = chain.mine_on(&genesis, vec![early, later]);

        let err = create_test_validator().validate_transaction(&BlockContext::new(&block), 1, &set).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Validation { violation: RuleViolation::SpendsLaterTransaction { .. }, .. }
        ));
    }

    #[test]
    fn test_same_block_output_index_out_of_range() {
        let mut chain = TestChainBuilder::regtest();
        let (set, key) = funded_set(&mut chain);
        let first = spend(&[key], &[30]);
        let second = spend(&[TxOutputKey::new(first.hash(), 4)], &[10]);
        let genesis = chain.genesis.clone();
        let (block, _) = chain.mine_on(&genesis, vec![first, second]);

        let err = create_test_validator().validate_transaction(&BlockContext::new(&block), 2, &set).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Validation { violation: RuleViolation::OutputIndexOutOfRange { .. }, .. }
        ));
    }

    #[test]
    fn test_unknown_output_rejected() {
        let mut chain = TestChainBuilder::regtest();
        let genesis = chain.genesis.clone();
        let missing = TxOutputKey::new(Hash::from_u64_word(77), 0);
        let (block, _) = chain.mine_on(&genesis, vec![spend(&[missing], &[1])]);

        let err = create_test_validator()
            .validate_transaction(&BlockContext::new(&block), 1, &UtxoSet::new())
            .unwrap_err();
        assert_eq!(err.block(), Some(block.hash()));
        assert!(matches!(
            err,
            ConsensusError::Validation { violation: RuleViolation::MissingPreviousOutput { .. }, .. }
        ));
    }

    #[test]
    fn test_script_failure_rejected_unless_ignored() {
        let mut chain = TestChainBuilder::regtest();
        let (set, key) = funded_set(&mut chain);
        let genesis = chain.genesis.clone();
        let (block, _) = chain.mine_on(&genesis, vec![spend(&[key], &[1])]);
        let ctx = BlockContext::new(&block);

        let strict = TransactionValidator::new(Arc::new(RejectAll), &RulesConfig::default());
        assert!(matches!(
            strict.validate_transaction(&ctx, 1, &set).unwrap_err(),
            ConsensusError::Validation { violation: RuleViolation::ScriptVerificationFailed { input_index: 0, .. }, .. }
        ));

        let lenient = TransactionValidator::new(
            Arc::new(RejectAll),
            &RulesConfig { ignore_script_errors: true, ..Default::default() },
        );
        assert!(lenient.validate_transaction(&ctx, 1, &set).is_ok());
    }

    #[test]
    fn test_verifier_sees_signature_then_public_key() {
        let mut chain = TestChainBuilder::regtest();
        let (set, key) = funded_set(&mut chain);
        let genesis = chain.genesis.clone();
        let (block, _) = chain.mine_on(&genesis, vec![spend(&[key], &[1])]);

        // testkit signs with 0x01 and pays to 0x51
        let validator = TransactionValidator::new(Arc::new(ExpectScript(vec![0x01, 0x51])), &RulesConfig::default());
        assert!(validator.validate_transaction(&BlockContext::new(&block), 1, &set).is_ok());
    }
}
