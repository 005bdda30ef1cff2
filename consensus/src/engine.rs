//! Wires the header graph, the chain selector and the chain-state transition
//! into one running component.
//!
//! New headers wake the selector; a new target chain wakes the transition.
//! Queries read the published snapshots and never wait for a run to finish.

use std::sync::Arc;

use consensus_core::api::{BlockProvider, HeaderGraphStore, ScriptVerifier, UndoStore};
use consensus_core::chain::Chain;
use consensus_core::config::Params;
use consensus_core::errors::{ConsensusError, ConsensusResult};
use consensus_core::observers::ObserverHandle;
use consensus_core::tx::{TxOutput, TxOutputKey};
use consensus_core::utxo::{UnspentTx, UtxoView};
use consensus_core::{ChainedHeader, Hash, Header};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};

use crate::config::ConsensusConfig;
use crate::consensus::rules::ConsensusRules;
use crate::consensus::state::ChainState;
use crate::pipeline::{
    BlockRejected, ChainSelector, ChainStateChanged, ChainStateTransition, FailureFlag, TargetChainChanged,
    TransitionPhase, Worker,
};

const EVENT_CAPACITY: usize = 256;

struct Running {
    selector: Worker,
    transition: Worker,
    _observers: Vec<ObserverHandle>,
}

pub struct ConsensusEngine {
    config: ConsensusConfig,
    rules: Arc<ConsensusRules>,
    headers: Arc<dyn HeaderGraphStore>,
    selector: Arc<ChainSelector>,
    transition: Arc<ChainStateTransition>,
    target_chain_tx: broadcast::Sender<TargetChainChanged>,
    chain_state_tx: broadcast::Sender<ChainStateChanged>,
    rejected_tx: broadcast::Sender<BlockRejected>,
    failure: FailureFlag,
    running: Mutex<Option<Running>>,
}

impl ConsensusEngine {
    /// Engine starting from genesis. Stores genesis in `headers`.
    pub fn new(
        config: ConsensusConfig,
        params: Params,
        headers: Arc<dyn HeaderGraphStore>,
        blocks: Arc<dyn BlockProvider>,
        undo: Arc<dyn UndoStore>,
        script_verifier: Arc<dyn ScriptVerifier>,
    ) -> ConsensusResult<Self> {
        let genesis = params.genesis_chained_header()?;
        Self::with_chain_state(config, params, headers, blocks, undo, script_verifier, ChainState::from_genesis(genesis))
    }

    /// Engine resuming from a previously persisted chain state.
    pub fn with_chain_state(
        config: ConsensusConfig,
        params: Params,
        headers: Arc<dyn HeaderGraphStore>,
        blocks: Arc<dyn BlockProvider>,
        undo: Arc<dyn UndoStore>,
        script_verifier: Arc<dyn ScriptVerifier>,
        state: ChainState,
    ) -> ConsensusResult<Self> {
        let rules = Arc::new(ConsensusRules::new(params, config.rules.clone(), script_verifier)?);
        if state.chain().genesis().hash != rules.genesis().hash {
            return Err(ConsensusError::InvalidChain(format!(
                "chain state starts at {}, expected genesis {}",
                state.chain().genesis().hash,
                rules.genesis().hash
            )));
        }
        headers.put(rules.genesis().clone())?;

        let selector = Arc::new(ChainSelector::new(headers.clone(), rules.genesis().clone()));
        let transition = Arc::new(ChainStateTransition::new(rules.clone(), blocks, undo, state));
        let (target_chain_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (chain_state_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (rejected_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            config,
            rules,
            headers,
            selector,
            transition,
            target_chain_tx,
            chain_state_tx,
            rejected_tx,
            failure: FailureFlag::new(),
            running: Mutex::new(None),
        })
    }

    /// Spawns both workers on the current tokio runtime.
    ///
    /// Observers are wired before either worker can run, so no target change
    /// is missed.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("Consensus engine already running");
            return;
        }
        if let Some(err) = self.failure.error() {
            warn!("Consensus engine not restarted after fatal error: {}", err);
            return;
        }

        let selector_notify = Arc::new(Notify::new());
        let transition_notify = Arc::new(Notify::new());
        let observers = self.register_observers(selector_notify.clone(), transition_notify.clone());

        let seeded = match self.selector.target_chain() {
            Some(target) => {
                self.transition.set_target(target);
                true
            }
            None => false,
        };

        let selector = Worker::start_with(
            self.selector.clone(),
            self.config.selector.clone(),
            selector_notify,
            self.failure.clone(),
        );
        let transition = Worker::start_with(
            self.transition.clone(),
            self.config.transition.clone(),
            transition_notify,
            self.failure.clone(),
        );
        if seeded {
            transition.notify_work();
        }

        info!("Consensus engine started on {}", self.rules.params().network);
        *running = Some(Running { selector, transition, _observers: observers });
    }

    fn register_observers(&self, selector_notify: Arc<Notify>, transition_notify: Arc<Notify>) -> Vec<ObserverHandle> {
        let target_worker = self.transition.clone();
        let target_tx = self.target_chain_tx.clone();
        let state_tx = self.chain_state_tx.clone();
        let rejected_tx = self.rejected_tx.clone();

        vec![
            self.headers.observers().register(move |_| selector_notify.notify_one()),
            self.selector.observers().register(move |event: &TargetChainChanged| {
                target_worker.set_target(event.target_chain.clone());
                transition_notify.notify_one();
                let _ = target_tx.send(event.clone());
            }),
            self.transition.state_observers().register(move |event: &ChainStateChanged| {
                let _ = state_tx.send(event.clone());
            }),
            self.transition.rejection_observers().register(move |event: &BlockRejected| {
                let _ = rejected_tx.send(event.clone());
            }),
        ]
    }

    /// Stops both workers, waiting for runs in progress to finish.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        let Running { selector, transition, _observers: observers } = running;
        drop(observers);
        selector.stop().await;
        transition.stop().await;
        info!("Consensus engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// The fatal error that halted the workers, if any. Queries keep serving
    /// the last published snapshots; mutations are refused.
    pub fn failure(&self) -> Option<ConsensusError> {
        self.failure.error()
    }

    fn ensure_healthy(&self) -> ConsensusResult<()> {
        match self.failure.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Chains `header` onto its stored parent and adds it to the header graph.
    pub fn add_header(&self, header: &Header) -> ConsensusResult<ChainedHeader> {
        self.ensure_healthy()?;
        let parent = self
            .headers
            .get(&header.previous_block)?
            .ok_or(ConsensusError::MissingData(header.previous_block))?;
        let chained = parent.extend(header)?;
        self.headers.put(chained.clone())?;
        Ok(chained)
    }

    /// Wakes the transition after new block bodies were stored.
    pub fn notify_blocks_available(&self) {
        if let Some(running) = self.running.lock().as_ref() {
            running.transition.notify_work();
        }
    }

    /// Excludes `hash` and its descendants from chain selection.
    pub fn mark_block_invalid(&self, hash: &Hash) -> ConsensusResult<()> {
        self.ensure_healthy()?;
        self.headers.mark_invalid(hash)?;
        if let Some(running) = self.running.lock().as_ref() {
            running.selector.notify_work();
        }
        Ok(())
    }

    pub fn subscribe_target_chain(&self) -> broadcast::Receiver<TargetChainChanged> {
        self.target_chain_tx.subscribe()
    }

    pub fn subscribe_chain_state(&self) -> broadcast::Receiver<ChainStateChanged> {
        self.chain_state_tx.subscribe()
    }

    pub fn subscribe_rejections(&self) -> broadcast::Receiver<BlockRejected> {
        self.rejected_tx.subscribe()
    }

    pub fn rules(&self) -> &Arc<ConsensusRules> {
        &self.rules
    }

    pub fn selector(&self) -> &Arc<ChainSelector> {
        &self.selector
    }

    pub fn transition(&self) -> &Arc<ChainStateTransition> {
        &self.transition
    }

    pub fn current_chain(&self) -> Arc<Chain> {
        self.transition.current_chain()
    }

    pub fn target_chain(&self) -> Option<Arc<Chain>> {
        self.selector.target_chain()
    }

    pub fn target_block(&self) -> Option<ChainedHeader> {
        self.selector.target_block()
    }

    pub fn chain_state(&self) -> Arc<ChainState> {
        self.transition.chain_state()
    }

    pub fn transition_phase(&self) -> TransitionPhase {
        self.transition.phase()
    }

    pub fn try_get_output(&self, key: &TxOutputKey) -> Option<TxOutput> {
        self.chain_state().try_get_output(key).cloned()
    }

    pub fn try_get_unspent_tx(&self, tx_hash: &Hash) -> Option<UnspentTx> {
        self.chain_state().try_get_unspent_tx(tx_hash).cloned()
    }
}

/// Rebuilds the chain ending at `tip` from the header graph.
pub fn load_chain(headers: &dyn HeaderGraphStore, tip: Hash) -> ConsensusResult<Chain> {
    let mut blocks = Vec::new();
    let mut cursor = headers.get(&tip)?.ok_or(ConsensusError::MissingData(tip))?;
    while cursor.height > 0 {
        let previous = cursor.previous_block_hash;
        blocks.push(cursor);
        cursor = headers.get(&previous)?.ok_or(ConsensusError::MissingData(previous))?;
    }
    blocks.push(cursor);
    blocks.reverse();
    Chain::new(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::consensus::storage::{MemoryBlockStore, MemoryHeaderStore, MemoryUndoStore};
    use crate::pipeline::CancelToken;
    use crate::testkit::{coinbase_key, spend, TestChainBuilder};
    use consensus_core::api::AcceptAllScripts;
    use consensus_core::Block;
    use std::time::Duration;

    const COIN: u64 = 100_000_000;

    struct Fixture {
        chain: TestChainBuilder,
        headers: Arc<MemoryHeaderStore>,
        blocks: Arc<MemoryBlockStore>,
        undo: Arc<MemoryUndoStore>,
        engine: ConsensusEngine,
    }

    fn create_test_engine() -> Fixture {
        create_test_engine_with(WorkerConfig { initial_notify: true, min_idle_time_ms: 0, max_idle_time_ms: Some(1_000) })
    }

    fn create_test_engine_with(worker: WorkerConfig) -> Fixture {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = ConsensusConfig {
            network: "regtest".to_string(),
            selector: worker.clone(),
            transition: worker,
            ..Default::default()
        };
        let chain = TestChainBuilder::regtest();
        let headers = Arc::new(MemoryHeaderStore::new());
        let blocks = Arc::new(MemoryBlockStore::new());
        let undo = Arc::new(MemoryUndoStore::new());
        let engine = ConsensusEngine::new(
            config.clone(),
            config.params().unwrap(),
            headers.clone(),
            blocks.clone(),
            undo.clone(),
            Arc::new(AcceptAllScripts),
        )
        .unwrap();
        Fixture { chain, headers, blocks, undo, engine }
    }

    impl Fixture {
        fn submit(&self, block: &Block) {
            self.blocks.put_block(block.clone());
            self.engine.add_header(&block.header).unwrap();
        }
    }

    async fn wait_for_tip(events: &mut broadcast::Receiver<ChainStateChanged>, tip: Hash) -> ChainStateChanged {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let event = events.recv().await.unwrap();
                if event.tip.hash == tip {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_new_stores_genesis() {
        let fixture = create_test_engine();
        assert!(fixture.headers.contains(&fixture.chain.genesis.hash).unwrap());
        assert_eq!(fixture.engine.current_chain().tip_hash(), fixture.chain.genesis.hash);
        assert!(!fixture.engine.is_running());
    }

    #[test]
    fn test_add_header_needs_parent() {
        let mut fixture = create_test_engine();
        let genesis = fixture.chain.genesis.clone();
        let (_, h1) = fixture.chain.mine_on(&genesis, vec![]);
        let (b2, _) = fixture.chain.mine_on(&h1, vec![]);
        let err = fixture.engine.add_header(&b2.header).unwrap_err();
        assert_eq!(err, ConsensusError::MissingData(h1.hash));
    }

    #[test]
    fn test_resume_rejects_foreign_genesis() {
        let fixture = create_test_engine();
        let mainnet = consensus_core::config::Params::mainnet();
        let foreign = ChainState::from_genesis(mainnet.genesis_chained_header().unwrap());
        let result = ConsensusEngine::with_chain_state(
            ConsensusConfig::default(),
            Params::regtest(),
            fixture.headers.clone(),
            fixture.blocks.clone(),
            Arc::new(MemoryUndoStore::new()),
            Arc::new(AcceptAllScripts),
            foreign,
        );
        assert!(matches!(result, Err(ConsensusError::InvalidChain(_))));
    }

    #[test]
    fn test_load_chain_walks_to_genesis() {
        let mut fixture = create_test_engine();
        let genesis = fixture.chain.genesis.clone();
        let (b1, h1) = fixture.chain.mine_on(&genesis, vec![]);
        let (b2, h2) = fixture.chain.mine_on(&h1, vec![]);
        fixture.submit(&b1);
        fixture.submit(&b2);

        let chain = load_chain(fixture.headers.as_ref(), h2.hash).unwrap();
        assert_eq!(chain.hashes().collect::<Vec<_>>(), vec![genesis.hash, h1.hash, h2.hash]);
        assert!(load_chain(fixture.headers.as_ref(), Hash::from_u64_word(77)).is_err());
    }

    #[tokio::test]
    async fn test_follows_submitted_blocks() {
        let mut fixture = create_test_engine();
        let genesis = fixture.chain.genesis.clone();
        let mut events = fixture.engine.subscribe_chain_state();
        fixture.engine.start();

        let (b1, h1) = fixture.chain.mine_on(&genesis, vec![]);
        let (b2, h2) = fixture.chain.mine_on(&h1, vec![spend(&[coinbase_key(&b1)], &[10 * COIN])]);
        fixture.submit(&b1);
        fixture.submit(&b2);

        let event = wait_for_tip(&mut events, h2.hash).await;
        assert_eq!(event.height, 2);
        assert_eq!(fixture.engine.current_chain().tip_hash(), h2.hash);
        assert_eq!(fixture.engine.target_chain().unwrap().tip_hash(), h2.hash);
        assert!(fixture.engine.try_get_output(&coinbase_key(&b1)).is_none());
        assert_eq!(fixture.engine.try_get_output(&TxOutputKey::new(b2.transactions[1].hash(), 0)).unwrap().value, 10 * COIN);
        assert!(fixture.engine.try_get_unspent_tx(&b2.transactions[0].hash()).is_some());

        fixture.engine.stop().await;
        assert!(!fixture.engine.is_running());
    }

    #[tokio::test]
    async fn test_reorgs_to_heavier_branch() {
        let mut fixture = create_test_engine();
        let genesis = fixture.chain.genesis.clone();
        let mut events = fixture.engine.subscribe_chain_state();
        fixture.engine.start();

        let (b1, h1) = fixture.chain.mine_on(&genesis, vec![]);
        let (a2, ha2) = fixture.chain.mine_on(&h1, vec![]);
        let (a3, ha3) = fixture.chain.mine_on(&ha2, vec![]);
        for block in [&b1, &a2, &a3] {
            fixture.submit(block);
        }
        wait_for_tip(&mut events, ha3.hash).await;

        let subsidy = fixture.chain.params.block_subsidy(2);
        let (b2, hb2) = fixture.chain.mine_with(&h1, vec![], 0x2000ffff, subsidy);
        fixture.submit(&b2);

        let event = wait_for_tip(&mut events, hb2.hash).await;
        assert_eq!(event.delta.blocks_rolled_back, 2);
        assert_eq!(event.delta.blocks_applied, 1);
        assert!(fixture.engine.try_get_unspent_tx(&a2.transactions[0].hash()).is_none());

        fixture.engine.stop().await;
    }

    #[tokio::test]
    async fn test_rejected_block_is_broadcast() {
        let mut fixture = create_test_engine();
        let genesis = fixture.chain.genesis.clone();
        let mut rejections = fixture.engine.subscribe_rejections();
        fixture.engine.start();

        let (bad, h1) = fixture.chain.mine_with(&genesis, vec![], genesis.bits, 50 * COIN + 1);
        fixture.submit(&bad);

        let rejected = tokio::time::timeout(Duration::from_secs(10), rejections.recv()).await.unwrap().unwrap();
        assert_eq!(rejected.block, h1.hash);
        assert!(rejected.error.is_validation());
        assert_eq!(fixture.engine.current_chain().tip_hash(), genesis.hash);

        fixture.engine.stop().await;
    }

    #[tokio::test]
    async fn test_late_block_body_is_picked_up() {
        let mut fixture = create_test_engine();
        let genesis = fixture.chain.genesis.clone();
        let mut events = fixture.engine.subscribe_chain_state();
        let mut targets = fixture.engine.subscribe_target_chain();
        fixture.engine.start();

        let (b1, h1) = fixture.chain.mine_on(&genesis, vec![]);
        fixture.engine.add_header(&b1.header).unwrap();
        tokio::time::timeout(Duration::from_secs(10), async {
            while targets.recv().await.unwrap().target_block.hash != h1.hash {}
        })
        .await
        .unwrap();

        fixture.blocks.put_block(b1);
        fixture.engine.notify_blocks_available();
        wait_for_tip(&mut events, h1.hash).await;

        fixture.engine.stop().await;
    }

    #[tokio::test]
    async fn test_start_picks_up_target_selected_before_start() {
        let idle = WorkerConfig { initial_notify: false, min_idle_time_ms: 0, max_idle_time_ms: None };
        let mut fixture = create_test_engine_with(idle);
        let genesis = fixture.chain.genesis.clone();
        let (b1, h1) = fixture.chain.mine_on(&genesis, vec![]);
        let (b2, h2) = fixture.chain.mine_on(&h1, vec![]);
        fixture.submit(&b1);
        fixture.submit(&b2);

        // the change event fires with nobody listening
        fixture.engine.selector().update_target_chain(&CancelToken::new()).unwrap();
        assert_eq!(fixture.engine.target_chain().unwrap().tip_hash(), h2.hash);

        let mut events = fixture.engine.subscribe_chain_state();
        fixture.engine.start();
        let event = wait_for_tip(&mut events, h2.hash).await;
        assert_eq!(event.height, 2);

        fixture.engine.stop().await;
    }

    #[tokio::test]
    async fn test_fatal_error_halts_engine() {
        let mut fixture = create_test_engine();
        let genesis = fixture.chain.genesis.clone();
        let mut events = fixture.engine.subscribe_chain_state();
        fixture.engine.start();

        let (b1, h1) = fixture.chain.mine_on(&genesis, vec![]);
        let (a2, ha2) = fixture.chain.mine_on(&h1, vec![]);
        fixture.submit(&b1);
        fixture.submit(&a2);
        wait_for_tip(&mut events, ha2.hash).await;
        assert_eq!(fixture.engine.failure(), None);

        fixture.undo.remove_undo(&ha2.hash).unwrap();
        let subsidy = fixture.chain.params.block_subsidy(2);
        let (b2, _) = fixture.chain.mine_with(&h1, vec![], 0x2000ffff, subsidy);
        fixture.submit(&b2);

        tokio::time::timeout(Duration::from_secs(10), async {
            while fixture.engine.failure().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let failure = fixture.engine.failure().unwrap();
        assert!(failure.is_fatal());
        assert_eq!(fixture.engine.current_chain().tip_hash(), ha2.hash);
        let (b3, _) = fixture.chain.mine_on(&ha2, vec![]);
        assert_eq!(fixture.engine.add_header(&b3.header), Err(failure.clone()));
        assert_eq!(fixture.engine.mark_block_invalid(&ha2.hash), Err(failure));

        fixture.engine.stop().await;
        fixture.engine.start();
        assert!(!fixture.engine.is_running());
    }
}
