use std::{collections::BTreeMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::debug;
use trellis_circuit_prover::{NativeCircuitProver, ProverError};
use trellis_config::{proving::BrokerConfig, OrchestratorConfig};
use trellis_orchestrator::{spawn_orchestrator, ProvingOrchestrator};
use trellis_primitives::{
    block::BlockHeader,
    jobs::{ProvingJobKind, ProvingRequest},
    state::MerkleTreeId,
};
use trellis_proving_broker::{ProvingAgent, ProvingBroker};
use trellis_tasks::{AbortSignal, TaskManager};
use trellis_test_utils::fixtures::{genesis_header, FixtureBuilder};
use trellis_world_state::InMemoryWorldState;

pub(crate) const TREE_HEIGHT: u8 = 12;

/// Decides whether a request should fail, and how.
pub(crate) type Injector = Box<dyn Fn(&ProvingRequest) -> Option<ProverError> + Send + Sync>;

/// Options for [`TestNode::start`].
pub(crate) struct NodeOptions {
    pub(crate) agents: usize,
    pub(crate) prover_delay: Duration,
    pub(crate) broker: BrokerConfig,
    pub(crate) injector: Option<Injector>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            agents: 3,
            prover_delay: Duration::ZERO,
            broker: BrokerConfig {
                retry_total_time_ms: 200,
                ..Default::default()
            },
            injector: None,
        }
    }
}

/// Orchestrator, broker and agents running on the current runtime.
pub(crate) struct TestNode {
    _manager: TaskManager,
    pub(crate) broker: Arc<ProvingBroker>,
    pub(crate) world_state: Arc<InMemoryWorldState>,
    pub(crate) orchestrator: ProvingOrchestrator,
    pub(crate) abort: AbortSignal,
    fixtures: FixtureBuilder,
    proved: Arc<Mutex<BTreeMap<ProvingJobKind, usize>>>,
}

impl TestNode {
    pub(crate) fn start(opts: NodeOptions) -> Self {
        let manager = TaskManager::new(Handle::current());
        let executor = manager.executor();

        let world_state = Arc::new(InMemoryWorldState::new(TREE_HEIGHT).unwrap());
        world_state
            .append_leaves(MerkleTreeId::Archive, &[genesis_header().hash()])
            .unwrap();
        let broker = Arc::new(ProvingBroker::new(&opts.broker));

        // the hook sees every attempt, so it doubles as a tally of proved kinds
        let proved = Arc::new(Mutex::new(BTreeMap::new()));
        let tally = proved.clone();
        let injector = opts.injector;
        let prover = NativeCircuitProver::new(opts.prover_delay).with_failure_hook(Arc::new(
            move |request: &ProvingRequest| {
                if let Some(err) = injector.as_ref().and_then(|f| f(request)) {
                    return Some(err);
                }
                *tally.lock().entry(request.kind()).or_insert(0) += 1;
                None
            },
        ));
        let prover = Arc::new(prover);

        let abort = AbortSignal::new();
        for id in 0..opts.agents {
            let agent = ProvingAgent::new(id, broker.clone(), prover.clone(), vec![]);
            executor.spawn_critical_async("proving-agent", agent.run(abort.clone()));
        }

        let orchestrator = spawn_orchestrator(
            &executor,
            &OrchestratorConfig::default(),
            broker.clone(),
            world_state.clone(),
        );

        Self {
            _manager: manager,
            broker,
            world_state,
            orchestrator,
            abort,
            fixtures: FixtureBuilder::default(),
            proved,
        }
    }

    /// Submits a full block of `num_txs` txs, updates world state as a sequencer would and
    /// returns the block header.
    pub(crate) async fn submit_block(
        &mut self,
        number: u32,
        previous: &BlockHeader,
        num_txs: usize,
    ) -> BlockHeader {
        let gv = self.fixtures.global_variables(number);
        let messages = self.fixtures.messages(2);
        let txs = self.fixtures.txs(num_txs);

        self.orchestrator
            .start_new_block(gv, messages.clone(), previous, num_txs)
            .await
            .unwrap();
        self.orchestrator.add_txs(txs.clone()).await.unwrap();

        self.world_state
            .append_leaves(MerkleTreeId::L1ToL2Message, &messages)
            .unwrap();
        let notes: Vec<_> = txs.iter().flat_map(|tx| tx.note_hashes.clone()).collect();
        self.world_state
            .append_leaves(MerkleTreeId::NoteHash, &notes)
            .unwrap();

        let header = self.orchestrator.set_block_completed(number).await.unwrap();
        self.world_state
            .append_leaves(MerkleTreeId::Archive, &[header.hash()])
            .unwrap();
        debug!(block = number, txs = num_txs, "submitted block");
        header
    }

    /// How many proofs of `kind` the agents produced.
    pub(crate) fn proved(&self, kind: ProvingJobKind) -> usize {
        self.proved.lock().get(&kind).copied().unwrap_or(0)
    }
}

/// Fails every request of `kind` with a non-retriable error.
pub(crate) fn fail_kind(kind: ProvingJobKind) -> Injector {
    Box::new(move |request: &ProvingRequest| {
        (request.kind() == kind).then(|| ProverError::ProofGeneration(format!("{kind} is broken")))
    })
}
