use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use args::{get_config, Args};
use synthetic::{apply_block_effects, archive_header, SyntheticChain};
use tokio::runtime;
use tracing::*;
use trellis_circuit_prover::NativeCircuitProver;
use trellis_common::logging;
use trellis_config::Config;
use trellis_orchestrator::{spawn_orchestrator, ProvingOrchestrator};
use trellis_primitives::epoch::EpochProof;
use trellis_proving_broker::{ProvingAgent, ProvingBroker};
use trellis_tasks::{set_panic_hook, AbortSignal, TaskManager};
use trellis_world_state::InMemoryWorldState;

mod args;
mod errors;
mod synthetic;

fn main() {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e}");

        std::process::exit(1);
    }
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    let config = get_config(&args)?;

    if args.blocks == 0 {
        return Err(anyhow!("an epoch needs at least one block"));
    }

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("trellis-rt")
        .build()
        .context("failed to build runtime")?;

    init_logging(&runtime)?;
    set_panic_hook();

    let task_manager = TaskManager::new(runtime.handle().clone());
    let executor = task_manager.executor();

    let world_state = Arc::new(InMemoryWorldState::new(config.world_state.tree_height)?);
    let broker = Arc::new(ProvingBroker::new(&config.broker));
    let prover = Arc::new(NativeCircuitProver::new(Duration::from_millis(
        config.prover.simulated_delay_ms,
    )));

    let abort = AbortSignal::new();
    for id in 0..config.agents.count {
        let agent = ProvingAgent::new(
            id,
            broker.clone(),
            prover.clone(),
            config.agents.kinds.clone(),
        );
        executor.spawn_critical_async("proving-agent", agent.run(abort.clone()));
    }

    // shutdown (signal or panicked task) stops the epoch in flight
    let forward = abort.clone();
    executor.spawn_critical_async_with_shutdown("abort-forwarder", |shutdown| async move {
        shutdown.wait_for_shutdown().await;
        forward.abort();
    });

    let orchestrator = spawn_orchestrator(
        &executor,
        &config.orchestrator,
        broker.clone(),
        world_state.clone(),
    )
    .with_epoch_timeout(config.orchestrator.epoch_timeout());

    task_manager.start_signal_listeners();

    let res = runtime.block_on(drive_epoch(
        &args,
        &config,
        &orchestrator,
        &world_state,
        &abort,
    ));

    runtime.block_on(async {
        info!(report = ?broker.report().await, "proving broker drained");
        broker.close().await;
    });

    task_manager.shutdown_signal().send();
    let monitored = task_manager.monitor(Some(Duration::from_secs(5)));
    logging::finalize();
    monitored?;

    let proof = res?;
    println!("{}", serde_json::to_string_pretty(&proof)?);
    Ok(())
}

fn init_logging(rt: &runtime::Runtime) -> anyhow::Result<()> {
    let mut lconfig = logging::LoggerConfig::with_base_name("trellis-prover-node");

    // Set the OpenTelemetry URL if set.
    let otlp_url = logging::get_otlp_url_from_env();
    if let Some(url) = &otlp_url {
        lconfig.set_otlp_url(url.clone());
    }

    {
        // Need to set the runtime context because of nonsense.
        let _g = rt.enter();
        logging::init(lconfig)?;
    }

    // Have to log this after we start the logging formally.
    if let Some(url) = &otlp_url {
        info!(%url, "using OpenTelemetry tracing output");
    }

    Ok(())
}

/// Feeds a synthetic epoch through the orchestrator and waits for its proof.
async fn drive_epoch(
    args: &Args,
    config: &Config,
    orchestrator: &ProvingOrchestrator,
    world_state: &InMemoryWorldState,
    abort: &AbortSignal,
) -> anyhow::Result<EpochProof> {
    let mut chain = SyntheticChain::new(args.seed);
    let first_block = 1;
    let mut previous = chain.genesis_header(first_block - 1);
    archive_header(world_state, &previous)?;

    let generation = orchestrator
        .start_new_epoch(args.epoch, first_block, args.blocks)
        .await?;
    info!(epoch = args.epoch, %generation, blocks = args.blocks, agents = config.agents.count, "proving epoch");

    for offset in 0..args.blocks as u32 {
        let block = chain.next_block(first_block + offset, args.txs_per_block);
        let number = block.block_number();

        orchestrator
            .start_new_block(
                block.global_variables.clone(),
                block.l1_to_l2_messages.clone(),
                &previous,
                block.txs.len(),
            )
            .await?;
        orchestrator.add_txs(block.txs.clone()).await?;
        apply_block_effects(world_state, &block)?;

        let header = orchestrator.set_block_completed(number).await?;
        archive_header(world_state, &header)?;
        debug!(block = number, txs = block.txs.len(), "block handed to orchestrator");
        previous = header;
    }

    let proof = orchestrator.finalise_epoch(abort).await?;
    info!(epoch = proof.epoch_number, "epoch proved");
    Ok(proof)
}
