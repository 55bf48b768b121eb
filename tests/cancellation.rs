//! Stopping epochs before their proof arrives.

use std::time::Duration;

use common::node::{NodeOptions, TestNode};
use trellis_orchestrator::{EpochError, EpochStatus, OrchestratorError};
use trellis_primitives::jobs::ProvingJobKind;
use trellis_tasks::AbortSignal;
use trellis_test_utils::fixtures::genesis_header;

mod common;

fn slow_node(agents: usize) -> TestNode {
    TestNode::start(NodeOptions {
        agents,
        prover_delay: Duration::from_millis(200),
        ..Default::default()
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abort_rejects_epoch_and_drains_queue() {
    let mut node = slow_node(1);
    node.orchestrator.start_new_epoch(1, 1, 1).await.unwrap();
    node.submit_block(1, &genesis_header(), 4).await;

    let abort = AbortSignal::new();
    let trigger = abort.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.abort();
    });

    let res = node.orchestrator.finalise_epoch(&abort).await;
    assert!(matches!(
        res,
        Err(OrchestratorError::Epoch(EpochError::Aborted))
    ));
    assert_eq!(node.proved(ProvingJobKind::RootRollup), 0);

    let status = node.orchestrator.status().await.unwrap().unwrap();
    assert_eq!(status.status, EpochStatus::Rejected);
    assert_eq!(node.broker.report().await.queued, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_then_prove_next_epoch() {
    let mut node = slow_node(2);
    let cancelled = node.orchestrator.start_new_epoch(1, 1, 1).await.unwrap();
    node.submit_block(1, &genesis_header(), 2).await;

    assert_eq!(node.orchestrator.cancel().await.unwrap(), Some(cancelled));
    let status = node.orchestrator.status().await.unwrap().unwrap();
    assert_eq!(status.status, EpochStatus::Cancelled);
    assert!(matches!(
        node.orchestrator.finalise_epoch(&node.abort).await,
        Err(OrchestratorError::Epoch(EpochError::Cancelled))
    ));

    // outcomes of the cancelled epoch's jobs still trickle in and must be ignored
    let live = node.orchestrator.start_new_epoch(1, 1, 1).await.unwrap();
    assert!(live > cancelled);
    node.submit_block(1, &genesis_header(), 1).await;

    let proof = tokio::time::timeout(
        Duration::from_secs(20),
        node.orchestrator.finalise_epoch(&node.abort),
    )
    .await
    .expect("epoch should be proved")
    .unwrap();
    assert_eq!(proof.epoch_number, 1);

    let status = node.orchestrator.status().await.unwrap().unwrap();
    assert_eq!(status.id, live);
    assert_eq!(status.status, EpochStatus::Resolved);
}
