//! Proves whole epochs through the running orchestrator, broker and agent pool.

use std::time::Duration;

use common::node::{NodeOptions, TestNode};
use trellis_orchestrator::EpochStatus;
use trellis_primitives::jobs::ProvingJobKind;
use trellis_test_utils::fixtures::genesis_header;

mod common;

const PROOF_DEADLINE: Duration = Duration::from_secs(20);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_block_epoch() {
    let mut node = TestNode::start(NodeOptions::default());
    node.orchestrator.start_new_epoch(1, 1, 1).await.unwrap();
    let header = node.submit_block(1, &genesis_header(), 0).await;
    assert_eq!(header.total_fees, 0);

    let proof = tokio::time::timeout(PROOF_DEADLINE, node.orchestrator.finalise_epoch(&node.abort))
        .await
        .expect("epoch should be proved")
        .unwrap();
    assert_eq!(proof.epoch_number, 1);
    assert_eq!(proof.public_inputs.fees.len(), 1);

    // one real block is padded up to a pair
    assert_eq!(node.proved(ProvingJobKind::BlockRoot), 1);
    assert_eq!(node.proved(ProvingJobKind::EmptyBlockRoot), 1);
    assert_eq!(node.proved(ProvingJobKind::BlockMerge), 1);
    assert_eq!(node.proved(ProvingJobKind::RootRollup), 1);
    assert_eq!(node.proved(ProvingJobKind::Tube), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_full_blocks() {
    let mut node = TestNode::start(NodeOptions {
        prover_delay: Duration::from_millis(2),
        ..Default::default()
    });
    node.orchestrator.start_new_epoch(5, 1, 2).await.unwrap();
    let first = node.submit_block(1, &genesis_header(), 4).await;
    let second = node.submit_block(2, &first, 4).await;
    assert_eq!(second.last_archive.next_available_leaf_index, 2);

    let proof = tokio::time::timeout(PROOF_DEADLINE, node.orchestrator.finalise_epoch(&node.abort))
        .await
        .expect("epoch should be proved")
        .unwrap();
    let public = &proof.public_inputs;
    assert_eq!(proof.epoch_number, 5);
    assert_eq!(public.start_global_variables.block_number, 1);
    assert_eq!(public.end_global_variables.block_number, 2);
    assert_eq!(public.fees.len(), 2);
    assert_eq!(public.fees[0].value, first.total_fees);
    assert_eq!(public.end_archive.next_available_leaf_index, 3);

    assert_eq!(node.proved(ProvingJobKind::Tube), 8);
    assert_eq!(node.proved(ProvingJobKind::Avm), 4);
    assert_eq!(node.proved(ProvingJobKind::BlockRoot), 2);
    assert_eq!(node.proved(ProvingJobKind::BlockMerge), 1);
    assert_eq!(node.proved(ProvingJobKind::EmptyBlockRoot), 0);
    assert_eq!(node.proved(ProvingJobKind::BaseParity), 2);
    assert_eq!(node.proved(ProvingJobKind::RootParity), 1);
    assert_eq!(node.proved(ProvingJobKind::RootRollup), 1);

    let status = node.orchestrator.status().await.unwrap().unwrap();
    assert_eq!(status.status, EpochStatus::Resolved);
    assert_eq!(status.completed_blocks, 2);
    assert_eq!(status.outstanding_jobs, 0);

    let report = node.broker.report().await;
    assert_eq!(report.queued, 0);
    assert_eq!(report.failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn consecutive_epochs() {
    let mut node = TestNode::start(NodeOptions::default());

    node.orchestrator.start_new_epoch(1, 1, 1).await.unwrap();
    let first = node.submit_block(1, &genesis_header(), 2).await;
    let proof = node.orchestrator.finalise_epoch(&node.abort).await.unwrap();
    assert_eq!(proof.epoch_number, 1);

    let generation = node.orchestrator.start_new_epoch(2, 2, 1).await.unwrap();
    node.submit_block(2, &first, 3).await;
    let proof = node.orchestrator.finalise_epoch(&node.abort).await.unwrap();
    assert_eq!(proof.epoch_number, 2);
    assert_eq!(proof.public_inputs.previous_archive.next_available_leaf_index, 2);

    let status = node.orchestrator.status().await.unwrap().unwrap();
    assert_eq!(status.id, generation);
    assert_eq!(status.epoch_number, 2);
}
