//! Beacon light-client verification.
//!
//! Takes the packaged checkpoint, bootstrap, committee-period updates, and
//! finality update, and either proves an execution `(state_root,
//! block_number)` finalized or fails with a stable reason code. The sync
//! committee adopted from the bootstrap is the only trust anchor; every
//! hop from it is verified by Merkle branch and BLS aggregate.

pub mod bls;
pub mod config;
pub mod ssz;
pub mod types;

use {
    alloy_primitives::B256,
    config::{ForkSchedule, Network},
    evidence::{BeaconProof, ConsensusMode},
    tracing::debug,
    types::{
        BlsPublicKeyBytes, DOMAIN_SYNC_COMMITTEE, LightClientBootstrap, LightClientFinalityUpdate,
        LightClientHeader, LightClientUpdate, SYNC_COMMITTEE_SIZE, SyncAggregate, SyncCommittee,
        sync_committee_period,
    },
    verifier::{CancellationToken, ConsensusErrorCode, ConsensusVerificationResult},
};

/// Verify a packaged beacon consensus proof.
pub fn verify(proof: &BeaconProof, cancel: &CancellationToken) -> ConsensusVerificationResult {
    let failure = |code: ConsensusErrorCode, detail: String| {
        ConsensusVerificationResult::failure(ConsensusMode::Beacon, code, detail)
    };

    let network: Network = match proof.network.parse() {
        Ok(network) => network,
        Err(err) => return failure(ConsensusErrorCode::InvalidProofPayload, err),
    };
    let schedule = network.schedule();

    let bootstrap: LightClientBootstrap = match types::from_json(&proof.bootstrap) {
        Ok(bootstrap) => bootstrap,
        Err(err) => {
            return failure(
                ConsensusErrorCode::InvalidBootstrapJson,
                format!("bootstrap does not parse: {err}"),
            );
        }
    };

    // 1. The checkpoint pins the bootstrap header.
    let bootstrap_root = ssz::hash_tree_root_header(&bootstrap.header.beacon);
    if bootstrap_root != proof.checkpoint {
        return failure(
            ConsensusErrorCode::InvalidCheckpointHash,
            format!(
                "bootstrap header hashes to {bootstrap_root}, checkpoint is {}",
                proof.checkpoint,
            ),
        );
    }

    // 2. Adopt the bootstrap committee after proving it into the header's
    //    state.
    if let Err(detail) = verify_committee_branch(
        &bootstrap.current_sync_committee,
        &bootstrap.current_sync_committee_branch,
        &bootstrap.header,
        &schedule,
        CommitteeSlot::Current,
    ) {
        return failure(ConsensusErrorCode::BootstrapVerificationFailed, detail);
    }

    let mut committee = bootstrap.current_sync_committee;
    let mut period = sync_committee_period(bootstrap.header.beacon.slot);

    // 3. Walk the committee-period updates in order.
    for (index, update) in proof.updates.iter().enumerate() {
        if cancel.is_cancelled() {
            return failure(
                ConsensusErrorCode::VerificationCancelled,
                "cancelled between updates".into(),
            );
        }
        let update: LightClientUpdate = match types::from_json(update) {
            Ok(update) => update,
            Err(err) => {
                return failure(
                    ConsensusErrorCode::UpdateVerificationFailed,
                    format!("update {index} does not parse: {err}"),
                );
            }
        };
        if let Err(detail) = apply_update(&mut committee, &mut period, &update, &schedule) {
            return failure(
                ConsensusErrorCode::UpdateVerificationFailed,
                format!("update {index}: {detail}"),
            );
        }
    }

    // 4. The finality update binds a finalized header under the active
    //    committee.
    let finality: LightClientFinalityUpdate = match types::from_json(&proof.finality_update) {
        Ok(finality) => finality,
        Err(err) => {
            return failure(
                ConsensusErrorCode::FinalityVerificationFailed,
                format!("finality update does not parse: {err}"),
            );
        }
    };
    if cancel.is_cancelled() {
        return failure(
            ConsensusErrorCode::VerificationCancelled,
            "cancelled before finality verification".into(),
        );
    }
    if let Err(detail) = verify_finality(&committee, period, &finality, &schedule) {
        return failure(ConsensusErrorCode::FinalityVerificationFailed, detail);
    }

    // 5. Extract the execution payload from the finalized header.
    let finalized = &finality.finalized_header;
    let Some(execution) = &finalized.execution else {
        return failure(
            ConsensusErrorCode::MissingExecutionPayload,
            "finalized header carries no execution payload".into(),
        );
    };
    let execution_root = ssz::hash_tree_root_execution(execution);
    let (depth, index) = schedule
        .branch_indices_at(finalized.beacon.slot)
        .execution_payload;
    if !ssz::is_valid_merkle_branch(
        execution_root,
        &finalized.execution_branch,
        depth,
        index,
        finalized.beacon.body_root,
    ) {
        return failure(
            ConsensusErrorCode::FinalityVerificationFailed,
            "execution payload branch does not verify against the finalized body root".into(),
        );
    }

    // The package's own claims are advisory; flag divergence instead of
    // failing, the composer decides what it costs.
    let state_root_mismatch = execution.state_root != proof.state_root
        || execution.block_number != proof.block_number
        || finalized.beacon.slot != proof.slot;

    debug!(
        block_number = execution.block_number,
        slot = finalized.beacon.slot,
        state_root = %execution.state_root,
        "beacon consensus proof verified",
    );

    ConsensusVerificationResult {
        valid: true,
        mode: ConsensusMode::Beacon,
        verified_state_root: Some(execution.state_root),
        verified_block_number: Some(execution.block_number),
        state_root_mismatch,
        error: None,
        warning: None,
        detail: None,
    }
}

enum CommitteeSlot {
    Current,
    Next,
}

/// Prove a sync committee into a header's state root.
fn verify_committee_branch(
    committee: &SyncCommittee,
    branch: &[B256],
    header: &LightClientHeader,
    schedule: &ForkSchedule,
    slot: CommitteeSlot,
) -> Result<(), String> {
    if committee.pubkeys.len() != SYNC_COMMITTEE_SIZE {
        return Err(format!(
            "sync committee has {} members, expected {SYNC_COMMITTEE_SIZE}",
            committee.pubkeys.len(),
        ));
    }
    let indices = schedule.branch_indices_at(header.beacon.slot);
    let (depth, index) = match slot {
        CommitteeSlot::Current => indices.current_sync_committee,
        CommitteeSlot::Next => indices.next_sync_committee,
    };
    let committee_root = ssz::hash_tree_root_sync_committee(committee);
    if !ssz::is_valid_merkle_branch(
        committee_root,
        branch,
        depth,
        index,
        header.beacon.state_root,
    ) {
        return Err("sync committee branch does not verify against the state root".into());
    }
    Ok(())
}

/// Verify a sync aggregate over a header under `committee`.
fn verify_aggregate(
    committee: &SyncCommittee,
    aggregate: &SyncAggregate,
    header: &LightClientHeader,
    signature_slot: u64,
    schedule: &ForkSchedule,
) -> Result<(), String> {
    if aggregate.sync_committee_bits.len() * 8 != SYNC_COMMITTEE_SIZE {
        return Err("participation bitvector has the wrong width".into());
    }
    let participation = aggregate.participation();
    if participation * 3 < SYNC_COMMITTEE_SIZE * 2 {
        return Err(format!(
            "only {participation}/{SYNC_COMMITTEE_SIZE} participants, need two thirds",
        ));
    }

    let participants: Vec<&BlsPublicKeyBytes> = committee
        .pubkeys
        .iter()
        .enumerate()
        .filter(|(index, _)| aggregate.participated(*index))
        .map(|(_, key)| key)
        .collect();

    let fork_version = schedule.fork_version_for_signature(signature_slot);
    let domain = ssz::compute_domain(
        DOMAIN_SYNC_COMMITTEE,
        fork_version,
        schedule.genesis_validators_root,
    );
    let signing_root =
        ssz::compute_signing_root(ssz::hash_tree_root_header(&header.beacon), domain);

    match bls::fast_aggregate_verify(
        &participants,
        signing_root,
        &aggregate.sync_committee_signature,
    ) {
        Ok(true) => Ok(()),
        Ok(false) => Err("aggregate signature does not verify".into()),
        Err(err) => Err(err.to_string()),
    }
}

/// Process one committee-period update, advancing the active committee on
/// a period transition.
fn apply_update(
    committee: &mut SyncCommittee,
    period: &mut u64,
    update: &LightClientUpdate,
    schedule: &ForkSchedule,
) -> Result<(), String> {
    let attested_period = sync_committee_period(update.attested_header.beacon.slot);

    if attested_period == *period {
        verify_aggregate(
            committee,
            &update.sync_aggregate,
            &update.attested_header,
            update.signature_slot,
            schedule,
        )
    } else if attested_period == *period + 1 {
        let next = update
            .next_sync_committee
            .as_ref()
            .ok_or("period transition without a next sync committee")?;
        verify_committee_branch(
            next,
            &update.next_sync_committee_branch,
            &update.attested_header,
            schedule,
            CommitteeSlot::Next,
        )?;
        verify_aggregate(
            next,
            &update.sync_aggregate,
            &update.attested_header,
            update.signature_slot,
            schedule,
        )?;
        *committee = next.clone();
        *period = attested_period;
        Ok(())
    } else {
        Err(format!(
            "attested period {attested_period} does not follow current period {period}",
        ))
    }
}

/// Verify the finality update: aggregate over the attested header, then the
/// finalized header's Merkle branch against the attested state root.
fn verify_finality(
    committee: &SyncCommittee,
    period: u64,
    finality: &LightClientFinalityUpdate,
    schedule: &ForkSchedule,
) -> Result<(), String> {
    let attested_period = sync_committee_period(finality.attested_header.beacon.slot);
    if attested_period != period {
        return Err(format!(
            "finality update attested in period {attested_period}, active period is {period}",
        ));
    }
    verify_aggregate(
        committee,
        &finality.sync_aggregate,
        &finality.attested_header,
        finality.signature_slot,
        schedule,
    )?;

    if finality.finalized_header.beacon.slot > finality.attested_header.beacon.slot {
        return Err("finalized header is newer than the attested header".into());
    }
    let finalized_root = ssz::hash_tree_root_header(&finality.finalized_header.beacon);
    let (depth, index) = schedule
        .branch_indices_at(finality.attested_header.beacon.slot)
        .finalized_root;
    if !ssz::is_valid_merkle_branch(
        finalized_root,
        &finality.finality_branch,
        depth,
        index,
        finality.attested_header.beacon.state_root,
    ) {
        return Err("finality branch does not verify against the attested state root".into());
    }
    Ok(())
}
