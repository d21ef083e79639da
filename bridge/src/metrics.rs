// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use ethers::types::U256;
use prometheus::{
    register_gauge_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry, GaugeVec,
    IntCounter, IntCounterVec, IntGaugeVec, Registry,
};

#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    // Synchronizers
    pub(crate) last_synced_block: IntGaugeVec,
    pub(crate) synchronizer_status: IntGaugeVec,
    pub(crate) sync_batches: IntCounterVec,
    pub(crate) sync_errors: IntCounterVec,
    pub(crate) records_ingested: IntCounterVec,

    // Bridge invariant
    pub(crate) locked_collateral: GaugeVec,
    pub(crate) minted_supply: GaugeVec,
    pub(crate) invariant_breaches: IntCounterVec,
    pub(crate) supply_changes: IntCounterVec,

    // Bad debt
    pub(crate) bad_debt: GaugeVec,
    pub(crate) unbacked_mints: IntCounterVec,

    // Attestations
    pub(crate) attestations_collected: IntCounter,
    pub(crate) attestation_timeouts: IntCounter,

    // Relay
    pub(crate) relay_tasks: IntCounterVec,
}

impl BridgeMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            last_synced_block: register_int_gauge_vec_with_registry!(
                "teleport_last_synced_block",
                "Exclusive upper bound of blocks processed by a synchronizer",
                &["domain", "synchronizer"],
                registry,
            )
            .unwrap(),
            synchronizer_status: register_int_gauge_vec_with_registry!(
                "teleport_synchronizer_status",
                "Synchronizer state: 0 stopped, 1 syncing, 2 synced",
                &["domain", "synchronizer"],
                registry,
            )
            .unwrap(),
            sync_batches: register_int_counter_vec_with_registry!(
                "teleport_sync_batches_total",
                "Total number of batches committed by synchronizers",
                &["domain", "synchronizer"],
                registry,
            )
            .unwrap(),
            sync_errors: register_int_counter_vec_with_registry!(
                "teleport_sync_errors_total",
                "Total number of failed synchronizer batch attempts, by error type",
                &["domain", "synchronizer", "error_type"],
                registry,
            )
            .unwrap(),
            records_ingested: register_int_counter_vec_with_registry!(
                "teleport_records_ingested_total",
                "Total number of new ledger records persisted, by event kind",
                &["domain", "kind"],
                registry,
            )
            .unwrap(),
            locked_collateral: register_gauge_vec_with_registry!(
                "teleport_locked_collateral",
                "Collateral locked on the source domain for a bridge pair",
                &["domain"],
                registry,
            )
            .unwrap(),
            minted_supply: register_gauge_vec_with_registry!(
                "teleport_minted_supply",
                "Supply minted on the target domain for a bridge pair",
                &["domain"],
                registry,
            )
            .unwrap(),
            invariant_breaches: register_int_counter_vec_with_registry!(
                "teleport_invariant_breaches_total",
                "Total number of evaluated blocks where locked collateral < minted supply",
                &["domain"],
                registry,
            )
            .unwrap(),
            supply_changes: register_int_counter_vec_with_registry!(
                "teleport_supply_changes_total",
                "Total number of observed minted supply changes",
                &["domain"],
                registry,
            )
            .unwrap(),
            bad_debt: register_gauge_vec_with_registry!(
                "teleport_bad_debt",
                "Cumulative amount minted via oracle attestations without a backing transfer",
                &["domain"],
                registry,
            )
            .unwrap(),
            unbacked_mints: register_int_counter_vec_with_registry!(
                "teleport_unbacked_mints_total",
                "Total number of oracle-authorized mints without a backing transfer",
                &["domain"],
                registry,
            )
            .unwrap(),
            attestations_collected: register_int_counter_with_registry!(
                "teleport_attestations_collected_total",
                "Total number of attestation sets that reached quorum",
                registry,
            )
            .unwrap(),
            attestation_timeouts: register_int_counter_with_registry!(
                "teleport_attestation_timeouts_total",
                "Total number of attestation collections that timed out",
                registry,
            )
            .unwrap(),
            relay_tasks: register_int_counter_vec_with_registry!(
                "teleport_relay_tasks_total",
                "Total number of relay tasks, by outcome",
                &["status"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}

/// Token amounts exceed i64, so amount gauges are floats
pub(crate) fn amount_as_gauge(value: U256) -> f64 {
    if value <= U256::from(u128::MAX) {
        value.as_u128() as f64
    } else {
        value.to_string().parse().unwrap_or(f64::MAX)
    }
}
