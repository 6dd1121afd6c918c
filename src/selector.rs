//! `CandidateSelector` — ranks compatible spot instance types × AZs for a
//! given on-demand base instance.

use crate::catalog::{InstanceCatalog, InstanceType};
use crate::cloud::Instance;
use crate::config::{AsgPolicy, BiddingPolicy};
use crate::errors::Result;
use crate::glob::any_token_matches;
use crate::pricing::PriceOracle;
use std::cmp::Ordering;

/// One ranked (type, AZ, bid) candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub instance_type: String,
    pub availability_zone: String,
    pub bid: f64,
    /// Raw spot price at `(instance_type, availability_zone)` under the
    /// policy's product description, independent of `bid` — this is what
    /// ranking sorts on (`§4.3` step 4), not the computed bid.
    pub spot_price: f64,
}

fn is_compatible(base: &InstanceType, candidate: &InstanceType) -> bool {
    if candidate.vcpus < base.vcpus {
        return false;
    }
    if candidate.memory_gib < base.memory_gib {
        return false;
    }
    if candidate.gpus < base.gpus {
        return false;
    }
    if base
        .architectures
        .iter()
        .all(|arch| !candidate.architectures.contains(arch))
    {
        return false;
    }
    if base
        .virtualization
        .iter()
        .all(|v| !candidate.virtualization.contains(v))
    {
        return false;
    }
    if let Some(base_storage) = &base.ephemeral_storage {
        match &candidate.ephemeral_storage {
            None => return false,
            Some(cand_storage) => {
                if cand_storage.count < base_storage.count
                    || cand_storage.size_gib < base_storage.size_gib
                {
                    return false;
                }
            }
        }
    }
    if base.ebs_optimized && !candidate.ebs_optimized {
        return false;
    }
    true
}

fn passes_policy_filter(type_id: &str, base_type_id: &str, policy: &AsgPolicy) -> bool {
    let allow_ok = {
        let raw = policy.allowed_instance_types.trim();
        if raw.is_empty() {
            true
        } else if raw == "current" {
            type_id == base_type_id
        } else {
            any_token_matches(raw, type_id)
        }
    };
    if !allow_ok {
        return false;
    }
    let deny_raw = policy.disallowed_instance_types.trim();
    if deny_raw.is_empty() {
        return true;
    }
    !any_token_matches(deny_raw, type_id)
}

fn compute_bid(candidate: &InstanceType, spot_price: f64, region: &str, policy: &AsgPolicy, oracle: &PriceOracle) -> Option<f64> {
    let on_demand = oracle.on_demand_price(*candidate.on_demand_price.get(region)?, policy.on_demand_price_multiplier);
    match policy.bidding_policy {
        BiddingPolicy::Normal => Some(on_demand),
        BiddingPolicy::Aggressive => {
            if spot_price.is_infinite() {
                return None;
            }
            let buffered = spot_price * (1.0 + policy.spot_price_buffer_percentage / 100.0);
            Some(buffered.min(on_demand))
        }
    }
}

fn rank_key(c: &Candidate, catalog: &InstanceCatalog) -> (u64, u32, u64, String, String) {
    let vcpus = catalog.get(&c.instance_type).map(|t| t.vcpus).unwrap_or(u32::MAX);
    let memory_bits = catalog
        .get(&c.instance_type)
        .map(|t| t.memory_gib)
        .unwrap_or(f64::MAX)
        .to_bits();
    // Price sorts ascending via bit pattern of a non-negative float; +inf sorts last.
    (c.spot_price.to_bits(), vcpus, memory_bits, c.instance_type.clone(), c.availability_zone.clone())
}

/// Rank compatible spot (type, AZ) pairs for replacing `base` under `policy`.
///
/// Note: ranking is keyed off the *raw* spot price at `(type, az)`, not the
/// computed bid, per §4.3 step 4 ("order pairs by ascending spotPrice").
pub fn select_candidates(
    base: &Instance,
    region: &str,
    azs: &[String],
    policy: &AsgPolicy,
    catalog: &InstanceCatalog,
    oracle: &PriceOracle,
) -> Result<Vec<Candidate>> {
    let base_type = catalog.get(&base.instance_type)?;

    let mut candidates = Vec::new();
    for candidate_type in catalog.list_all() {
        if !is_compatible(base_type, candidate_type) {
            continue;
        }
        if !passes_policy_filter(&candidate_type.id, &base_type.id, policy) {
            continue;
        }
        for az in azs {
            let spot_price = oracle.spot_price(&candidate_type.id, az, &policy.spot_product_description);
            if let Some(bid) = compute_bid(candidate_type, spot_price, region, policy, oracle) {
                candidates.push(Candidate {
                    instance_type: candidate_type.id.clone(),
                    availability_zone: az.clone(),
                    bid,
                    spot_price,
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        let ka = rank_key(a, catalog);
        let kb = rank_key(b, catalog);
        ka.partial_cmp(&kb).unwrap_or(Ordering::Equal)
    });

    if candidates.is_empty() {
        return Err(crate::errors::AutospottingError::no_candidate(&base.id));
    }
    Ok(candidates)
}
