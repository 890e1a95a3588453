// src/blend.rs
//! Regional blending and ranking of the clean candidate set.
//!
//! Candidates are partitioned by source into a primary local bucket, the
//! combined secondary local buckets, and a foreign bucket. Buckets sort by
//! relevance descending with price ascending as the tie-break; relevance
//! deltas under the configured epsilon count as ties. The regional policy
//! emits the whole primary bucket, then K secondary-local items per one
//! foreign item until both run out. Non-regional users get locals then
//! foreign, no interleave.

use crate::config::Policy;
use crate::types::NormalizedDeal;

/// Ranked output plus the candidate count before truncation.
#[derive(Debug, Clone)]
pub struct Blended {
    pub deals: Vec<NormalizedDeal>,
    pub total_valid: usize,
}

/// Quantize relevance to the tie grid so the sort is a proper total order.
fn relevance_rank(rel: f32, epsilon: f32) -> i64 {
    if epsilon <= 0.0 {
        return (rel * 1_000_000.0) as i64;
    }
    (rel / epsilon).round() as i64
}

fn sort_bucket(bucket: &mut [NormalizedDeal], epsilon: f32) {
    bucket.sort_by(|a, b| {
        let ra = relevance_rank(a.relevance, epsilon);
        let rb = relevance_rank(b.relevance, epsilon);
        rb.cmp(&ra)
            .then_with(|| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal))
    });
}

fn partition(
    deals: Vec<NormalizedDeal>,
    policy: &Policy,
) -> (Vec<NormalizedDeal>, Vec<NormalizedDeal>, Vec<NormalizedDeal>) {
    let mut primary = Vec::new();
    let mut secondary = Vec::new();
    let mut foreign = Vec::new();
    for d in deals {
        let s = d.source.to_lowercase();
        if s.contains(&policy.blend.primary_local) {
            primary.push(d);
        } else if policy.blend.secondary_local.iter().any(|k| s.contains(k)) {
            secondary.push(d);
        } else {
            foreign.push(d);
        }
    }
    (primary, secondary, foreign)
}

fn interleave(
    secondary: Vec<NormalizedDeal>,
    foreign: Vec<NormalizedDeal>,
    locals_per_foreign: usize,
) -> Vec<NormalizedDeal> {
    let mut out = Vec::with_capacity(secondary.len() + foreign.len());
    let mut sec = secondary.into_iter();
    let mut fore = foreign.into_iter();
    loop {
        let mut progressed = false;
        for _ in 0..locals_per_foreign.max(1) {
            match sec.next() {
                Some(d) => {
                    out.push(d);
                    progressed = true;
                }
                None => break,
            }
        }
        if let Some(d) = fore.next() {
            out.push(d);
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
    out
}

/// Blend the candidate set into the final ranked, truncated list.
/// `regional_user` selects the interleaving policy; a non-regional caller
/// gets plain local-then-foreign concatenation.
pub fn blend(deals: Vec<NormalizedDeal>, policy: &Policy, regional_user: bool) -> Blended {
    let epsilon = policy.relevance.tie_epsilon;
    let (mut primary, mut secondary, mut foreign) = partition(deals, policy);
    sort_bucket(&mut primary, epsilon);
    sort_bucket(&mut secondary, epsilon);
    sort_bucket(&mut foreign, epsilon);

    let mut ranked = primary;
    if regional_user {
        ranked.extend(interleave(
            secondary,
            foreign,
            policy.blend.locals_per_foreign,
        ));
    } else {
        ranked.extend(secondary);
        ranked.extend(foreign);
    }

    let total_valid = ranked.len();
    ranked.truncate(policy.blend.max_results);
    Blended {
        deals: ranked,
        total_valid,
    }
}
