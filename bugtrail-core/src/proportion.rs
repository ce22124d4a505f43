//! Proportion: estimating the injected version of a bug
//!
//! `p = round(mean((FV - IV) / (FV - OV + 1)))` over tickets whose IV was
//! reported, then `IV = FV - p * (FV - OV + 1)` for the others.
//!
//! Global invariants enforced:
//! - Only reported IVs feed the coefficient (predictions never do)
//! - The coefficient does not depend on ticket order
//! - A predicted IV is a real release in `[1, FV]`
//! - Reported IVs are never overwritten

use crate::interval::ReleaseId;
use crate::ticket::{InjectedVersion, ResolvedTicket};
use serde::{Deserialize, Serialize};

/// Which known-IV tickets feed the coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum ProportionStrategy {
    /// Every ticket with a reported IV
    #[default]
    Incremental,
    /// The `size` most recently resolved tickets with a reported IV
    MovingWindow { size: usize },
}

/// The project-wide coefficient of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proportion {
    pub p: i64,
    /// Tickets the mean was taken over; 0 means `p` is the fallback
    pub samples: usize,
}

impl Proportion {
    pub fn is_fallback(&self) -> bool {
        self.samples == 0
    }
}

/// Ratio `(FV - IV) / (FV - OV + 1)` of a ticket with a reported IV
fn ratio(ticket: &ResolvedTicket) -> Option<f64> {
    let InjectedVersion::Reported(iv) = ticket.iv else {
        return None;
    };
    let fv = i64::from(ticket.fv.get());
    let ov = i64::from(ticket.observed().get());
    let denominator = fv - ov + 1;
    if denominator <= 0 {
        return None;
    }
    Some((fv - i64::from(iv.get())) as f64 / denominator as f64)
}

/// Compute `p` over the selected tickets
///
/// With no usable sample, `fallback_p` is returned unchanged.
pub fn coefficient(
    tickets: &[ResolvedTicket],
    strategy: ProportionStrategy,
    fallback_p: i64,
) -> Proportion {
    let mut known: Vec<&ResolvedTicket> = tickets.iter().filter(|t| t.iv.is_reported()).collect();

    if let ProportionStrategy::MovingWindow { size } = strategy {
        known.sort_by(|a, b| a.resolved.cmp(&b.resolved).then_with(|| a.key.cmp(&b.key)));
        let skip = known.len().saturating_sub(size);
        known.drain(..skip);
    }

    let mut ratios: Vec<f64> = known.into_iter().filter_map(ratio).collect();
    if ratios.is_empty() {
        return Proportion {
            p: fallback_p,
            samples: 0,
        };
    }

    // Summation order fixed so the rounded mean is order independent
    ratios.sort_by(f64::total_cmp);
    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    Proportion {
        p: mean.round() as i64,
        samples: ratios.len(),
    }
}

/// Predicted IV of one ticket, clamped into `[1, FV]`
pub fn predicted_injected(fv: ReleaseId, ov: ReleaseId, p: i64) -> ReleaseId {
    let fv_n = i64::from(fv.get());
    let ov_n = i64::from(ov.get());
    let predicted = (fv_n - p * (fv_n - ov_n + 1)).clamp(1, fv_n);
    u32::try_from(predicted)
        .ok()
        .and_then(ReleaseId::new)
        .unwrap_or(ReleaseId::FIRST)
}

/// Fill in every unknown IV with its prediction; returns how many were predicted
pub fn predict_injected(tickets: &mut [ResolvedTicket], p: i64) -> usize {
    let mut predicted = 0;
    for ticket in tickets
        .iter_mut()
        .filter(|t| t.iv == InjectedVersion::Unknown)
    {
        let iv = predicted_injected(ticket.fv, ticket.observed(), p);
        ticket.iv = InjectedVersion::Predicted(iv);
        predicted += 1;
    }
    predicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::ReleaseRange;
    use chrono::NaiveDate;

    fn id(n: u32) -> ReleaseId {
        ReleaseId::new(n).unwrap()
    }

    fn ticket(key: &str, iv: Option<u32>, ov: u32, fv: u32, resolved_day: u32) -> ResolvedTicket {
        let day = NaiveDate::from_ymd_opt(2022, 1, resolved_day).unwrap();
        ResolvedTicket {
            id: key.to_string(),
            key: key.to_string(),
            created: day,
            resolved: day,
            fix_commit: Some(format!("fix-{}", key)),
            ov: Some(id(ov)),
            fv: id(fv),
            iv: iv.map_or(InjectedVersion::Unknown, |n| InjectedVersion::Reported(id(n))),
            had_affected_versions: iv.is_some(),
            affected: ReleaseRange::empty_at(id(fv)),
        }
    }

    #[test]
    fn test_coefficient_rounds_mean_ratio() {
        // (5-1)/(5-3+1) = 1.33, (4-1)/(4-4+1) = 3.0 -> mean 2.17 -> 2
        let tickets = vec![
            ticket("A-1", Some(1), 3, 5, 1),
            ticket("A-2", Some(1), 4, 4, 2),
            ticket("A-3", None, 2, 4, 3),
        ];
        let proportion = coefficient(&tickets, ProportionStrategy::Incremental, 0);
        assert_eq!(proportion.p, 2);
        assert_eq!(proportion.samples, 2);
        assert!(!proportion.is_fallback());
    }

    #[test]
    fn test_coefficient_falls_back_without_samples() {
        let tickets = vec![ticket("A-1", None, 2, 4, 1)];
        let proportion = coefficient(&tickets, ProportionStrategy::Incremental, 3);
        assert_eq!(proportion, Proportion { p: 3, samples: 0 });
        assert!(proportion.is_fallback());
    }

    #[test]
    fn test_coefficient_is_order_independent() {
        let mut tickets = vec![
            ticket("A-1", Some(1), 2, 3, 1),
            ticket("A-2", Some(2), 5, 6, 2),
            ticket("A-3", Some(1), 6, 6, 3),
            ticket("A-4", Some(3), 4, 7, 4),
        ];
        let forward = coefficient(&tickets, ProportionStrategy::Incremental, 0);
        tickets.reverse();
        let backward = coefficient(&tickets, ProportionStrategy::Incremental, 0);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_moving_window_uses_latest_resolved() {
        let tickets = vec![
            // ratio 3.0, resolved last
            ticket("A-3", Some(1), 4, 4, 30),
            // ratio 0.5, oldest, falls out of the window
            ticket("A-1", Some(2), 2, 3, 1),
            // ratio 3.0
            ticket("A-2", Some(2), 5, 5, 15),
        ];
        let window = coefficient(&tickets, ProportionStrategy::MovingWindow { size: 2 }, 0);
        assert_eq!(window, Proportion { p: 3, samples: 2 });

        let all = coefficient(&tickets, ProportionStrategy::Incremental, 0);
        // mean(0.5, 3, 3) = 2.17
        assert_eq!(all.p, 2);
    }

    #[test]
    fn test_predicted_injected_clamps() {
        assert_eq!(predicted_injected(id(3), id(2), 1), id(1));
        assert_eq!(predicted_injected(id(5), id(4), 1), id(3));
        // 2 - 3 * 2 = -4 -> release 1
        assert_eq!(predicted_injected(id(2), id(1), 3), id(1));
        // p = 0 puts IV on FV: empty range
        assert_eq!(predicted_injected(id(4), id(2), 0), id(4));
    }

    #[test]
    fn test_predict_only_touches_unknown() {
        let mut tickets = vec![ticket("A-1", Some(2), 3, 4, 1), ticket("A-2", None, 3, 4, 2)];
        let predicted = predict_injected(&mut tickets, 1);
        assert_eq!(predicted, 1);
        assert_eq!(tickets[0].iv, InjectedVersion::Reported(id(2)));
        assert_eq!(tickets[1].iv, InjectedVersion::Predicted(id(2)));
    }
}
