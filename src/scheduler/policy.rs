//! Alert qualification rules: countdown math and the rate-priority
//! tie-break between the sooner- and later-settling sides of a spread.

use chrono::{DateTime, Utc};

use crate::models::AssetSpread;

/// Ceiling-rounded whole minutes until `at`. `None` once the settlement
/// has passed (an elapsed settlement cannot be alerted on).
pub fn eta_minutes(now: DateTime<Utc>, at: DateTime<Utc>) -> Option<i64> {
    let secs = (at - now).num_seconds();
    if secs <= 0 {
        return None;
    }
    Some((secs + 59) / 60)
}

/// The sooner- and later-settling sides of a spread, with the ETA of the
/// sooner side. A missing settlement time sorts later; `None` when
/// neither side has a usable future settlement.
pub fn sides_by_settlement(spread: &AssetSpread, now: DateTime<Utc>) -> Option<SpreadTiming> {
    let high_eta = spread.high.next_settlement.and_then(|at| eta_minutes(now, at));
    let low_eta = spread.low.next_settlement.and_then(|at| eta_minutes(now, at));

    let (sooner_rate, later_rate, eta) = match (high_eta, low_eta) {
        (Some(h), Some(l)) if h <= l => (spread.high.rate, spread.low.rate, h),
        (Some(_), Some(l)) => (spread.low.rate, spread.high.rate, l),
        (Some(h), None) => (spread.high.rate, spread.low.rate, h),
        (None, Some(l)) => (spread.low.rate, spread.high.rate, l),
        (None, None) => return None,
    };
    Some(SpreadTiming {
        sooner_rate,
        later_rate,
        eta_minutes: eta,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadTiming {
    pub sooner_rate: f64,
    pub later_rate: f64,
    /// Ceiling-rounded minutes until the sooner side settles.
    pub eta_minutes: i64,
}

/// Rate-priority tie-break: a bigger payout arriving sooner matters more
/// than a bigger payout arriving later. When both rates are negative the
/// comparison is by absolute magnitude; otherwise by raw signed value.
///
/// The mixed-sign case deliberately collapses to "larger raw value
/// wins". That is the observed behavior of the system this replaces and
/// is kept as-is, even though a large negative funding rate is a cost to
/// one side of the trade.
pub fn sooner_side_wins(sooner_rate: f64, later_rate: f64) -> bool {
    if sooner_rate < 0.0 && later_rate < 0.0 {
        sooner_rate.abs() >= later_rate.abs()
    } else {
        sooner_rate >= later_rate
    }
}

/// Full qualifying rule for one candidate: threshold, settlement window
/// and the priority tie-break. Returns the sooner-side ETA when the
/// candidate qualifies.
pub fn qualifies(
    spread: &AssetSpread,
    threshold_pct: f64,
    window_minutes: i64,
    now: DateTime<Utc>,
) -> Option<i64> {
    if spread.spread_pct < threshold_pct {
        return None;
    }
    let timing = sides_by_settlement(spread, now)?;
    if timing.eta_minutes > window_minutes {
        return None;
    }
    if !sooner_side_wins(timing.sooner_rate, timing.later_rate) {
        return None;
    }
    Some(timing.eta_minutes)
}

/// Pre-qualification for precise scheduling: threshold and tie-break
/// only, with the ETA used to place the one-shot timer.
pub fn precise_candidate_eta(
    spread: &AssetSpread,
    threshold_pct: f64,
    now: DateTime<Utc>,
) -> Option<i64> {
    if spread.spread_pct < threshold_pct {
        return None;
    }
    let timing = sides_by_settlement(spread, now)?;
    if !sooner_side_wins(timing.sooner_rate, timing.later_rate) {
        return None;
    }
    Some(timing.eta_minutes)
}

/// Staleness check at fire time: if the recomputed ETA has drifted past
/// the window by more than the slack, the alert is abandoned and the
/// schedule re-derived instead.
pub fn is_stale(eta_minutes: i64, window_minutes: i64, slack_minutes: i64) -> bool {
    eta_minutes > window_minutes + slack_minutes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::models::FundingQuote;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn quote(exchange: &'static str, rate: f64, eta_min: Option<i64>) -> FundingQuote {
        FundingQuote {
            exchange,
            symbol: "BTCUSDT".to_string(),
            rate,
            price: None,
            next_settlement: eta_min.map(|m| now() + Duration::minutes(m)),
            settlement_estimated: false,
        }
    }

    fn spread(high: FundingQuote, low: FundingQuote) -> AssetSpread {
        AssetSpread {
            base_asset: "BTC".to_string(),
            spread_pct: (high.rate - low.rate) * 100.0,
            high,
            low,
        }
    }

    #[test]
    fn eta_rounds_up_and_rejects_the_past() {
        let at = now() + Duration::seconds(61);
        assert_eq!(eta_minutes(now(), at), Some(2));
        let at = now() + Duration::seconds(60);
        assert_eq!(eta_minutes(now(), at), Some(1));
        assert_eq!(eta_minutes(now(), now()), None);
        assert_eq!(eta_minutes(now(), now() - Duration::minutes(5)), None);
    }

    #[test]
    fn tie_break_negative_pair_compares_magnitude() {
        // Sooner -2.0%, later -1.0%: sooner wins.
        assert!(sooner_side_wins(-0.020, -0.010));
        // Sooner -1.0%, later -2.0%: sooner loses.
        assert!(!sooner_side_wins(-0.010, -0.020));
    }

    #[test]
    fn tie_break_otherwise_compares_raw_value() {
        // Sooner 0.5%, later 1.5%: bigger value happens later, no alert.
        assert!(!sooner_side_wins(0.005, 0.015));
        assert!(sooner_side_wins(0.015, 0.005));
        // Mixed signs collapse to raw comparison.
        assert!(sooner_side_wins(0.001, -0.020));
        assert!(!sooner_side_wins(-0.020, 0.001));
    }

    #[test]
    fn qualifies_inside_window_only() {
        // spread 1.2%, threshold 1.0%, window 30m
        let s = spread(quote("ExA", 0.010, Some(25)), quote("ExB", -0.002, Some(300)));
        assert_eq!(qualifies(&s, 1.0, 30, now()), Some(25));

        let s = spread(quote("ExA", 0.010, Some(45)), quote("ExB", -0.002, Some(300)));
        assert_eq!(qualifies(&s, 1.0, 30, now()), None);
    }

    #[test]
    fn qualifies_requires_threshold_and_some_settlement() {
        let s = spread(quote("ExA", 0.004, Some(10)), quote("ExB", -0.002, Some(20)));
        // 0.6% spread below a 1.0% threshold.
        assert_eq!(qualifies(&s, 1.0, 30, now()), None);
        // No settlement time on either side.
        let s = spread(quote("ExA", 0.010, None), quote("ExB", -0.002, None));
        assert_eq!(qualifies(&s, 1.0, 30, now()), None);
    }

    #[test]
    fn qualifies_applies_tie_break() {
        // Sooner side (high, 10m) has the higher raw rate: qualifies.
        let s = spread(quote("ExA", 0.005, Some(10)), quote("ExB", -0.015, Some(20)));
        assert_eq!(qualifies(&s, 1.0, 30, now()), Some(10));

        // Swap timing so the low side settles first: sooner rate -1.5%
        // against later 0.5%, raw comparison fails.
        let s = spread(quote("ExA", 0.005, Some(20)), quote("ExB", -0.015, Some(10)));
        assert_eq!(qualifies(&s, 1.0, 30, now()), None);
    }

    #[test]
    fn untimed_side_sorts_later() {
        let s = spread(quote("ExA", 0.010, Some(15)), quote("ExB", -0.005, None));
        let timing = sides_by_settlement(&s, now()).unwrap();
        assert_eq!(timing.sooner_rate, 0.010);
        assert_eq!(timing.later_rate, -0.005);
        assert_eq!(timing.eta_minutes, 15);
    }

    #[test]
    fn staleness_uses_window_plus_slack() {
        assert!(!is_stale(30, 30, 3));
        assert!(!is_stale(33, 30, 3));
        assert!(is_stale(34, 30, 3));
    }
}
