//! Wall-clock ↔ round-index arithmetic (§4.A).
//!
//! Round 0 is the genesis beacon and occurs exactly at `genesis_time`.
//! Round `R >= 1` occurs at `genesis_time + (R - 1) * period`, so that
//! round 1 occurs at `genesis_time` itself, matching the `current_round`
//! boundary behaviour spec.md requires.

use crate::error::ClockError;

/// Returns the wall-clock time (unix seconds) at which `round` is produced.
pub fn time_of_round(period: u64, genesis_time: i64, round: u64) -> Result<i64, ClockError> {
    if period == 0 {
        return Err(ClockError::NonPositivePeriod);
    }
    if round == 0 {
        return Ok(genesis_time);
    }
    let offset = (round - 1)
        .checked_mul(period)
        .ok_or(ClockError::Overflow)?;
    let offset = i64::try_from(offset).map_err(|_| ClockError::Overflow)?;
    genesis_time.checked_add(offset).ok_or(ClockError::Overflow)
}

/// Returns the round current at `now`. Round 1 occurs at `genesis_time`
/// (i.e. `current_round(genesis_time, ...) == 1`, not 0); any `now` strictly
/// before genesis is round 0 (no beacon produced yet).
pub fn current_round(now: i64, period: u64, genesis_time: i64) -> u64 {
    if now < genesis_time {
        return 0;
    }
    let elapsed = (now - genesis_time) as u64;
    elapsed / period + 1
}

/// Returns the next round to be produced after `now`, and the time at
/// which it is due.
pub fn next_round(now: i64, period: u64, genesis_time: i64) -> Result<(u64, i64), ClockError> {
    let round = current_round(now, period, genesis_time) + 1;
    let at = time_of_round(period, genesis_time, round)?;
    Ok((round, at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_time_round_trip_holds_for_any_round_in_range() {
        let period = 30u64;
        let genesis = 1_595_431_050i64;
        for round in [1u64, 2, 3, 1_000_000, 10_000_000_000] {
            let t = time_of_round(period, genesis, round).unwrap();
            assert_eq!(current_round(t, period, genesis), round);
        }
    }

    #[test]
    fn current_round_boundary_at_genesis() {
        let period = 30u64;
        let genesis = 1_595_431_050i64;
        assert_eq!(current_round(genesis, period, genesis), 1);
        assert_eq!(current_round(genesis - 1, period, genesis), 0);
    }

    #[test]
    fn genesis_beacon_time_is_genesis_time() {
        let period = 30u64;
        let genesis = 1_595_431_050i64;
        assert_eq!(time_of_round(period, genesis, 0).unwrap(), genesis);
    }

    #[test]
    fn rejects_non_positive_period() {
        assert_eq!(
            time_of_round(0, 0, 5).unwrap_err(),
            ClockError::NonPositivePeriod
        );
    }

    #[test]
    fn detects_overflow() {
        let err = time_of_round(u64::MAX / 2, 0, u64::MAX).unwrap_err();
        assert_eq!(err, ClockError::Overflow);
    }

    #[test]
    fn next_round_is_current_plus_one() {
        let period = 10u64;
        let genesis = 1_000i64;
        let (round, at) = next_round(1_005, period, genesis).unwrap();
        assert_eq!(round, 1);
        assert_eq!(at, genesis);

        let (round, at) = next_round(genesis, period, genesis).unwrap();
        assert_eq!(round, 2);
        assert_eq!(at, genesis + 10);
    }
}
