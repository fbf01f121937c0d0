use std::collections::{BTreeMap, HashSet};

use crate::errors::SplitError;
use crate::money::Money;
use crate::schemas::{ExactShare, Expense, MemberId, PercentShare, Split};

/// Declared percentages must sum to 100 within this tolerance.
const PERCENT_TOLERANCE: f64 = 0.001;

/// Each participant's owed share of one expense, in the order the
/// participants were supplied. Shares are never negative and always sum to
/// the expense amount exactly; no minor unit is lost or invented.
pub fn participant_shares(expense: &Expense) -> Result<Vec<(MemberId, Money)>, SplitError> {
    let amount = expense.amount.minor_units();
    if amount <= 0 {
        return Err(SplitError::InvalidAmount(format!(
            "expense amount {amount} is not a positive number of minor units"
        )));
    }
    if expense.participants.is_empty() {
        return Err(SplitError::InvalidParticipants(
            "participant list is empty".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for participant in &expense.participants {
        if !seen.insert(participant.as_str()) {
            return Err(SplitError::InvalidParticipants(format!(
                "{participant} appears twice in the participant list"
            )));
        }
    }

    match &expense.split {
        Split::Equal => Ok(equal_shares(amount, &expense.participants)),
        Split::Exact(shares) => exact_shares(amount, &expense.participants, shares),
        Split::Percentage(shares) => percentage_shares(amount, &expense.participants, shares),
    }
}

/// Signed balance deltas for one expense: every participant is debited
/// their share and the payer is credited the full amount. The values sum
/// to zero, so folding expenses can never create or destroy money.
pub fn compute_splits(expense: &Expense) -> Result<BTreeMap<MemberId, Money>, SplitError> {
    let shares = participant_shares(expense)?;
    let mut deltas: BTreeMap<MemberId, Money> = BTreeMap::new();
    for (member, share) in shares {
        *deltas.entry(member).or_insert(Money::zero()) -= share;
    }
    *deltas.entry(expense.payer.clone()).or_insert(Money::zero()) += expense.amount;
    Ok(deltas)
}

fn equal_shares(amount: i64, participants: &[MemberId]) -> Vec<(MemberId, Money)> {
    let count = participants.len() as i64;
    let base = amount / count;
    let remainder = (amount % count) as usize;
    participants
        .iter()
        .enumerate()
        .map(|(idx, member)| {
            let mut share = base;
            if idx < remainder {
                share += 1;
            }
            (member.clone(), Money::from_minor_units(share))
        })
        .collect()
}

fn exact_shares(
    amount: i64,
    participants: &[MemberId],
    shares: &[ExactShare],
) -> Result<Vec<(MemberId, Money)>, SplitError> {
    let declared = declared_shares(
        participants,
        shares.iter().map(|share| (&share.member_id, share.amount)),
    )?;
    for (member, share) in &declared {
        if share.minor_units() < 0 {
            return Err(SplitError::InvalidAmount(format!(
                "negative share {share} declared for {member}"
            )));
        }
    }
    let total: i64 = declared.values().map(|share| share.minor_units()).sum();
    if total != amount {
        return Err(SplitError::SplitMismatch(format!(
            "exact shares sum to {total} minor units but the expense amount is {amount}"
        )));
    }
    Ok(participants
        .iter()
        .map(|member| (member.clone(), declared[member.as_str()]))
        .collect())
}

fn percentage_shares(
    amount: i64,
    participants: &[MemberId],
    shares: &[PercentShare],
) -> Result<Vec<(MemberId, Money)>, SplitError> {
    let declared = declared_shares(
        participants,
        shares.iter().map(|share| (&share.member_id, share.percent)),
    )?;
    for (member, percent) in &declared {
        if !percent.is_finite() || *percent < 0.0 {
            return Err(SplitError::InvalidAmount(format!(
                "invalid percentage {percent} declared for {member}"
            )));
        }
    }
    let total: f64 = declared.values().sum();
    if (total - 100.0).abs() > PERCENT_TOLERANCE {
        return Err(SplitError::SplitMismatch(format!(
            "percentages sum to {total}, expected 100"
        )));
    }

    // Half-away-from-zero rounding per share, then the drift left by
    // rounding is repaired one minor unit at a time, each unit applied
    // against the currently largest share (strict comparison keeps the
    // earliest of equals). The largest share takes every step, so no share
    // is ever pushed below zero.
    let mut rounded: Vec<(MemberId, i64)> = participants
        .iter()
        .map(|member| {
            let percent = declared[member.as_str()];
            let share = (amount as f64 * percent / 100.0).round() as i64;
            (member.clone(), share)
        })
        .collect();
    let mut drift = amount - rounded.iter().map(|(_, share)| share).sum::<i64>();
    let step = drift.signum();
    while drift != 0 {
        let mut target = 0;
        for (idx, (_, share)) in rounded.iter().enumerate() {
            if *share > rounded[target].1 {
                target = idx;
            }
        }
        rounded[target].1 += step;
        drift -= step;
    }

    Ok(rounded
        .into_iter()
        .map(|(member, share)| (member, Money::from_minor_units(share)))
        .collect())
}

/// Collects a declared share list into a per-member table, rejecting
/// shares for non-participants, duplicate entries, and missing
/// participants. Every participant must be covered exactly once.
fn declared_shares<'a, V: Copy>(
    participants: &'a [MemberId],
    declared: impl IntoIterator<Item = (&'a MemberId, V)>,
) -> Result<BTreeMap<&'a str, V>, SplitError> {
    let participant_set: HashSet<&str> = participants.iter().map(String::as_str).collect();
    let mut table: BTreeMap<&'a str, V> = BTreeMap::new();
    for (member, value) in declared {
        if !participant_set.contains(member.as_str()) {
            return Err(SplitError::InvalidParticipants(format!(
                "share declared for {member}, who is not a participant"
            )));
        }
        if table.insert(member.as_str(), value).is_some() {
            return Err(SplitError::InvalidParticipants(format!(
                "{member} is declared twice in the share list"
            )));
        }
    }
    if let Some(missing) = participants
        .iter()
        .find(|member| !table.contains_key(member.as_str()))
    {
        return Err(SplitError::InvalidParticipants(format!(
            "no share declared for participant {missing}"
        )));
    }
    Ok(table)
}
