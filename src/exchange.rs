use std::collections::BTreeMap;

use serde::Serialize;

use crate::money::Money;
use crate::schemas::MemberId;

/// One settling transfer: `from` pays `to` the (always positive) amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimplifiedDebt {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Money,
}

/// Reduces a net-balance map to the transfers that settle it.
///
/// Greedy matching: each round pairs the member owing the most with the
/// member owed the most and transfers whatever clears one of them. Ties go
/// to the ascending member id, so the output is deterministic. Members with
/// a zero balance never appear. For conserved balances (summing to zero)
/// every balance reaches zero within one fewer transfer than there are
/// members still owing or owed.
pub fn simplify_debts(net_balances: &BTreeMap<MemberId, Money>) -> Vec<SimplifiedDebt> {
    let mut debtors: BTreeMap<&str, i64> = BTreeMap::new();
    let mut creditors: BTreeMap<&str, i64> = BTreeMap::new();
    for (member, balance) in net_balances {
        match balance.signum() {
            -1 => {
                debtors.insert(member, -balance.minor_units());
            }
            1 => {
                creditors.insert(member, balance.minor_units());
            }
            _ => {}
        }
    }

    let mut debts = Vec::new();
    while !debtors.is_empty() && !creditors.is_empty() {
        let debtor = largest_outstanding(&debtors);
        let creditor = largest_outstanding(&creditors);
        let amount = debtors[debtor].min(creditors[creditor]);

        debts.push(SimplifiedDebt {
            from: debtor.to_string(),
            to: creditor.to_string(),
            amount: Money::from_minor_units(amount),
        });
        settle(&mut debtors, debtor, amount);
        settle(&mut creditors, creditor, amount);
    }
    debts
}

// Strict comparison over the id-ordered map keeps the first (smallest id)
// of equally large entries.
fn largest_outstanding<'a>(side: &BTreeMap<&'a str, i64>) -> &'a str {
    let mut best: Option<(&'a str, i64)> = None;
    for (&member, &outstanding) in side {
        match best {
            Some((_, top)) if outstanding <= top => {}
            _ => best = Some((member, outstanding)),
        }
    }
    best.expect("side checked non-empty").0
}

fn settle(side: &mut BTreeMap<&str, i64>, member: &str, amount: i64) {
    if let Some(outstanding) = side.get_mut(member) {
        *outstanding -= amount;
        if *outstanding == 0 {
            side.remove(member);
        }
    }
}
