use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::BalanceError;
use crate::exchange::{simplify_debts, SimplifiedDebt};
use crate::money::{Currency, Money};
use crate::schemas::{Expense, MemberId, Settlement};
use crate::split::compute_splits;

pub type MemberBalances = BTreeMap<MemberId, Money>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CurrencyReport {
    pub net_balances: MemberBalances,
    pub simplified_debts: Vec<SimplifiedDebt>,
}

/// Per-currency balance state of one group, keyed by currency code.
/// Derived on every request, never persisted.
pub type BalanceReport = BTreeMap<Currency, CurrencyReport>;

/// Folds a snapshot of a group's events into per-currency net balances and
/// simplified debts.
///
/// Each currency is balanced independently. Expenses contribute through the
/// split calculator (participants debited, payer credited); a settlement
/// credits its payer and debits its payee. Folding is commutative, so the
/// snapshot may arrive in any order. The caller is expected to have
/// excluded soft-deleted events.
pub fn compute_group_balances(
    expenses: &[Expense],
    settlements: &[Settlement],
) -> Result<BalanceReport, BalanceError> {
    let mut per_currency: BTreeMap<Currency, MemberBalances> = BTreeMap::new();

    for expense in expenses {
        let deltas = compute_splits(expense)?;
        let balances = per_currency.entry(expense.currency.clone()).or_default();
        for (member, delta) in deltas {
            *balances.entry(member).or_insert(Money::zero()) += delta;
        }
    }

    for settlement in settlements {
        let balances = per_currency.entry(settlement.currency.clone()).or_default();
        *balances
            .entry(settlement.payer.clone())
            .or_insert(Money::zero()) += settlement.amount;
        *balances
            .entry(settlement.payee.clone())
            .or_insert(Money::zero()) -= settlement.amount;
    }

    let mut report = BalanceReport::new();
    for (currency, net_balances) in per_currency {
        check_conservation(&currency, &net_balances)?;
        let simplified_debts = simplify_debts(&net_balances);
        report.insert(
            currency,
            CurrencyReport {
                net_balances,
                simplified_debts,
            },
        );
    }
    Ok(report)
}

// Every minor unit credited to someone must be owed by someone else; a
// non-zero residual means a bug or corrupted events, and no report may be
// emitted from it.
fn check_conservation(currency: &Currency, balances: &MemberBalances) -> Result<(), BalanceError> {
    let residual: i64 = balances.values().map(|balance| balance.minor_units()).sum();
    if residual != 0 {
        return Err(BalanceError::Imbalance {
            currency: currency.clone(),
            residual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{ExactShare, Split};
    use chrono::Utc;
    use rstest::rstest;

    fn expense(
        currency: &str,
        amount: i64,
        payer: &str,
        participants: &[&str],
        split: Split,
    ) -> Expense {
        Expense {
            id: format!("e-{payer}-{amount}"),
            group_id: "g1".to_string(),
            description: "shared".to_string(),
            currency: Currency::new(currency),
            amount: Money::from_minor_units(amount),
            payer: payer.to_string(),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            split,
            created_at: Utc::now(),
            deleted: false,
        }
    }

    fn settlement(currency: &str, amount: i64, payer: &str, payee: &str) -> Settlement {
        Settlement {
            id: format!("s-{payer}-{payee}"),
            group_id: "g1".to_string(),
            currency: Currency::new(currency),
            amount: Money::from_minor_units(amount),
            payer: payer.to_string(),
            payee: payee.to_string(),
            created_at: Utc::now(),
            deleted: false,
        }
    }

    fn units(report: &BalanceReport, currency: &str, member: &str) -> i64 {
        report[&Currency::new(currency)].net_balances[member].minor_units()
    }

    #[test]
    fn single_expense_credits_payer_and_debits_participants() {
        let expenses = [expense("USD", 3000, "ana", &["ana", "bo", "cal"], Split::Equal)];
        let report = compute_group_balances(&expenses, &[]).unwrap();

        assert_eq!(units(&report, "USD", "ana"), 2000);
        assert_eq!(units(&report, "USD", "bo"), -1000);
        assert_eq!(units(&report, "USD", "cal"), -1000);

        let debts = &report[&Currency::new("USD")].simplified_debts;
        assert_eq!(
            debts,
            &vec![
                SimplifiedDebt {
                    from: "bo".to_string(),
                    to: "ana".to_string(),
                    amount: Money::from_minor_units(1000),
                },
                SimplifiedDebt {
                    from: "cal".to_string(),
                    to: "ana".to_string(),
                    amount: Money::from_minor_units(1000),
                },
            ]
        );
    }

    #[test]
    fn settlement_moves_balance_from_payee_to_payer() {
        let expenses = [expense("USD", 3000, "ana", &["ana", "bo", "cal"], Split::Equal)];
        let settlements = [settlement("USD", 1000, "bo", "ana")];
        let report = compute_group_balances(&expenses, &settlements).unwrap();

        assert_eq!(units(&report, "USD", "ana"), 1000);
        assert_eq!(units(&report, "USD", "bo"), 0);
        assert_eq!(units(&report, "USD", "cal"), -1000);

        let debts = &report[&Currency::new("USD")].simplified_debts;
        assert_eq!(
            debts,
            &vec![SimplifiedDebt {
                from: "cal".to_string(),
                to: "ana".to_string(),
                amount: Money::from_minor_units(1000),
            }]
        );
    }

    #[test]
    fn currencies_are_balanced_independently() {
        let expenses = [
            expense("USD", 1000, "ana", &["ana", "bo"], Split::Equal),
            expense("EUR", 600, "bo", &["ana", "bo"], Split::Equal),
        ];
        let report = compute_group_balances(&expenses, &[]).unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(units(&report, "USD", "ana"), 500);
        assert_eq!(units(&report, "USD", "bo"), -500);
        assert_eq!(units(&report, "EUR", "ana"), -300);
        assert_eq!(units(&report, "EUR", "bo"), 300);
    }

    #[test]
    fn expense_order_does_not_change_the_report() {
        let first = expense("USD", 1001, "ana", &["ana", "bo", "cal"], Split::Equal);
        let second = expense(
            "USD",
            500,
            "bo",
            &["ana", "bo"],
            Split::Exact(vec![
                ExactShare {
                    member_id: "ana".to_string(),
                    amount: Money::from_minor_units(400),
                },
                ExactShare {
                    member_id: "bo".to_string(),
                    amount: Money::from_minor_units(100),
                },
            ]),
        );
        let settlements = [settlement("USD", 250, "cal", "ana")];

        let forward =
            compute_group_balances(&[first.clone(), second.clone()], &settlements).unwrap();
        let backward = compute_group_balances(&[second, first], &settlements).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn settlements_alone_still_conserve() {
        let settlements = [
            settlement("USD", 700, "bo", "ana"),
            settlement("USD", 300, "cal", "ana"),
        ];
        let report = compute_group_balances(&[], &settlements).unwrap();

        assert_eq!(units(&report, "USD", "ana"), -1000);
        assert_eq!(units(&report, "USD", "bo"), 700);
        assert_eq!(units(&report, "USD", "cal"), 300);
        let total: i64 = report[&Currency::new("USD")]
            .net_balances
            .values()
            .map(|balance| balance.minor_units())
            .sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn empty_snapshot_yields_an_empty_report() {
        let report = compute_group_balances(&[], &[]).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn malformed_stored_expense_fails_the_whole_report() {
        let broken = expense("USD", 0, "ana", &["ana", "bo"], Split::Equal);
        let result = compute_group_balances(&[broken], &[]);
        assert!(matches!(result, Err(BalanceError::Split(_))));
    }

    #[rstest]
    #[case::surplus(&[("ana", 100), ("bo", -40)], 60)]
    #[case::deficit(&[("ana", -5)], -5)]
    fn conservation_check_reports_the_residual(
        #[case] entries: &[(&str, i64)],
        #[case] expected: i64,
    ) {
        let balances: MemberBalances = entries
            .iter()
            .map(|(member, units)| (member.to_string(), Money::from_minor_units(*units)))
            .collect();
        let result = check_conservation(&Currency::new("USD"), &balances);
        assert_eq!(
            result,
            Err(BalanceError::Imbalance {
                currency: Currency::new("USD"),
                residual: expected,
            })
        );
    }

    #[test]
    fn conservation_check_accepts_a_zero_sum() {
        let balances: MemberBalances = [
            ("ana".to_string(), Money::from_minor_units(250)),
            ("bo".to_string(), Money::from_minor_units(-250)),
        ]
        .into_iter()
        .collect();
        assert_eq!(check_conservation(&Currency::new("USD"), &balances), Ok(()));
    }
}
