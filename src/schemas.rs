use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Currency, Money};

/// Opaque member identifier, unique within a group.
pub type MemberId = String;

pub type GroupId = String;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<Member>,
}

/// Members carry no balance state; balances are always derived from the
/// event log.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

/// A shared expense. Soft-deleted events keep their document but are
/// excluded from every balance snapshot.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: String,
    pub group_id: GroupId,
    pub description: String,
    pub currency: Currency,
    pub amount: Money,
    pub payer: MemberId,
    pub participants: Vec<MemberId>,
    pub split: Split,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
}

/// Money changing hands outside an expense: `payer` hands `amount` to
/// `payee`, reducing what the payer owes.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Settlement {
    pub id: String,
    pub group_id: GroupId,
    pub currency: Currency,
    pub amount: Money,
    pub payer: MemberId,
    pub payee: MemberId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
}

/// How an expense is divided. Declared shares are always a list of
/// per-member entries, never a map keyed by member id.
#[derive(Clone, Debug, PartialEq, Default, Deserialize, Serialize)]
#[serde(tag = "policy", content = "shares", rename_all = "snake_case")]
pub enum Split {
    #[default]
    Equal,
    Exact(Vec<ExactShare>),
    Percentage(Vec<PercentShare>),
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExactShare {
    pub member_id: MemberId,
    pub amount: Money,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PercentShare {
    pub member_id: MemberId,
    pub percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_defaults_to_equal() {
        assert_eq!(Split::default(), Split::Equal);
    }

    #[test]
    fn splits_serialize_with_policy_and_share_list() {
        let split = Split::Exact(vec![ExactShare {
            member_id: "ana".to_string(),
            amount: Money::from_minor_units(500),
        }]);
        let encoded = serde_json::to_value(&split).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({
                "policy": "exact",
                "shares": [{ "member_id": "ana", "amount": 500 }],
            })
        );

        let equal: Split = serde_json::from_value(serde_json::json!({ "policy": "equal" })).unwrap();
        assert_eq!(equal, Split::Equal);
    }

    #[test]
    fn percentage_shares_round_trip() {
        let split = Split::Percentage(vec![
            PercentShare {
                member_id: "ana".to_string(),
                percent: 66.5,
            },
            PercentShare {
                member_id: "bo".to_string(),
                percent: 33.5,
            },
        ]);
        let encoded = serde_json::to_string(&split).unwrap();
        let decoded: Split = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, split);
    }
}
