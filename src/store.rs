use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use tracing::debug;

use crate::errors::ApiError;
use crate::schemas::{Expense, Group, Member, Settlement};

/// Data access for groups and their financial events. Expenses and
/// settlements live in their own collections so soft deletes and wholesale
/// replacements stay single-document writes.
pub struct Store {
    groups: Collection<Group>,
    expenses: Collection<Expense>,
    settlements: Collection<Settlement>,
}

// Filters shared by event reads and soft-delete writes. Soft-deleted
// documents stay in the collections and must never match.
fn live_events(group_id: &str) -> Document {
    doc! { "group_id": group_id, "deleted": false }
}

fn live_event(group_id: &str, event_id: &str) -> Document {
    doc! { "id": event_id, "group_id": group_id, "deleted": false }
}

// Matches the group only while the member id is absent from its roster;
// the duplicate check and the push are a single write.
fn member_not_yet_present(group_id: &str, member_id: &str) -> Document {
    doc! { "id": group_id, "members.id": { "$ne": member_id } }
}

fn unique_group_ids() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "id": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        *error.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error))
            if write_error.code == 11000
    )
}

impl Store {
    pub fn new(client: &Client, database: &str) -> Self {
        let database = client.database(database);
        Self {
            groups: database.collection("Groups"),
            expenses: database.collection("Expenses"),
            settlements: database.collection("Settlements"),
        }
    }

    /// Creates the indexes the write paths rely on; run once at startup.
    pub async fn ensure_indexes(&self) -> Result<(), ApiError> {
        self.groups.create_index(unique_group_ids(), None).await?;
        Ok(())
    }

    pub async fn create_group(&self, group: &Group) -> Result<(), ApiError> {
        // The unique index turns a concurrent duplicate insert into a
        // write error instead of a second document.
        match self.groups.insert_one(group, None).await {
            Ok(_) => Ok(()),
            Err(error) if is_duplicate_key(&error) => Err(ApiError::Conflict(format!(
                "group {} already exists",
                group.id
            ))),
            Err(error) => Err(error.into()),
        }
    }

    pub async fn group(&self, group_id: &str) -> Result<Group, ApiError> {
        self.groups
            .find_one(doc! { "id": group_id }, None)
            .await?
            .ok_or_else(|| ApiError::not_found("group", group_id))
    }

    pub async fn add_member(&self, group_id: &str, member: &Member) -> Result<(), ApiError> {
        let updated = self
            .groups
            .update_one(
                member_not_yet_present(group_id, &member.id),
                doc! { "$push": { "members": bson::to_bson(member)? } },
                None,
            )
            .await?;
        if updated.matched_count == 0 {
            // No match is either a missing group or a roster collision;
            // fetching the group tells the two apart.
            self.group(group_id).await?;
            return Err(ApiError::Conflict(format!(
                "member {} already exists in group {group_id}",
                member.id
            )));
        }
        Ok(())
    }

    pub async fn insert_expense(&self, expense: &Expense) -> Result<(), ApiError> {
        self.expenses.insert_one(expense, None).await?;
        Ok(())
    }

    /// Live (non-deleted) expense lookup, used before replacing.
    pub async fn expense(&self, group_id: &str, expense_id: &str) -> Result<Expense, ApiError> {
        self.expenses
            .find_one(live_event(group_id, expense_id), None)
            .await?
            .ok_or_else(|| ApiError::not_found("expense", expense_id))
    }

    pub async fn replace_expense(&self, expense: &Expense) -> Result<(), ApiError> {
        let updated = self
            .expenses
            .replace_one(live_event(&expense.group_id, &expense.id), expense, None)
            .await?;
        if updated.matched_count == 0 {
            return Err(ApiError::not_found("expense", &expense.id));
        }
        Ok(())
    }

    pub async fn soft_delete_expense(
        &self,
        group_id: &str,
        expense_id: &str,
    ) -> Result<(), ApiError> {
        let updated = self
            .expenses
            .update_one(
                live_event(group_id, expense_id),
                doc! { "$set": { "deleted": true } },
                None,
            )
            .await?;
        if updated.matched_count == 0 {
            return Err(ApiError::not_found("expense", expense_id));
        }
        Ok(())
    }

    pub async fn insert_settlement(&self, settlement: &Settlement) -> Result<(), ApiError> {
        self.settlements.insert_one(settlement, None).await?;
        Ok(())
    }

    pub async fn soft_delete_settlement(
        &self,
        group_id: &str,
        settlement_id: &str,
    ) -> Result<(), ApiError> {
        let updated = self
            .settlements
            .update_one(
                live_event(group_id, settlement_id),
                doc! { "$set": { "deleted": true } },
                None,
            )
            .await?;
        if updated.matched_count == 0 {
            return Err(ApiError::not_found("settlement", settlement_id));
        }
        Ok(())
    }

    /// The consistent event set the balance engine folds: every non-deleted
    /// expense and settlement of the group.
    pub async fn snapshot(
        &self,
        group_id: &str,
    ) -> Result<(Vec<Expense>, Vec<Settlement>), ApiError> {
        // Two reads, no session: events are single documents, so any
        // interleaving folds whole events only, and a write landing between
        // the reads is the same as one landing just after the snapshot.
        let expenses: Vec<Expense> = self
            .expenses
            .find(live_events(group_id), None)
            .await?
            .try_collect()
            .await?;
        let settlements: Vec<Settlement> = self
            .settlements
            .find(live_events(group_id), None)
            .await?
            .try_collect()
            .await?;
        debug!(
            group = %group_id,
            expenses = expenses.len(),
            settlements = settlements.len(),
            "snapshot loaded"
        );
        Ok((expenses, settlements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_filter_excludes_soft_deleted_events() {
        assert_eq!(
            live_events("g1"),
            doc! { "group_id": "g1", "deleted": false }
        );
    }

    #[test]
    fn event_filter_pins_id_group_and_liveness() {
        assert_eq!(
            live_event("g1", "e1"),
            doc! { "id": "e1", "group_id": "g1", "deleted": false }
        );
    }

    #[test]
    fn member_guard_only_matches_groups_without_that_member() {
        assert_eq!(
            member_not_yet_present("g1", "ana"),
            doc! { "id": "g1", "members.id": { "$ne": "ana" } }
        );
    }

    #[test]
    fn group_ids_get_a_unique_index() {
        let index = unique_group_ids();
        assert_eq!(index.keys, doc! { "id": 1 });
        assert_eq!(index.options.and_then(|options| options.unique), Some(true));
    }
}
