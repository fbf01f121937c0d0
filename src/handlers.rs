use std::collections::{BTreeMap, HashSet};

use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::authorize;
use crate::balance::{compute_group_balances, BalanceReport};
use crate::config::Config;
use crate::errors::{ApiError, SplitError};
use crate::money::{Currency, Money};
use crate::notify::ChangeNotifier;
use crate::schemas::{Expense, Group, Member, MemberId, Settlement, Split};
use crate::split::participant_shares;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct GroupInput {
    pub name: String,
    #[serde(default)]
    pub members: Vec<Member>,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseInput {
    pub description: String,
    pub currency: Currency,
    pub amount: Money,
    pub payer: MemberId,
    pub participants: Vec<MemberId>,
    #[serde(default)]
    pub split: Split,
}

#[derive(Debug, Deserialize)]
pub struct SettlementInput {
    pub currency: Currency,
    pub amount: Money,
    pub payer: MemberId,
    pub payee: MemberId,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub currency: Option<String>,
}

#[put("/groups/{id}")]
pub async fn add_group(
    request: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<Store>,
    id: web::Path<String>,
    json: web::Json<GroupInput>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &config)?;
    let input = json.into_inner();
    let mut seen = HashSet::new();
    for member in &input.members {
        if !seen.insert(member.id.as_str()) {
            return Err(ApiError::Conflict(format!(
                "member {} is listed twice",
                member.id
            )));
        }
    }
    let group = Group {
        id: id.into_inner(),
        name: input.name,
        members: input.members,
    };
    store.create_group(&group).await?;
    info!(group = %group.id, members = group.members.len(), "group created");
    Ok(HttpResponse::Created().json(group))
}

#[get("/groups/{id}")]
pub async fn get_group(
    store: web::Data<Store>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let group = store.group(&id).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[post("/groups/{id}/members")]
pub async fn add_member(
    request: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<Store>,
    id: web::Path<String>,
    json: web::Json<Member>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &config)?;
    let member = json.into_inner();
    store.add_member(&id, &member).await?;
    info!(group = %id.as_str(), member = %member.id, "member added");
    Ok(HttpResponse::Created().json(member))
}

#[post("/groups/{id}/expenses")]
pub async fn add_expense(
    request: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<Store>,
    notifier: web::Data<dyn ChangeNotifier>,
    id: web::Path<String>,
    json: web::Json<ExpenseInput>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &config)?;
    let group = store.group(&id).await?;
    let expense = build_expense(&group, ObjectId::new().to_hex(), json.into_inner(), Utc::now())?;
    store.insert_expense(&expense).await?;
    info!(
        group = %group.id,
        expense = %expense.id,
        amount = expense.amount.minor_units(),
        currency = expense.currency.code(),
        "expense recorded"
    );
    notifier.balances_changed(&group.id);
    Ok(HttpResponse::Created().json(expense))
}

#[put("/groups/{id}/expenses/{expense_id}")]
pub async fn update_expense(
    request: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<Store>,
    notifier: web::Data<dyn ChangeNotifier>,
    path: web::Path<(String, String)>,
    json: web::Json<ExpenseInput>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &config)?;
    let (group_id, expense_id) = path.into_inner();
    let group = store.group(&group_id).await?;
    let existing = store.expense(&group_id, &expense_id).await?;
    let expense = build_expense(&group, existing.id, json.into_inner(), existing.created_at)?;
    store.replace_expense(&expense).await?;
    info!(group = %group.id, expense = %expense.id, "expense replaced");
    notifier.balances_changed(&group.id);
    Ok(HttpResponse::Ok().json(expense))
}

#[delete("/groups/{id}/expenses/{expense_id}")]
pub async fn delete_expense(
    request: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<Store>,
    notifier: web::Data<dyn ChangeNotifier>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &config)?;
    let (group_id, expense_id) = path.into_inner();
    store.soft_delete_expense(&group_id, &expense_id).await?;
    info!(group = %group_id, expense = %expense_id, "expense soft-deleted");
    notifier.balances_changed(&group_id);
    Ok(HttpResponse::NoContent().finish())
}

#[post("/groups/{id}/settlements")]
pub async fn add_settlement(
    request: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<Store>,
    notifier: web::Data<dyn ChangeNotifier>,
    id: web::Path<String>,
    json: web::Json<SettlementInput>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &config)?;
    let group = store.group(&id).await?;
    let input = json.into_inner();
    let settlement = build_settlement(&group, ObjectId::new().to_hex(), input, Utc::now())?;
    store.insert_settlement(&settlement).await?;
    info!(
        group = %group.id,
        settlement = %settlement.id,
        payer = %settlement.payer,
        payee = %settlement.payee,
        amount = settlement.amount.minor_units(),
        currency = settlement.currency.code(),
        "settlement recorded"
    );
    notifier.balances_changed(&group.id);
    Ok(HttpResponse::Created().json(settlement))
}

#[delete("/groups/{id}/settlements/{settlement_id}")]
pub async fn delete_settlement(
    request: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<Store>,
    notifier: web::Data<dyn ChangeNotifier>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &config)?;
    let (group_id, settlement_id) = path.into_inner();
    store.soft_delete_settlement(&group_id, &settlement_id).await?;
    info!(group = %group_id, settlement = %settlement_id, "settlement soft-deleted");
    notifier.balances_changed(&group_id);
    Ok(HttpResponse::NoContent().finish())
}

#[get("/groups/{id}/balance")]
pub async fn get_balance(
    store: web::Data<Store>,
    id: web::Path<String>,
    query: web::Query<BalanceQuery>,
) -> Result<HttpResponse, ApiError> {
    let group = store.group(&id).await?;
    let (expenses, settlements) = store.snapshot(&group.id).await?;
    let report = compute_group_balances(&expenses, &settlements).map_err(|err| {
        error!(
            group = %group.id,
            expenses = expenses.len(),
            settlements = settlements.len(),
            %err,
            "balance aggregation failed"
        );
        ApiError::Balance(err)
    })?;
    let report = filter_report(report, query.currency.as_deref());
    Ok(HttpResponse::Ok().json(render_report(report)))
}

/// Validates expense input against the group and the split calculator
/// before anything is written. Participants and the payer must be group
/// members; the declared split must survive `participant_shares`.
fn build_expense(
    group: &Group,
    id: String,
    input: ExpenseInput,
    created_at: DateTime<Utc>,
) -> Result<Expense, ApiError> {
    ensure_group_members(
        group,
        std::iter::once(&input.payer).chain(input.participants.iter()),
    )?;
    let expense = Expense {
        id,
        group_id: group.id.clone(),
        description: input.description,
        currency: input.currency,
        amount: input.amount,
        payer: input.payer,
        participants: input.participants,
        split: input.split,
        created_at,
        deleted: false,
    };
    participant_shares(&expense)?;
    Ok(expense)
}

fn build_settlement(
    group: &Group,
    id: String,
    input: SettlementInput,
    created_at: DateTime<Utc>,
) -> Result<Settlement, ApiError> {
    if input.amount.minor_units() <= 0 {
        return Err(SplitError::InvalidAmount(format!(
            "settlement amount {} is not a positive number of minor units",
            input.amount
        ))
        .into());
    }
    if input.payer == input.payee {
        return Err(SplitError::InvalidParticipants(format!(
            "settlement payer and payee are both {}",
            input.payer
        ))
        .into());
    }
    ensure_group_members(group, [&input.payer, &input.payee].into_iter())?;
    Ok(Settlement {
        id,
        group_id: group.id.clone(),
        currency: input.currency,
        amount: input.amount,
        payer: input.payer,
        payee: input.payee,
        created_at,
        deleted: false,
    })
}

fn ensure_group_members<'a>(
    group: &Group,
    mut ids: impl Iterator<Item = &'a MemberId>,
) -> Result<(), ApiError> {
    if let Some(unknown) =
        ids.find(|id| !group.members.iter().any(|member| &member.id == *id))
    {
        return Err(SplitError::InvalidParticipants(format!(
            "{unknown} is not a member of group {}",
            group.id
        ))
        .into());
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct AmountBody {
    amount: Money,
    display: String,
}

#[derive(Debug, Serialize)]
struct DebtBody {
    from: MemberId,
    to: MemberId,
    amount: Money,
    display: String,
}

#[derive(Debug, Serialize)]
struct CurrencyReportBody {
    net_balances: BTreeMap<MemberId, AmountBody>,
    simplified_debts: Vec<DebtBody>,
}

/// Narrows a report to one currency when the query asks for it. The code
/// goes through `Currency::new` so `?currency=usd` matches `USD`.
fn filter_report(report: BalanceReport, currency: Option<&str>) -> BalanceReport {
    match currency {
        Some(code) => {
            let wanted = Currency::new(code);
            report
                .into_iter()
                .filter(|(currency, _)| *currency == wanted)
                .collect()
        }
        None => report,
    }
}

// Integer minor units stay authoritative in the payload; the display
// strings are a convenience rendered at the currency's exponent.
fn render_report(report: BalanceReport) -> BTreeMap<Currency, CurrencyReportBody> {
    report
        .into_iter()
        .map(|(currency, summary)| {
            let net_balances = summary
                .net_balances
                .into_iter()
                .map(|(member, amount)| {
                    let display = amount.display_in(&currency);
                    (member, AmountBody { amount, display })
                })
                .collect();
            let simplified_debts = summary
                .simplified_debts
                .into_iter()
                .map(|debt| {
                    let display = debt.amount.display_in(&currency);
                    DebtBody {
                        from: debt.from,
                        to: debt.to,
                        amount: debt.amount,
                        display,
                    }
                })
                .collect();
            (
                currency,
                CurrencyReportBody {
                    net_balances,
                    simplified_debts,
                },
            )
        })
        .collect()
}
