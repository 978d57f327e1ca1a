//! Read and maintenance commands: ls, check, rebalance.

use serde::Serialize;

use super::{Context, ScopeArgs};
use crate::error::Result;
use crate::item::{OrderedItem, Scope};
use crate::output::{emit_success, reason_label, scope_flags, HumanOutput};
use crate::store::OrderedListStore;
use crate::trigger::RebalanceReason;

pub struct LsOptions {
    pub scope: ScopeArgs,
    pub all: bool,
}

#[derive(Serialize)]
struct LsReport {
    list_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    items: Vec<OrderedItem>,
}

pub fn run_ls(ctx: &Context, opts: LsOptions) -> Result<()> {
    let (orderer, _) = ctx.inline_orderer()?;
    let scope = opts.scope.scope();
    let items = if opts.all {
        orderer.store().list_items(&scope.list_id)?
    } else {
        orderer.siblings(&scope)?
    };

    let mut human = HumanOutput::new(format!("taskorder ls: {scope} ({} items)", items.len()));
    for item in &items {
        human.push_item_row(item);
    }

    let report = LsReport {
        list_id: scope.list_id,
        parent_id: scope.parent_id,
        items,
    };
    emit_success(ctx.options, "ls", &report, Some(&human))
}

#[derive(Serialize)]
struct CheckReport<'a> {
    scope: &'a Scope,
    siblings: usize,
    needs_rebalance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<RebalanceReason>,
}

pub fn run_check(ctx: &Context, scope: &Scope) -> Result<()> {
    let (orderer, _) = ctx.inline_orderer()?;
    let siblings = orderer.siblings(scope)?.len();
    let reason = orderer.check(scope)?;

    let report = CheckReport {
        scope,
        siblings,
        needs_rebalance: reason.is_some(),
        reason,
    };

    let mut human = HumanOutput::new(format!("taskorder check: {scope}"));
    human.push_summary("siblings", siblings.to_string());
    match &reason {
        Some(reason) => {
            human.push_summary("rebalance", format!("needed ({})", reason_label(reason)));
            human.push_next_step(format!("taskorder rebalance {}", scope_flags(scope)));
        }
        None => human.push_summary("rebalance", "not needed"),
    }
    emit_success(ctx.options, "check", &report, Some(&human))
}

pub fn run_rebalance(ctx: &Context, scope: &Scope) -> Result<()> {
    let (orderer, _) = ctx.inline_orderer()?;
    let report = orderer.rebalance_now(scope)?;

    let mut human = HumanOutput::new(format!("taskorder rebalance: {scope}"));
    human.push_summary("items", report.items.to_string());
    human.push_summary("updated", report.updated.to_string());
    human.push_summary("spacing", report.spacing.to_string());
    emit_success(ctx.options, "rebalance", &report, Some(&human))
}
