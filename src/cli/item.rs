//! Item write commands: add, move, reparent, rm, drop-list.

use serde::Serialize;

use super::{Context, PlacementArgs, ScopeArgs};
use crate::error::Result;
use crate::orderer::{NewItem, WriteOutcome};
use crate::output::{emit_success, placement_label, reason_label, HumanOutput};

pub struct AddOptions {
    pub title: String,
    pub scope: ScopeArgs,
    pub placement: PlacementArgs,
}

pub struct MoveOptions {
    pub id: String,
    pub placement: PlacementArgs,
}

pub struct ReparentOptions {
    pub id: String,
    /// `None` moves the item to the top level of its list
    pub parent: Option<String>,
    pub placement: PlacementArgs,
}

pub fn run_add(ctx: &Context, opts: AddOptions) -> Result<()> {
    let new = NewItem {
        title: opts.title,
        list_id: opts.scope.list,
        parent_id: opts.scope.parent,
        intention: opts.placement.intention(),
    };
    let (outcome, warnings) = ctx.write(|orderer| orderer.create(new))?;

    let header = format!("taskorder add: created {}", outcome.item.id);
    emit_outcome(ctx, "add", header, &outcome, warnings)
}

pub fn run_move(ctx: &Context, opts: MoveOptions) -> Result<()> {
    let intention = opts.placement.intention();
    let (outcome, warnings) = ctx.write(|orderer| orderer.move_item(&opts.id, intention))?;

    let header = format!("taskorder move: moved {}", outcome.item.id);
    emit_outcome(ctx, "move", header, &outcome, warnings)
}

pub fn run_reparent(ctx: &Context, opts: ReparentOptions) -> Result<()> {
    let intention = opts.placement.intention();
    let (outcome, warnings) = ctx.write(|orderer| {
        orderer.reparent(&opts.id, opts.parent.as_deref(), intention)
    })?;

    let header = match &outcome.item.scope.parent_id {
        Some(parent) => format!("taskorder reparent: {} now under {parent}", outcome.item.id),
        None => format!("taskorder reparent: {} now at top level", outcome.item.id),
    };
    emit_outcome(ctx, "reparent", header, &outcome, warnings)
}

pub fn run_rm(ctx: &Context, id: &str) -> Result<()> {
    let (orderer, _) = ctx.inline_orderer()?;
    let item = orderer.tombstone(id)?;

    let mut human = HumanOutput::new(format!("taskorder rm: tombstoned {}", item.id));
    human.push_item_summary(&item);
    emit_success(ctx.options, "rm", &item, Some(&human))
}

#[derive(Serialize)]
struct DropListReport<'a> {
    list_id: &'a str,
    removed: usize,
}

pub fn run_drop_list(ctx: &Context, list: &str) -> Result<()> {
    let (orderer, _) = ctx.inline_orderer()?;
    let removed = orderer.delete_list(list)?;

    let report = DropListReport {
        list_id: list,
        removed,
    };
    let mut human = HumanOutput::new(format!("taskorder drop-list: {list}"));
    human.push_summary("removed", removed.to_string());
    emit_success(ctx.options, "drop-list", &report, Some(&human))
}

fn emit_outcome(
    ctx: &Context,
    command: &str,
    header: String,
    outcome: &WriteOutcome,
    warnings: Vec<String>,
) -> Result<()> {
    let mut human = HumanOutput::new(header);
    human.push_item_summary(&outcome.item);
    if let Some(placement) = &outcome.placement {
        human.push_summary("placement", placement_label(placement));
    }
    if let Some(reason) = &outcome.rebalance {
        human.push_detail(format!("scope queued for rebalance ({})", reason_label(reason)));
    }
    for warning in warnings {
        human.push_warning(warning);
    }

    emit_success(ctx.options, command, outcome, Some(&human))
}
