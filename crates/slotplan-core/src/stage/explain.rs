use crate::{
    ir::Expr,
    slots::SlotId,
    stage::{AggExprTriple, MergeExpr, PlanStage},
};
use sha2::{Digest, Sha256};
use std::fmt::Write;

pub(super) fn render(root: &PlanStage) -> String {
    let mut out = String::new();
    for (depth, stage) in root.chain().enumerate() {
        let _ = writeln!(out, "{}[{}] {}", "  ".repeat(depth), stage.node_id(), line(stage));
    }

    out
}

pub(super) fn fingerprint(root: &PlanStage) -> String {
    let digest = Sha256::digest(render(root).as_bytes());

    digest.iter().fold(String::with_capacity(64), |mut hex, byte| {
        let _ = write!(hex, "{byte:02x}");
        hex
    })
}

fn line(stage: &PlanStage) -> String {
    match stage {
        PlanStage::Scan(scan) => {
            let mut parts = Vec::new();
            if let Some(result) = scan.result_slot {
                parts.push(format!("{result} = $$ROOT"));
            }
            for field in &scan.fields {
                let kind = if field.block { "block" } else { "scalar" };
                parts.push(format!("{} = {} ({kind})", field.slot, field.name));
            }
            if let Some(bitmap) = scan.block_bitmap {
                parts.push(format!("{bitmap} = bitmap"));
            }
            format!("scan [{}]", parts.join(", "))
        }
        PlanStage::Project { projects, .. } => format!("project [{}]", assignments(projects)),
        PlanStage::BlockToRow {
            blocks,
            rows,
            bitmap,
            ..
        } => format!(
            "block_to_row blocks[{}] rows[{}] {bitmap}",
            slot_list(blocks),
            slot_list(rows)
        ),
        PlanStage::HashAgg(agg) => {
            let mut text = format!(
                "group [{}] [{}]",
                slot_list(&agg.group_by),
                aggregates(&agg.aggs)
            );
            if let Some(collator) = agg.collator {
                let _ = write!(text, " collator {collator}");
            }
            let _ = write!(text, " spill [{}]", merges(&agg.merging));
            text
        }
        PlanStage::BlockHashAgg(agg) => format!(
            "block_group bitset = {} [{}] [{}] [{}] [{}] [{}] spill [{}]",
            agg.selectivity_bitmap,
            slot_list(&agg.group_by),
            aggregates(&agg.aggs),
            slot_list(&agg.block_acc_args),
            agg.bitmap_internal,
            slot_list(&agg.acc_data),
            merges(&agg.merging)
        ),
    }
}

fn slot_list(slots: &[SlotId]) -> String {
    slots
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn assignments(projects: &[(SlotId, Expr)]) -> String {
    projects
        .iter()
        .map(|(slot, expr)| format!("{slot} = {expr}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn aggregates(aggs: &[(SlotId, AggExprTriple)]) -> String {
    aggs.iter()
        .map(|(slot, triple)| {
            let mut text = format!("{slot} = {}", triple.agg);
            if let Some(block) = &triple.block_agg {
                let _ = write!(text, " block {block}");
            }
            if !matches!(triple.init, Expr::Nothing) {
                let _ = write!(text, " init {{{}}}", triple.init);
            }
            text
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn merges(merging: &[MergeExpr]) -> String {
    merging
        .iter()
        .map(|merge| format!("{} = {}", merge.spill_slot, merge.expr))
        .collect::<Vec<_>>()
        .join(", ")
}
