
use crate::{
    group::GROUP_KEY_FIELD,
    stage::{PlanFragment, PlanStage},
    test_support::eval::{EvalOptions, run_fields},
    value::Value,
};

fn run(fragment: &PlanFragment, docs: &[Value], fields: &[&str]) -> Vec<Value> {
    run_fields(fragment, docs, fields, EvalOptions::new()).expect("fragment should evaluate")
}

fn group_row<'a>(rows: &'a [Value], key: &Value) -> &'a Value {
    rows.iter()
        .find(|row| row.get_field(GROUP_KEY_FIELD) == Some(key))
        .unwrap_or_else(|| panic!("no output row for group key {key}"))
}

fn has_stage(fragment: &PlanFragment, pred: impl Fn(&PlanStage) -> bool) -> bool {
    fragment.root.chain().any(pred)
}

const fn is_block_agg(stage: &PlanStage) -> bool {
    matches!(stage, PlanStage::BlockHashAgg(_))
}

const fn is_row_agg(stage: &PlanStage) -> bool {
    matches!(stage, PlanStage::HashAgg(_))
}
