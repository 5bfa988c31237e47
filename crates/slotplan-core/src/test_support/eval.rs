//! Reference evaluator for compiled group fragments.
//!
//! Executes a `PlanFragment` over in-memory documents so tests can check
//! execution-level behavior: block/scalar equivalence, spill-merge recovery
//! and finalization. Malformed plans panic.

use crate::{
    ir::{
        ACCUMULATOR_N_ITEMS, ACCUMULATOR_N_LIMIT, AggFunc, Builtin, EvalError, Expr,
        accumulator_n_items, eval_builtin,
    },
    slots::{SlotId, SlotName},
    stage::{AggExprTriple, BlockHashAggStage, HashAggStage, MergeExpr, PlanFragment, PlanStage, ScanStage},
    state::RuntimeEnvironment,
    value::{Value, canonical_cmp, canonical_cmp_optional},
};
use std::{cmp::Ordering, collections::BTreeMap};

///
/// RtValue
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RtValue {
    Scalar(Option<Value>),
    Block(Vec<Option<Value>>),
}

impl RtValue {
    fn into_scalar(self) -> Option<Value> {
        match self {
            Self::Scalar(value) => value,
            Self::Block(_) => panic!("expected a scalar operand, found a block"),
        }
    }

    fn element(&self, index: usize) -> Option<Value> {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Block(items) => items[index].clone(),
        }
    }

    fn selection(&self) -> Vec<bool> {
        match self {
            Self::Block(items) => items
                .iter()
                .map(|item| matches!(item, Some(Value::Bool(true))))
                .collect(),
            Self::Scalar(_) => panic!("a selectivity bitmap must be a block"),
        }
    }
}

pub(crate) type Frame = BTreeMap<SlotId, RtValue>;

///
/// EvalOptions
///

#[derive(Clone, Copy, Debug)]
pub(crate) struct EvalOptions {
    /// Documents per batch when the scan emits blocks.
    pub batch_size: usize,
    /// Spill the in-memory aggregation table after this many inputs.
    pub spill_every: Option<usize>,
    /// Batches with more distinct keys than this use the row aggregates.
    pub row_agg_threshold: usize,
}

impl EvalOptions {
    pub(crate) const fn new() -> Self {
        Self {
            batch_size: 4,
            spill_every: None,
            row_agg_threshold: 2,
        }
    }

    pub(crate) const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub(crate) const fn with_spill_every(mut self, inputs: usize) -> Self {
        self.spill_every = Some(inputs);
        self
    }
}

/// Run a fragment and return its output frames.
pub(crate) fn execute(
    fragment: &PlanFragment,
    docs: &[Value],
    options: EvalOptions,
) -> Result<Vec<Frame>, EvalError> {
    Evaluator {
        env: &fragment.environment,
        options,
    }
    .run(&fragment.root, docs)
}

/// Run a fragment and read the named output fields of every row into an
/// object, absent values omitted. Rows come back in canonical order.
pub(crate) fn run_fields(
    fragment: &PlanFragment,
    docs: &[Value],
    fields: &[&str],
    options: EvalOptions,
) -> Result<Vec<Value>, EvalError> {
    let frames = execute(fragment, docs, options)?;
    let evaluator = Evaluator {
        env: &fragment.environment,
        options,
    };

    let mut rows: Vec<Value> = frames
        .iter()
        .map(|frame| {
            let values = fields.iter().filter_map(|name| {
                let slot = fragment
                    .outputs
                    .field(name)
                    .unwrap_or_else(|| panic!("fragment does not publish field {name}"));
                evaluator
                    .slot_value(frame, slot.id())
                    .into_scalar()
                    .map(|value| (*name, value))
            });
            Value::object(values)
        })
        .collect();
    rows.sort_by(canonical_cmp);

    Ok(rows)
}

/// Run a fragment and read its materialized result record from every row.
pub(crate) fn run_result_obj(
    fragment: &PlanFragment,
    docs: &[Value],
    options: EvalOptions,
) -> Result<Vec<Value>, EvalError> {
    let slot = fragment
        .outputs
        .require(&SlotName::ResultObj)
        .expect("fragment should materialize a result record")
        .id();
    let frames = execute(fragment, docs, options)?;
    let evaluator = Evaluator {
        env: &fragment.environment,
        options,
    };

    let mut rows: Vec<Value> = frames
        .iter()
        .map(|frame| {
            evaluator
                .slot_value(frame, slot)
                .into_scalar()
                .expect("result record should be present")
        })
        .collect();
    rows.sort_by(canonical_cmp);

    Ok(rows)
}

///
/// GroupTable
///
/// Aggregation table keyed by canonical key equality, in first-seen order.
///

#[derive(Default)]
struct GroupTable {
    groups: Vec<(Vec<Option<Value>>, Vec<Option<Value>>)>,
}

impl GroupTable {
    fn position(&self, key: &[Option<Value>]) -> Option<usize> {
        self.groups
            .iter()
            .position(|(existing, _)| keys_equal(existing, key))
    }

    fn states_mut(
        &mut self,
        key: Vec<Option<Value>>,
        init: impl FnOnce() -> Result<Vec<Option<Value>>, EvalError>,
    ) -> Result<&mut Vec<Option<Value>>, EvalError> {
        let index = match self.position(&key) {
            Some(index) => index,
            None => {
                self.groups.push((key, init()?));
                self.groups.len() - 1
            }
        };

        Ok(&mut self.groups[index].1)
    }
}

fn keys_equal(left: &[Option<Value>], right: &[Option<Value>]) -> bool {
    left.len() == right.len()
        && left.iter().zip(right).all(|(left, right)| {
            canonical_cmp_optional(left.as_ref(), right.as_ref()) == Ordering::Equal
        })
}

struct Evaluator<'a> {
    env: &'a RuntimeEnvironment,
    options: EvalOptions,
}

impl Evaluator<'_> {
    fn run(&self, stage: &PlanStage, docs: &[Value]) -> Result<Vec<Frame>, EvalError> {
        match stage {
            PlanStage::Scan(scan) => Ok(self.scan(scan, docs)),
            PlanStage::Project {
                input, projects, ..
            } => {
                let mut frames = self.run(input, docs)?;
                for frame in &mut frames {
                    for (slot, expr) in projects {
                        let value = self.eval(expr, frame)?;
                        frame.insert(*slot, value);
                    }
                }
                Ok(frames)
            }
            PlanStage::BlockToRow {
                input,
                blocks,
                rows,
                bitmap,
                ..
            } => {
                let frames = self.run(input, docs)?;
                Ok(frames
                    .iter()
                    .flat_map(|frame| self.block_to_row(frame, blocks, rows, *bitmap))
                    .collect())
            }
            PlanStage::HashAgg(agg) => self.hash_agg(agg, docs),
            PlanStage::BlockHashAgg(agg) => self.block_hash_agg(agg, docs),
        }
    }

    fn scan(&self, scan: &ScanStage, docs: &[Value]) -> Vec<Frame> {
        let read = |doc: &Value, name: &str| doc.get_field(name).cloned();

        let Some(bitmap) = scan.block_bitmap else {
            return docs
                .iter()
                .map(|doc| {
                    let mut frame = Frame::new();
                    if let Some(slot) = scan.result_slot {
                        frame.insert(slot, RtValue::Scalar(Some(doc.clone())));
                    }
                    for field in &scan.fields {
                        frame.insert(field.slot, RtValue::Scalar(read(doc, &field.name)));
                    }
                    frame
                })
                .collect();
        };

        docs.chunks(self.options.batch_size.max(1))
            .map(|batch| {
                let mut frame = Frame::new();
                for field in &scan.fields {
                    let items = batch.iter().map(|doc| read(doc, &field.name)).collect();
                    frame.insert(field.slot, RtValue::Block(items));
                }
                frame.insert(
                    bitmap,
                    RtValue::Block(vec![Some(Value::Bool(true)); batch.len()]),
                );
                frame
            })
            .collect()
    }

    fn block_to_row(
        &self,
        frame: &Frame,
        blocks: &[SlotId],
        rows: &[SlotId],
        bitmap: SlotId,
    ) -> Vec<Frame> {
        let selected = self.slot_value(frame, bitmap).selection();
        let scalars: Frame = frame
            .iter()
            .filter(|(_, value)| matches!(value, RtValue::Scalar(_)))
            .map(|(slot, value)| (*slot, value.clone()))
            .collect();

        selected
            .iter()
            .enumerate()
            .filter(|(_, selected)| **selected)
            .map(|(index, _)| {
                let mut row = scalars.clone();
                for (block, slot) in blocks.iter().zip(rows) {
                    let value = self.slot_value(frame, *block).element(index);
                    row.insert(*slot, RtValue::Scalar(value));
                }
                row
            })
            .collect()
    }

    fn init_states(
        &self,
        aggs: &[(SlotId, AggExprTriple)],
        frame: &Frame,
    ) -> Result<Vec<Option<Value>>, EvalError> {
        aggs.iter()
            .map(|(_, triple)| Ok(self.eval(&triple.init, frame)?.into_scalar()))
            .collect()
    }

    fn hash_agg(&self, agg: &HashAggStage, docs: &[Value]) -> Result<Vec<Frame>, EvalError> {
        let frames = self.run(&agg.input, docs)?;
        let mut table = GroupTable::default();
        let mut spilled = Vec::new();

        for (index, frame) in frames.iter().enumerate() {
            let key = agg
                .group_by
                .iter()
                .map(|slot| self.slot_value(frame, *slot).into_scalar())
                .collect();
            let states = table.states_mut(key, || self.init_states(&agg.aggs, frame))?;
            for ((_, triple), state) in agg.aggs.iter().zip(states.iter_mut()) {
                *state = self.eval_agg(&triple.agg, state.take(), frame)?;
            }
            self.maybe_spill(index + 1, &mut table, &mut spilled);
        }

        let table = self.merge_spilled(table, spilled, &agg.merging)?;

        Ok(table
            .groups
            .into_iter()
            .map(|(key, states)| {
                let mut frame = Frame::new();
                for (slot, value) in agg.group_by.iter().zip(key) {
                    frame.insert(*slot, RtValue::Scalar(value));
                }
                for ((slot, _), state) in agg.aggs.iter().zip(states) {
                    frame.insert(*slot, RtValue::Scalar(state));
                }
                frame
            })
            .collect())
    }

    fn block_hash_agg(
        &self,
        agg: &BlockHashAggStage,
        docs: &[Value],
    ) -> Result<Vec<Frame>, EvalError> {
        let frames = self.run(&agg.input, docs)?;
        let mut table = GroupTable::default();
        let mut spilled = Vec::new();

        for (index, frame) in frames.iter().enumerate() {
            let selected = self.slot_value(frame, agg.selectivity_bitmap).selection();
            let keys: Vec<RtValue> = agg
                .group_by
                .iter()
                .map(|slot| self.slot_value(frame, *slot))
                .collect();

            let mut batch: Vec<(Vec<Option<Value>>, Vec<usize>)> = Vec::new();
            for (row, _) in selected.iter().enumerate().filter(|(_, selected)| **selected) {
                let key: Vec<Option<Value>> = keys.iter().map(|key| key.element(row)).collect();
                match batch.iter_mut().find(|(existing, _)| keys_equal(existing, &key)) {
                    Some((_, rows)) => rows.push(row),
                    None => batch.push((key, vec![row])),
                }
            }

            let use_rows = batch.len() > self.options.row_agg_threshold;
            for (key, rows) in batch {
                let states = table.states_mut(key, || self.init_states(&agg.aggs, frame))?;
                if use_rows {
                    for row in rows {
                        let mut scope = Frame::new();
                        for (arg, data) in agg.block_acc_args.iter().zip(&agg.acc_data) {
                            let value = self.slot_value(frame, *arg).element(row);
                            scope.insert(*data, RtValue::Scalar(value));
                        }
                        for ((_, triple), state) in agg.aggs.iter().zip(states.iter_mut()) {
                            *state = self.eval_agg(&triple.agg, state.take(), &scope)?;
                        }
                    }
                } else {
                    let mask = (0..selected.len())
                        .map(|row| Some(Value::Bool(rows.contains(&row))))
                        .collect();
                    let mut scope = Frame::new();
                    scope.insert(agg.bitmap_internal, RtValue::Block(mask));
                    for (arg, data) in agg.block_acc_args.iter().zip(&agg.acc_data) {
                        scope.insert(*data, self.slot_value(frame, *arg));
                    }
                    for ((_, triple), state) in agg.aggs.iter().zip(states.iter_mut()) {
                        let block_agg = triple
                            .block_agg
                            .as_ref()
                            .expect("block aggregation requires block partial aggregates");
                        *state = self.eval_agg(block_agg, state.take(), &scope)?;
                    }
                }
            }
            self.maybe_spill(index + 1, &mut table, &mut spilled);
        }

        let table = self.merge_spilled(table, spilled, &agg.merging)?;
        if table.groups.is_empty() {
            return Ok(Vec::new());
        }

        let count = table.groups.len();
        let mut key_columns = vec![Vec::with_capacity(count); agg.group_by_out.len()];
        let mut agg_columns = vec![Vec::with_capacity(count); agg.aggs.len()];
        for (key, states) in table.groups {
            for (column, value) in key_columns.iter_mut().zip(key) {
                column.push(value);
            }
            for (column, value) in agg_columns.iter_mut().zip(states) {
                column.push(value);
            }
        }

        let mut out = Frame::new();
        for (slot, column) in agg.group_by_out.iter().zip(key_columns) {
            out.insert(*slot, RtValue::Block(column));
        }
        for ((slot, _), column) in agg.aggs.iter().zip(agg_columns) {
            out.insert(*slot, RtValue::Block(column));
        }
        out.insert(
            agg.selectivity_bitmap,
            RtValue::Block(vec![Some(Value::Bool(true)); count]),
        );

        Ok(vec![out])
    }

    fn maybe_spill(&self, processed: usize, table: &mut GroupTable, spilled: &mut Vec<GroupTable>) {
        if let Some(every) = self.options.spill_every
            && processed % every.max(1) == 0
        {
            spilled.push(std::mem::take(table));
        }
    }

    // Partial tables are recombined in spill order through the merge
    // expressions, with each spill slot bound to one partial aggregate.
    fn merge_spilled(
        &self,
        table: GroupTable,
        spilled: Vec<GroupTable>,
        merging: &[MergeExpr],
    ) -> Result<GroupTable, EvalError> {
        if spilled.is_empty() {
            return Ok(table);
        }

        let mut merged = GroupTable::default();
        for part in spilled.into_iter().chain(std::iter::once(table)) {
            for (key, partials) in part.groups {
                let Some(index) = merged.position(&key) else {
                    merged.groups.push((key, partials));
                    continue;
                };
                let running = &mut merged.groups[index].1;
                assert_eq!(running.len(), merging.len(), "one merge expression per aggregate");
                for ((merge, state), partial) in merging.iter().zip(running.iter_mut()).zip(partials) {
                    let mut scope = Frame::new();
                    scope.insert(merge.spill_slot, RtValue::Scalar(partial));
                    *state = self.eval_agg(&merge.expr, state.take(), &scope)?;
                }
            }
        }

        Ok(merged)
    }

    fn slot_value(&self, frame: &Frame, slot: SlotId) -> RtValue {
        if let Some(value) = frame.get(&slot) {
            return value.clone();
        }

        let entry = self
            .env
            .get(slot)
            .unwrap_or_else(|| panic!("slot {slot} is neither bound nor in the environment"));

        RtValue::Scalar(entry.value.clone())
    }

    fn eval(&self, expr: &Expr, frame: &Frame) -> Result<RtValue, EvalError> {
        match expr {
            Expr::Constant(value) => Ok(RtValue::Scalar(Some(value.clone()))),
            Expr::Nothing => Ok(RtValue::Scalar(None)),
            Expr::Slot(slot) => Ok(self.slot_value(frame, *slot)),
            Expr::Fail { code, message } => Err(EvalError::Fail {
                code: *code,
                message: message.clone(),
            }),
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.eval(cond, frame)?.into_scalar();
                if cond.as_ref().is_some_and(Value::is_truthy) {
                    self.eval(then, frame)
                } else {
                    self.eval(otherwise, frame)
                }
            }
            Expr::Function { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, frame))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, args)
            }
            Expr::Aggregate { .. } => panic!("aggregate outside an aggregate slot: {expr}"),
        }
    }

    fn eval_agg(
        &self,
        expr: &Expr,
        state: Option<Value>,
        frame: &Frame,
    ) -> Result<Option<Value>, EvalError> {
        let Expr::Aggregate { func, args } = expr else {
            panic!("expected an aggregate expression, found {expr}");
        };
        let args = args
            .iter()
            .map(|arg| self.eval(arg, frame))
            .collect::<Result<Vec<_>, _>>()?;

        if func.is_block() {
            return block_aggregate(*func, state, args);
        }
        let args: Vec<Option<Value>> = args.into_iter().map(RtValue::into_scalar).collect();

        row_aggregate(*func, state, &args)
    }
}

fn call(func: Builtin, args: Vec<RtValue>) -> Result<RtValue, EvalError> {
    if func == Builtin::BlockBroadcast {
        let [value, bitmap]: [RtValue; 2] = args.try_into().expect("broadcast takes two operands");
        let len = bitmap.selection().len();
        return Ok(RtValue::Block(vec![value.into_scalar(); len]));
    }

    if let Some(scalar) = func.scalar_equivalent() {
        let len = args
            .iter()
            .find_map(|arg| match arg {
                RtValue::Block(items) => Some(items.len()),
                RtValue::Scalar(_) => None,
            })
            .expect("block function needs a block operand");
        let mut out = Vec::with_capacity(len);
        for index in 0..len {
            let row: Vec<Option<Value>> = args.iter().map(|arg| arg.element(index)).collect();
            out.push(eval_builtin(scalar, &row)?);
        }
        return Ok(RtValue::Block(out));
    }

    let args: Vec<Option<Value>> = args.into_iter().map(RtValue::into_scalar).collect();

    Ok(RtValue::Scalar(eval_builtin(func, &args)?))
}

fn arg(args: &[Option<Value>], index: usize) -> Option<Value> {
    args.get(index).cloned().flatten()
}

fn add_numeric(total: Option<Value>, value: Option<&Value>) -> Result<Option<Value>, EvalError> {
    let total = total.unwrap_or(Value::Int(0));
    match value {
        Some(value) if value.is_numeric() => eval_builtin(Builtin::Add, &[Some(total), Some(value.clone())]),
        _ => Ok(Some(total)),
    }
}

// Nulls and absent values never win a min/max comparison.
fn pick(state: Option<Value>, value: Option<Value>, wanted: Ordering) -> Option<Value> {
    match (state, value) {
        (state, None | Some(Value::Null)) => state,
        (None | Some(Value::Null), value) => value,
        (Some(state), Some(value)) => {
            if canonical_cmp(&value, &state) == wanted {
                Some(value)
            } else {
                Some(state)
            }
        }
    }
}

fn array_items(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => Vec::new(),
        Some(other) => panic!("expected an array operand, found {other}"),
    }
}

fn n_state(state: Option<&Value>) -> (usize, Vec<Value>) {
    let state = state.expect("bounded accumulator state must be initialized");
    let limit = state
        .get_field(ACCUMULATOR_N_LIMIT)
        .and_then(Value::as_i64)
        .and_then(|limit| usize::try_from(limit).ok())
        .expect("bounded accumulator state must carry its limit");
    let items = accumulator_n_items(Some(state))
        .expect("bounded accumulator state must carry its items")
        .to_vec();

    (limit, items)
}

fn n_value(limit: usize, items: Vec<Value>) -> Value {
    let limit = i64::try_from(limit).expect("limit fits in i64");

    Value::object([
        (ACCUMULATOR_N_LIMIT, Value::Int(limit)),
        (ACCUMULATOR_N_ITEMS, Value::Array(items)),
    ])
}

/// Order two ranked keys under a sort specification object.
///
/// Multi-part specifications compare array keys component-wise.
fn compare_sort_keys(spec: &Value, left: &Value, right: &Value) -> Ordering {
    let directions: Vec<bool> = spec
        .as_object()
        .unwrap_or_default()
        .iter()
        .map(|(_, dir)| !matches!(dir, Value::Int(d) if *d < 0))
        .collect();

    if directions.len() <= 1 {
        let ord = canonical_cmp(left, right);
        return if directions.first().copied().unwrap_or(true) {
            ord
        } else {
            ord.reverse()
        };
    }

    let (Some(left), Some(right)) = (left.as_array(), right.as_array()) else {
        return canonical_cmp(left, right);
    };
    for ((left, right), ascending) in left.iter().zip(right).zip(directions) {
        let ord = canonical_cmp(left, right);
        if ord != Ordering::Equal {
            return if ascending { ord } else { ord.reverse() };
        }
    }

    Ordering::Equal
}

// Items are `[sort key, value]` pairs kept in sort order.
fn insert_ranked(items: &mut Vec<Value>, pair: Value, spec: &Value, limit: usize, bottom: bool) {
    let key = |pair: &Value| pair.as_array().and_then(|pair| pair.first()).cloned().unwrap_or(Value::Null);

    items.push(pair);
    items.sort_by(|left, right| compare_sort_keys(spec, &key(left), &key(right)));
    if items.len() > limit {
        if bottom {
            items.drain(..items.len() - limit);
        } else {
            items.truncate(limit);
        }
    }
}

fn row_aggregate(
    func: AggFunc,
    state: Option<Value>,
    args: &[Option<Value>],
) -> Result<Option<Value>, EvalError> {
    let value = arg(args, 0);

    let next = match func {
        AggFunc::Sum => add_numeric(state, value.as_ref())?,
        AggFunc::CountNumeric => {
            let counted = value.as_ref().filter(|value| value.is_numeric()).map(|_| Value::Int(1));
            add_numeric(state, counted.as_ref())?
        }
        AggFunc::Min => pick(state, value, Ordering::Less),
        AggFunc::Max => pick(state, value, Ordering::Greater),
        AggFunc::First => state.or(value),
        AggFunc::Last => value.or(state),
        AggFunc::Push => {
            let mut items = array_items(state);
            items.extend(value);
            Some(Value::Array(items))
        }
        AggFunc::AddToSet => {
            let mut items = array_items(state);
            if let Some(value) = value
                && !items.iter().any(|item| canonical_cmp(item, &value) == Ordering::Equal)
            {
                items.push(value);
            }
            Some(Value::Array(items))
        }
        AggFunc::ConcatArrays => {
            let mut items = array_items(state);
            items.extend(array_items(value));
            Some(Value::Array(items))
        }
        AggFunc::SetUnion => {
            let mut items = array_items(state);
            for value in array_items(value) {
                if !items.iter().any(|item| canonical_cmp(item, &value) == Ordering::Equal) {
                    items.push(value);
                }
            }
            Some(Value::Array(items))
        }
        AggFunc::FirstN => {
            let (limit, mut items) = n_state(state.as_ref());
            if items.len() < limit {
                items.push(value.unwrap_or(Value::Null));
            }
            Some(n_value(limit, items))
        }
        AggFunc::LastN => {
            let (limit, mut items) = n_state(state.as_ref());
            items.push(value.unwrap_or(Value::Null));
            if items.len() > limit {
                items.remove(0);
            }
            Some(n_value(limit, items))
        }
        AggFunc::TopN { bottom } => {
            let (limit, mut items) = n_state(state.as_ref());
            let key = arg(args, 1).unwrap_or(Value::Null);
            let spec = arg(args, 2).expect("top/bottom needs its sort specification");
            let pair = Value::Array(vec![key, value.unwrap_or(Value::Null)]);
            insert_ranked(&mut items, pair, &spec, limit, bottom);
            Some(n_value(limit, items))
        }
        AggFunc::MergeFirstN => {
            let (limit, mut items) = n_state(state.as_ref());
            let (_, partial) = n_state(value.as_ref());
            for item in partial {
                if items.len() < limit {
                    items.push(item);
                }
            }
            Some(n_value(limit, items))
        }
        AggFunc::MergeLastN => {
            let (limit, mut items) = n_state(state.as_ref());
            let (_, partial) = n_state(value.as_ref());
            items.extend(partial);
            let excess = items.len().saturating_sub(limit);
            items.drain(..excess);
            Some(n_value(limit, items))
        }
        AggFunc::MergeTopN { bottom } => {
            let (limit, mut items) = n_state(state.as_ref());
            let (_, partial) = n_state(value.as_ref());
            let spec = arg(args, 1).expect("top/bottom merge needs its sort specification");
            for pair in partial {
                insert_ranked(&mut items, pair, &spec, limit, bottom);
            }
            Some(n_value(limit, items))
        }
        AggFunc::BlockSum
        | AggFunc::BlockCountNumeric
        | AggFunc::BlockMin
        | AggFunc::BlockMax
        | AggFunc::BlockTopN { .. } => panic!("{func} is a block aggregate"),
    };

    Ok(next)
}

// Block aggregates fold the selected positions through their row twin.
fn block_aggregate(
    func: AggFunc,
    state: Option<Value>,
    args: Vec<RtValue>,
) -> Result<Option<Value>, EvalError> {
    let mut args = args.into_iter();
    let selected = args.next().expect("block aggregates start with a bitmap").selection();
    let rows = selected
        .iter()
        .enumerate()
        .filter(|(_, selected)| **selected)
        .map(|(row, _)| row);

    let row_func = match func {
        AggFunc::BlockSum => AggFunc::Sum,
        AggFunc::BlockCountNumeric => AggFunc::CountNumeric,
        AggFunc::BlockMin => AggFunc::Min,
        AggFunc::BlockMax => AggFunc::Max,
        AggFunc::BlockTopN {
            bottom,
            values,
            value_is_array,
            keys_multi,
        } => {
            let spec = args.next().expect("block top/bottom needs a sort specification").into_scalar();
            let rest: Vec<RtValue> = args.collect();
            let (value_blocks, key_blocks) = rest.split_at(values);

            let mut state = state;
            for row in rows {
                let value = if value_is_array {
                    Some(Value::Array(
                        value_blocks
                            .iter()
                            .map(|block| block.element(row).unwrap_or(Value::Null))
                            .collect(),
                    ))
                } else {
                    value_blocks[0].element(row)
                };
                let key = if keys_multi {
                    Some(Value::Array(
                        key_blocks
                            .iter()
                            .map(|block| block.element(row).unwrap_or(Value::Null))
                            .collect(),
                    ))
                } else {
                    key_blocks[0].element(row)
                };
                state = row_aggregate(AggFunc::TopN { bottom }, state, &[value, key, spec.clone()])?;
            }
            return Ok(state);
        }
        other => panic!("{other} is not a block aggregate"),
    };

    let data = args.next().expect("block aggregate needs a data block");
    let mut state = state;
    for row in rows {
        state = row_aggregate(row_func, state, &[data.element(row)])?;
    }

    Ok(state)
}
