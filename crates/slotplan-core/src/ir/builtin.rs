use std::fmt;

///
/// Builtin
///
/// Catalogue of scalar and block functions the IR can call. Block variants
/// operate elementwise over batched operands and broadcast scalar operands.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Builtin {
    FillEmpty,
    IfNull,
    GetField,
    NewObj,
    NewBsonObj,
    NewArray,
    IsObject,
    IsArray,
    IsNumber,
    Add,
    Subtract,
    Multiply,
    Divide,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Not,
    Concat,
    AtMostOneArray,
    GenerateSortKey,
    SortKeyComponentVectorToArray,
    NewAccumulatorNState,
    AccumulatorNFinalize,
    TopBottomNFinalize,
    TopBottomFinalize,

    BlockFillEmpty,
    BlockGetField,
    BlockAdd,
    BlockSubtract,
    BlockMultiply,
    BlockEq,
    BlockNe,
    BlockGt,
    BlockGte,
    BlockLt,
    BlockLte,
    BlockIsNumber,
    BlockBroadcast,
}

impl Builtin {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FillEmpty => "fillEmpty",
            Self::IfNull => "ifNull",
            Self::GetField => "getField",
            Self::NewObj => "newObj",
            Self::NewBsonObj => "newBsonObj",
            Self::NewArray => "newArray",
            Self::IsObject => "isObject",
            Self::IsArray => "isArray",
            Self::IsNumber => "isNumber",
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::Eq => "eq",
            Self::Ne => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Concat => "concat",
            Self::AtMostOneArray => "atMostOneArray",
            Self::GenerateSortKey => "generateSortKey",
            Self::SortKeyComponentVectorToArray => "sortKeyComponentVectorToArray",
            Self::NewAccumulatorNState => "newAccumulatorNState",
            Self::AccumulatorNFinalize => "accumulatorNFinalize",
            Self::TopBottomNFinalize => "topBottomNFinalize",
            Self::TopBottomFinalize => "topBottomFinalize",
            Self::BlockFillEmpty => "valueBlockFillEmpty",
            Self::BlockGetField => "valueBlockGetField",
            Self::BlockAdd => "valueBlockAdd",
            Self::BlockSubtract => "valueBlockSub",
            Self::BlockMultiply => "valueBlockMul",
            Self::BlockEq => "valueBlockEq",
            Self::BlockNe => "valueBlockNeq",
            Self::BlockGt => "valueBlockGt",
            Self::BlockGte => "valueBlockGte",
            Self::BlockLt => "valueBlockLt",
            Self::BlockLte => "valueBlockLte",
            Self::BlockIsNumber => "valueBlockIsNumber",
            Self::BlockBroadcast => "valueBlockBroadcast",
        }
    }

    /// Block counterpart used when any operand is batched, if one exists.
    #[must_use]
    pub const fn block_equivalent(self) -> Option<Self> {
        let block = match self {
            Self::FillEmpty => Self::BlockFillEmpty,
            Self::GetField => Self::BlockGetField,
            Self::Add => Self::BlockAdd,
            Self::Subtract => Self::BlockSubtract,
            Self::Multiply => Self::BlockMultiply,
            Self::Eq => Self::BlockEq,
            Self::Ne => Self::BlockNe,
            Self::Gt => Self::BlockGt,
            Self::Gte => Self::BlockGte,
            Self::Lt => Self::BlockLt,
            Self::Lte => Self::BlockLte,
            Self::IsNumber => Self::BlockIsNumber,
            _ => return None,
        };

        Some(block)
    }

    /// Scalar function a block variant applies to each position.
    ///
    /// `BlockBroadcast` has no scalar counterpart.
    #[must_use]
    pub const fn scalar_equivalent(self) -> Option<Self> {
        let scalar = match self {
            Self::BlockFillEmpty => Self::FillEmpty,
            Self::BlockGetField => Self::GetField,
            Self::BlockAdd => Self::Add,
            Self::BlockSubtract => Self::Subtract,
            Self::BlockMultiply => Self::Multiply,
            Self::BlockEq => Self::Eq,
            Self::BlockNe => Self::Ne,
            Self::BlockGt => Self::Gt,
            Self::BlockGte => Self::Gte,
            Self::BlockLt => Self::Lt,
            Self::BlockLte => Self::Lte,
            Self::BlockIsNumber => Self::IsNumber,
            _ => return None,
        };

        Some(scalar)
    }

    #[must_use]
    pub const fn is_block(self) -> bool {
        matches!(self, Self::BlockBroadcast) || self.scalar_equivalent().is_some()
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

///
/// AggFunc
///
/// Aggregate update functions. Each takes the running state plus its
/// arguments and yields the next state.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AggFunc {
    Sum,
    CountNumeric,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
    ConcatArrays,
    SetUnion,
    FirstN,
    LastN,
    TopN { bottom: bool },
    MergeFirstN,
    MergeLastN,
    MergeTopN { bottom: bool },

    BlockSum,
    BlockCountNumeric,
    BlockMin,
    BlockMax,
    /// Arguments: bitmap, sort spec, `values` value blocks, then key blocks.
    BlockTopN {
        bottom: bool,
        values: usize,
        value_is_array: bool,
        keys_multi: bool,
    },
}

impl AggFunc {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::CountNumeric => "countNumeric",
            Self::Min => "min",
            Self::Max => "max",
            Self::First => "first",
            Self::Last => "last",
            Self::Push => "push",
            Self::AddToSet => "addToSet",
            Self::ConcatArrays => "concatArrays",
            Self::SetUnion => "setUnion",
            Self::FirstN => "firstN",
            Self::LastN => "lastN",
            Self::TopN { bottom: false } => "topN",
            Self::TopN { bottom: true } => "bottomN",
            Self::MergeFirstN => "mergeFirstN",
            Self::MergeLastN => "mergeLastN",
            Self::MergeTopN { bottom: false } => "mergeTopN",
            Self::MergeTopN { bottom: true } => "mergeBottomN",
            Self::BlockSum => "valueBlockAggSum",
            Self::BlockCountNumeric => "valueBlockAggCountNumeric",
            Self::BlockMin => "valueBlockAggMin",
            Self::BlockMax => "valueBlockAggMax",
            Self::BlockTopN { bottom: false, .. } => "valueBlockAggTopN",
            Self::BlockTopN { bottom: true, .. } => "valueBlockAggBottomN",
        }
    }

    #[must_use]
    pub const fn is_block(self) -> bool {
        matches!(
            self,
            Self::BlockSum
                | Self::BlockCountNumeric
                | Self::BlockMin
                | Self::BlockMax
                | Self::BlockTopN { .. }
        )
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
