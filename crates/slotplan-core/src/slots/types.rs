use crate::value::Value;

///
/// TypeSignature
///
/// Set of runtime type tags a slot may hold. The `BLOCK` and `CELL` tags mark
/// batched values; a slot carrying either is block-resident.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TypeSignature(u16);

impl TypeSignature {
    pub const NOTHING: Self = Self(1 << 0);
    pub const NULL: Self = Self(1 << 1);
    pub const BOOL: Self = Self(1 << 2);
    pub const NUMBER: Self = Self(1 << 3);
    pub const STRING: Self = Self(1 << 4);
    pub const OBJECT: Self = Self(1 << 5);
    pub const ARRAY: Self = Self(1 << 6);
    pub const BLOCK: Self = Self(1 << 7);
    pub const CELL: Self = Self(1 << 8);

    pub const ANY_SCALAR: Self = Self(0b0111_1111);

    #[must_use]
    pub const fn include(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn exclude(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub const fn contains_any(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn is_subset(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// True when the signature marks a batched (block or cell) value.
    #[must_use]
    pub const fn is_block(self) -> bool {
        self.contains_any(Self::BLOCK.include(Self::CELL))
    }

    #[must_use]
    pub const fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::NULL,
            Value::Bool(_) => Self::BOOL,
            Value::Int(_) | Value::Double(_) => Self::NUMBER,
            Value::Text(_) => Self::STRING,
            Value::Array(_) => Self::ARRAY,
            Value::Object(_) => Self::OBJECT,
        }
    }
}
