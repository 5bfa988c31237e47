/// Name of the implicit variable every unprefixed field path starts from.
pub const CURRENT: &str = "CURRENT";
/// Name of the whole-record variable.
pub const ROOT: &str = "ROOT";

///
/// FieldPath
///
/// Dotted path whose first component is the variable it starts from, so
/// `$a.b` is `CURRENT.a.b` and `$$ROOT` is the single component `ROOT`.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FieldPath {
    components: Vec<String>,
}

impl FieldPath {
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    #[must_use]
    pub fn component(&self, index: usize) -> Option<&str> {
        self.components.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    #[must_use]
    pub fn full_path(&self) -> String {
        self.components.join(".")
    }
}

///
/// Variable
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Variable {
    /// `CURRENT` or `ROOT`: the record flowing into the stage.
    Root,
    /// A user-bound variable such as `$$limit`.
    User(String),
}

///
/// ExprFieldPath
///
/// A field-path expression: the variable it reads plus the full path.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExprFieldPath {
    variable: Variable,
    path: FieldPath,
}

impl ExprFieldPath {
    /// `$a.b.c` for `current("a.b.c")`.
    #[must_use]
    pub fn current(dotted: &str) -> Self {
        Self {
            variable: Variable::Root,
            path: FieldPath::new(std::iter::once(CURRENT).chain(dotted.split('.'))),
        }
    }

    /// `$$ROOT`
    #[must_use]
    pub fn root() -> Self {
        Self {
            variable: Variable::Root,
            path: FieldPath::new([ROOT]),
        }
    }

    /// `$$ROOT.a.b` for `root_path("a.b")`.
    #[must_use]
    pub fn root_path(dotted: &str) -> Self {
        Self {
            variable: Variable::Root,
            path: FieldPath::new(std::iter::once(ROOT).chain(dotted.split('.'))),
        }
    }

    /// `$$name` or `$$name.a.b`; an empty `dotted` addresses the variable itself.
    #[must_use]
    pub fn variable(name: &str, dotted: &str) -> Self {
        let rest = dotted.split('.').filter(|part| !part.is_empty());
        Self {
            variable: Variable::User(name.to_string()),
            path: FieldPath::new(std::iter::once(name).chain(rest)),
        }
    }

    #[must_use]
    pub const fn variable_ref(&self) -> &Variable {
        &self.variable
    }

    #[must_use]
    pub const fn field_path(&self) -> &FieldPath {
        &self.path
    }

    /// True for references to user-bound variables rather than the record.
    #[must_use]
    pub const fn is_variable_reference(&self) -> bool {
        matches!(self.variable, Variable::User(_))
    }

    /// Dotted path with a leading `CURRENT.` stripped; other prefixes stay.
    #[must_use]
    pub fn path_without_current_prefix(&self) -> String {
        match self.path.components().split_first() {
            Some((first, rest)) if first == CURRENT => rest.join("."),
            _ => self.path.full_path(),
        }
    }

    /// First field below the variable, if the path goes below it.
    #[must_use]
    pub fn top_level_field(&self) -> Option<&str> {
        self.path.component(1)
    }
}
