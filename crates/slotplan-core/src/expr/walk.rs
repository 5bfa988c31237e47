use crate::expr::{ExprFieldPath, Expression};

/// Visit every field-path node of `expr` in pre-order.
pub fn walk_field_paths(expr: &Expression, visit: &mut impl FnMut(&ExprFieldPath)) {
    match expr {
        Expression::FieldPath(path) => visit(path),
        Expression::Object(fields) => {
            for (_, value) in fields {
                walk_field_paths(value, visit);
            }
        }
        Expression::Array(items) | Expression::Op { args: items, .. } => {
            for item in items {
                walk_field_paths(item, visit);
            }
        }
        Expression::Constant(_) => {}
    }
}
