use base64ct::{Base64, Encoding};
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

use super::{push_value, Column, OrderItem, Paginated, SortDirection};
use crate::error::{AppError, AppResult};

/// Appends the primary key unless some unique column already fixes the order.
pub fn ensure_deterministic_order<E: Paginated>(mut order: Vec<OrderItem>) -> Vec<OrderItem> {
    let has_unique = order
        .iter()
        .any(|item| E::column(&item.field).map(|c| c.unique).unwrap_or(false));
    if !has_unique {
        order.push(OrderItem::new(E::PRIMARY_KEY, SortDirection::Asc));
    }
    order
}

pub fn reverse_order(order: &[OrderItem]) -> Vec<OrderItem> {
    order
        .iter()
        .map(|item| OrderItem::new(item.field.clone(), item.sort.reversed()))
        .collect()
}

/// Encodes the order-field values of `row` (a serialized entity).
pub fn create_cursor(order: &[OrderItem], row: &Value) -> String {
    let values: Vec<Value> = order
        .iter()
        .map(|item| row.get(&item.field).cloned().unwrap_or(Value::Null))
        .collect();
    Base64::encode_string(Value::Array(values).to_string().as_bytes())
}

pub fn parse_cursor(cursor: &str) -> AppResult<Vec<Value>> {
    let bytes = Base64::decode_vec(cursor.trim()).map_err(|_| AppError::InvalidCursor)?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Array(values)) => Ok(values),
        _ => Err(AppError::InvalidCursor),
    }
}

/// Rows strictly after `value` in `sort` order. NULL cursor values and
/// nullable columns follow Postgres' NULLS LAST / NULLS FIRST defaults.
fn push_after(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &Column,
    sort: SortDirection,
    value: &Value,
) -> AppResult<()> {
    match (sort, value.is_null()) {
        (SortDirection::Asc, true) => {
            qb.push("FALSE");
        }
        (SortDirection::Desc, true) => {
            qb.push(column.column).push(" IS NOT NULL");
        }
        (SortDirection::Asc, false) if column.nullable => {
            qb.push("(").push(column.column).push(" > ");
            push_value(qb, column, value)?;
            qb.push(" OR ").push(column.column).push(" IS NULL)");
        }
        (sort, false) => {
            let op = match sort {
                SortDirection::Asc => " > ",
                SortDirection::Desc => " < ",
            };
            qb.push(column.column).push(op);
            push_value(qb, column, value)?;
        }
    }
    Ok(())
}

fn push_equal(qb: &mut QueryBuilder<'_, Postgres>, column: &Column, value: &Value) -> AppResult<()> {
    if value.is_null() {
        qb.push(column.column).push(" IS NULL");
        return Ok(());
    }
    qb.push(column.column).push(" = ");
    push_value(qb, column, value)
}

/// Writes `f1 op v1 OR (f1 = v1 AND (...))` for the remaining columns.
pub fn push_cursor_predicate(
    qb: &mut QueryBuilder<'_, Postgres>,
    columns: &[(&'static Column, SortDirection)],
    values: &[Value],
) -> AppResult<()> {
    let Some(((column, sort), rest)) = columns.split_first() else {
        return Ok(());
    };
    let (value, rest_values) = values.split_first().ok_or(AppError::InvalidCursor)?;

    if rest.is_empty() {
        return push_after(qb, column, *sort, value);
    }

    qb.push("(");
    push_after(qb, column, *sort, value)?;
    qb.push(" OR (");
    push_equal(qb, column, value)?;
    qb.push(" AND ");
    push_cursor_predicate(qb, rest, rest_values)?;
    qb.push("))");
    Ok(())
}
