//! Declarative filters: `{"email": {"endsWith": "@acme.io"}, "or": [..]}`.

use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};

use super::{push_value, Column, Paginated};
use crate::error::{AppError, AppResult};

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::InvalidFilter(msg.into())
}

/// Writes a parenthesized predicate for a filter object.
pub fn push_condition<E: Paginated>(qb: &mut QueryBuilder<'_, Postgres>, filter: &Value) -> AppResult<()> {
    let object = filter
        .as_object()
        .ok_or_else(|| invalid("filter must be an object"))?;
    if object.is_empty() {
        qb.push("TRUE");
        return Ok(());
    }

    qb.push("(");
    for (i, (key, value)) in object.iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        match key.as_str() {
            "and" => push_group::<E>(qb, value, " AND ")?,
            "or" => push_group::<E>(qb, value, " OR ")?,
            field => {
                let column = E::column(field).ok_or_else(|| AppError::InvalidFilterField(field.to_string()))?;
                let ops = value
                    .as_object()
                    .ok_or_else(|| invalid(format!("{} expects an operator object", field)))?;
                push_field(qb, column, ops)?;
            }
        }
    }
    qb.push(")");
    Ok(())
}

fn push_group<E: Paginated>(qb: &mut QueryBuilder<'_, Postgres>, value: &Value, joiner: &str) -> AppResult<()> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid("and/or expect an array"))?;
    if items.is_empty() {
        qb.push("TRUE");
        return Ok(());
    }
    qb.push("(");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_condition::<E>(qb, item)?;
    }
    qb.push(")");
    Ok(())
}

fn push_field(qb: &mut QueryBuilder<'_, Postgres>, column: &Column, ops: &Map<String, Value>) -> AppResult<()> {
    if ops.is_empty() {
        return Err(invalid(format!("no operator for {}", column.field)));
    }
    for (i, (op, value)) in ops.iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        push_operator(qb, column, op, value)?;
    }
    Ok(())
}

fn push_compare(qb: &mut QueryBuilder<'_, Postgres>, column: &Column, sql_op: &str, value: &Value) -> AppResult<()> {
    qb.push(column.column).push(sql_op);
    push_value(qb, column, value)
}

fn push_operator(qb: &mut QueryBuilder<'_, Postgres>, column: &Column, op: &str, value: &Value) -> AppResult<()> {
    let col = column.column;
    match op {
        "eq" if value.is_null() => {
            qb.push(col).push(" IS NULL");
        }
        "ne" if value.is_null() => {
            qb.push(col).push(" IS NOT NULL");
        }
        "eq" => push_compare(qb, column, " = ", value)?,
        "ne" => push_compare(qb, column, " <> ", value)?,
        "gt" => push_compare(qb, column, " > ", value)?,
        "gte" => push_compare(qb, column, " >= ", value)?,
        "lt" => push_compare(qb, column, " < ", value)?,
        "lte" => push_compare(qb, column, " <= ", value)?,
        "is" | "not" => {
            if !value.is_null() {
                return Err(invalid(format!("{} only accepts null", op)));
            }
            qb.push(col)
                .push(if op == "is" { " IS NULL" } else { " IS NOT NULL" });
        }
        "in" | "notIn" => {
            let values = scalar_list(column, value)?;
            qb.push(col)
                .push(if op == "in" { " = ANY(" } else { " <> ALL(" });
            qb.push_bind(values);
            qb.push("::").push(column.sql_type).push("[])");
        }
        "between" | "notBetween" => {
            let bounds = value
                .as_array()
                .filter(|a| a.len() == 2 && a.iter().all(|v| !v.is_null()))
                .ok_or_else(|| invalid(format!("{} expects two bounds", op)))?;
            qb.push(col)
                .push(if op == "between" { " BETWEEN " } else { " NOT BETWEEN " });
            push_value(qb, column, &bounds[0])?;
            qb.push(" AND ");
            push_value(qb, column, &bounds[1])?;
        }
        "like" | "notLike" | "iLike" | "notILike" => {
            let pattern = string_value(column, value)?.to_string();
            push_like(qb, column, op, pattern);
        }
        "startsWith" | "endsWith" | "substring" => {
            let escaped = escape_like(string_value(column, value)?);
            let pattern = match op {
                "startsWith" => format!("{}%", escaped),
                "endsWith" => format!("%{}", escaped),
                _ => format!("%{}%", escaped),
            };
            push_like(qb, column, "like", pattern);
        }
        other => return Err(invalid(format!("unknown operator {}", other))),
    }
    Ok(())
}

fn push_like(qb: &mut QueryBuilder<'_, Postgres>, column: &Column, op: &str, pattern: String) {
    let keyword = match op {
        "notLike" => " NOT LIKE ",
        "iLike" => " ILIKE ",
        "notILike" => " NOT ILIKE ",
        _ => " LIKE ",
    };
    qb.push(column.column).push("::text").push(keyword);
    qb.push_bind(pattern);
}

fn string_value<'v>(column: &Column, value: &'v Value) -> AppResult<&'v str> {
    value
        .as_str()
        .ok_or_else(|| invalid(format!("{} expects a string pattern", column.field)))
}

fn scalar_list(column: &Column, value: &Value) -> AppResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(format!("{} expects an array", column.field)))?;
    items
        .iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(invalid(format!("{} expects scalar values", column.field))),
        })
        .collect()
}

/// Escapes LIKE wildcards so the value matches literally.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::tests::Account;
    use serde_json::json;

    fn sql(filter: Value) -> AppResult<String> {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_condition::<Account>(&mut qb, &filter)?;
        Ok(qb.sql().to_string())
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(sql(json!({"age": {"eq": 3}})).unwrap(), "(age = $1::integer)");
        assert_eq!(sql(json!({"age": {"ne": 3}})).unwrap(), "(age <> $1::integer)");
        assert_eq!(sql(json!({"age": {"gt": 3}})).unwrap(), "(age > $1::integer)");
        assert_eq!(sql(json!({"age": {"gte": 3}})).unwrap(), "(age >= $1::integer)");
        assert_eq!(sql(json!({"age": {"lt": 3}})).unwrap(), "(age < $1::integer)");
        assert_eq!(sql(json!({"age": {"lte": 3}})).unwrap(), "(age <= $1::integer)");
    }

    #[test]
    fn null_checks() {
        assert_eq!(sql(json!({"name": {"eq": null}})).unwrap(), "(name IS NULL)");
        assert_eq!(sql(json!({"name": {"ne": null}})).unwrap(), "(name IS NOT NULL)");
        assert_eq!(sql(json!({"name": {"is": null}})).unwrap(), "(name IS NULL)");
        assert_eq!(sql(json!({"name": {"not": null}})).unwrap(), "(name IS NOT NULL)");
        assert!(matches!(
            sql(json!({"name": {"is": "x"}})),
            Err(AppError::InvalidFilter(_))
        ));
    }

    #[test]
    fn list_operators_bind_arrays() {
        assert_eq!(
            sql(json!({"id": {"in": ["a", "b"]}})).unwrap(),
            "(id = ANY($1::uuid[]))"
        );
        assert_eq!(
            sql(json!({"age": {"notIn": [1, 2]}})).unwrap(),
            "(age <> ALL($1::integer[]))"
        );
        assert!(sql(json!({"id": {"in": "a"}})).is_err());
    }

    #[test]
    fn range_operators() {
        assert_eq!(
            sql(json!({"age": {"between": [18, 30]}})).unwrap(),
            "(age BETWEEN $1::integer AND $2::integer)"
        );
        assert_eq!(
            sql(json!({"age": {"notBetween": [18, 30]}})).unwrap(),
            "(age NOT BETWEEN $1::integer AND $2::integer)"
        );
        assert!(sql(json!({"age": {"between": [18]}})).is_err());
    }

    #[test]
    fn pattern_operators() {
        assert_eq!(sql(json!({"name": {"like": "A%"}})).unwrap(), "(name::text LIKE $1)");
        assert_eq!(sql(json!({"name": {"notLike": "A%"}})).unwrap(), "(name::text NOT LIKE $1)");
        assert_eq!(sql(json!({"name": {"iLike": "a%"}})).unwrap(), "(name::text ILIKE $1)");
        assert_eq!(sql(json!({"name": {"notILike": "a%"}})).unwrap(), "(name::text NOT ILIKE $1)");
        assert_eq!(sql(json!({"name": {"startsWith": "Ad"}})).unwrap(), "(name::text LIKE $1)");
        assert_eq!(sql(json!({"name": {"substring": "d"}})).unwrap(), "(name::text LIKE $1)");
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn nested_and_or() {
        let filter = json!({
            "or": [
                {"name": {"startsWith": "A"}},
                {"and": [{"age": {"gte": 18}}, {"active": {"eq": true}}]}
            ]
        });
        assert_eq!(
            sql(filter).unwrap(),
            "(((name::text LIKE $1) OR (((age >= $2::integer) AND (active = $3::boolean)))))"
        );
    }

    #[test]
    fn several_keys_are_anded() {
        let filter = json!({"age": {"gt": 1, "lt": 9}, "name": {"ne": null}});
        assert_eq!(
            sql(filter).unwrap(),
            "(age > $1::integer AND age < $2::integer AND name IS NOT NULL)"
        );
    }

    #[test]
    fn rejects_unknown_fields_and_operators() {
        assert!(matches!(
            sql(json!({"password": {"eq": "x"}})),
            Err(AppError::InvalidFilterField(f)) if f == "password"
        ));
        assert!(matches!(
            sql(json!({"name": {"regex": ".*"}})),
            Err(AppError::InvalidFilter(_))
        ));
        assert!(sql(json!({"name": "Ada"})).is_err());
        assert!(sql(json!([1, 2])).is_err());
    }
}
