//! Cursor pagination and declarative filters over whitelisted columns.
//!
//! Client-facing field names (`createdAt`) map to SQL columns through
//! [`Paginated::COLUMNS`]; nothing the client sends is interpolated into SQL
//! except through that table. Values are always bound as text parameters and
//! cast to the column's SQL type.

pub mod cursor;
pub mod filter;

use async_graphql::{Enum, InputObject, SimpleObject};
use serde::Serialize;
use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::{AppError, AppResult};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// A client-addressable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub field: &'static str,
    pub column: &'static str,
    pub sql_type: &'static str,
    pub unique: bool,
    /// NULLs sort last ascending and first descending (Postgres default).
    pub nullable: bool,
}

impl Column {
    pub const fn new(field: &'static str, column: &'static str, sql_type: &'static str) -> Self {
        Self {
            field,
            column,
            sql_type,
            unique: false,
            nullable: false,
        }
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// A table that can be listed page by page.
pub trait Paginated {
    const TABLE: &'static str;
    /// Comma-separated select list.
    const SELECT: &'static str;
    const COLUMNS: &'static [Column];
    const PRIMARY_KEY: &'static str = "id";

    fn column(field: &str) -> Option<&'static Column> {
        Self::COLUMNS.iter().find(|c| c.field == field)
    }
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    #[graphql(name = "ASC")]
    Asc,
    #[graphql(name = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(InputObject, Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub field: String,
    #[graphql(default)]
    pub sort: SortDirection,
}

impl OrderItem {
    pub fn new(field: impl Into<String>, sort: SortDirection) -> Self {
        Self {
            field: field.into(),
            sort,
        }
    }
}

/// Page request: `first`/`after` pages forward, `last`/`before` backward.
#[derive(InputObject, Debug, Clone, Default)]
pub struct PageInput {
    pub first: Option<i32>,
    pub after: Option<String>,
    pub last: Option<i32>,
    pub before: Option<String>,
    pub order_by: Option<Vec<OrderItem>>,
}

impl PageInput {
    pub fn is_backward(&self) -> bool {
        self.last.is_some() || (self.first.is_none() && self.before.is_some())
    }

    pub fn limit(&self) -> i64 {
        let requested = if self.is_backward() { self.last } else { self.first };
        requested
            .map(i64::from)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(SimpleObject, Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
    pub total_count: i64,
}

/// Resolves client order items against the entity's columns.
pub fn resolve_order<E: Paginated>(order: &[OrderItem]) -> AppResult<Vec<(&'static Column, SortDirection)>> {
    order
        .iter()
        .map(|item| {
            E::column(&item.field)
                .map(|c| (c, item.sort))
                .ok_or_else(|| AppError::InvalidOrderField(item.field.clone()))
        })
        .collect()
}

/// Appends `$n::type` for a JSON scalar, or `NULL`.
pub(crate) fn push_value(qb: &mut QueryBuilder<'_, Postgres>, column: &Column, value: &serde_json::Value) -> AppResult<()> {
    let text = match value {
        serde_json::Value::Null => {
            qb.push("NULL");
            return Ok(());
        }
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => {
            return Err(AppError::InvalidFilter(format!(
                "unsupported value for {}",
                column.field
            )))
        }
    };
    qb.push_bind(text);
    qb.push("::");
    qb.push(column.sql_type);
    Ok(())
}

fn push_where<'a, E: Paginated>(
    qb: &mut QueryBuilder<'a, Postgres>,
    condition: Option<&serde_json::Value>,
) -> AppResult<()> {
    qb.push(" WHERE TRUE");
    if let Some(condition) = condition {
        qb.push(" AND ");
        filter::push_condition::<E>(qb, condition)?;
    }
    Ok(())
}

/// Builds the row query of a page; exposed for inspection in tests.
pub fn build_page_query<E: Paginated>(
    page: &PageInput,
    condition: Option<&serde_json::Value>,
) -> AppResult<(QueryBuilder<'static, Postgres>, Vec<OrderItem>)> {
    let order = cursor::ensure_deterministic_order::<E>(
        page.order_by
            .clone()
            .unwrap_or_else(|| vec![OrderItem::new(E::PRIMARY_KEY, SortDirection::Asc)]),
    );
    // validate before touching SQL
    resolve_order::<E>(&order)?;

    let backward = page.is_backward();
    let query_order = if backward {
        cursor::reverse_order(&order)
    } else {
        order.clone()
    };
    let columns = resolve_order::<E>(&query_order)?;

    let mut qb = QueryBuilder::new(format!("SELECT {} FROM {}", E::SELECT, E::TABLE));
    push_where::<E>(&mut qb, condition)?;

    let raw_cursor = if backward { &page.before } else { &page.after };
    if let Some(raw) = raw_cursor {
        let values = cursor::parse_cursor(raw)?;
        if values.len() == columns.len() {
            qb.push(" AND ");
            cursor::push_cursor_predicate(&mut qb, &columns, &values)?;
        }
    }

    qb.push(" ORDER BY ");
    for (i, (col, sort)) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(col.column);
        qb.push(" ");
        qb.push(sort.as_sql());
    }
    qb.push(" LIMIT ");
    qb.push_bind(page.limit() + 1);

    Ok((qb, order))
}

pub fn build_count_query<E: Paginated>(condition: Option<&serde_json::Value>) -> AppResult<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
    push_where::<E>(&mut qb, condition)?;
    Ok(qb)
}

/// Fetches one page plus the total count under `condition`.
pub async fn fetch_page<E>(
    db: &PgPool,
    page: &PageInput,
    condition: Option<&serde_json::Value>,
) -> AppResult<Page<E>>
where
    E: Paginated + Serialize + for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let limit = page.limit() as usize;
    let backward = page.is_backward();
    let (mut qb, order) = build_page_query::<E>(page, condition)?;
    debug!(sql = %qb.sql(), table = E::TABLE, "page query");

    let mut items: Vec<E> = qb.build_query_as::<E>().fetch_all(db).await?;
    let has_more = items.len() > limit;
    items.truncate(limit);
    if backward {
        items.reverse();
    }

    let mut count_qb = build_count_query::<E>(condition)?;
    let (total_count,) = count_qb.build_query_as::<(i64,)>().fetch_one(db).await?;

    let cursor_of = |item: &E| -> AppResult<String> {
        let row = serde_json::to_value(item).map_err(anyhow::Error::from)?;
        Ok(cursor::create_cursor(&order, &row))
    };
    let page_info = PageInfo {
        has_next_page: if backward { page.before.is_some() } else { has_more },
        has_previous_page: if backward { has_more } else { page.after.is_some() },
        start_cursor: items.first().map(&cursor_of).transpose()?,
        end_cursor: items.last().map(&cursor_of).transpose()?,
    };

    Ok(Page {
        items,
        page_info,
        total_count,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal entity used to inspect generated SQL.
    pub(crate) struct Account;

    impl Paginated for Account {
        const TABLE: &'static str = "accounts";
        const SELECT: &'static str = "id, name, created_at";
        const COLUMNS: &'static [Column] = &[
            Column::new("id", "id", "uuid").unique(),
            Column::new("name", "name", "text"),
            Column::new("age", "age", "integer"),
            Column::new("active", "active", "boolean"),
            Column::new("nickname", "nickname", "text").nullable(),
            Column::new("createdAt", "created_at", "timestamptz").unique(),
        ];
    }

    #[test]
    fn default_page_orders_by_primary_key() {
        let (qb, order) = build_page_query::<Account>(&PageInput::default(), None).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT id, name, created_at FROM accounts WHERE TRUE ORDER BY id ASC LIMIT $1"
        );
        assert_eq!(order, vec![OrderItem::new("id", SortDirection::Asc)]);
    }

    #[test]
    fn forward_page_applies_after_cursor() {
        let order = vec![OrderItem::new("name", SortDirection::Desc)];
        let after = cursor::create_cursor(
            &cursor::ensure_deterministic_order::<Account>(order.clone()),
            &serde_json::json!({"name": "m", "id": "5f0c"}),
        );
        let page = PageInput {
            first: Some(10),
            after: Some(after),
            order_by: Some(order),
            ..Default::default()
        };
        let (qb, _) = build_page_query::<Account>(&page, None).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT id, name, created_at FROM accounts WHERE TRUE AND \
             (name < $1::text OR (name = $2::text AND id > $3::uuid)) \
             ORDER BY name DESC, id ASC LIMIT $4"
        );
    }

    #[test]
    fn backward_page_reverses_order() {
        let order = vec![OrderItem::new("createdAt", SortDirection::Asc)];
        let before = cursor::create_cursor(&order, &serde_json::json!({"createdAt": "2024-01-01T00:00:00Z"}));
        let page = PageInput {
            last: Some(5),
            before: Some(before),
            order_by: Some(order),
            ..Default::default()
        };
        assert!(page.is_backward());
        assert_eq!(page.limit(), 5);
        let (qb, _) = build_page_query::<Account>(&page, None).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT id, name, created_at FROM accounts WHERE TRUE AND \
             created_at < $1::timestamptz ORDER BY created_at DESC LIMIT $2"
        );
    }

    #[test]
    fn mismatched_cursor_is_ignored() {
        let cursor = cursor::create_cursor(
            &[OrderItem::new("name", SortDirection::Asc)],
            &serde_json::json!({"name": "x"}),
        );
        let page = PageInput {
            after: Some(cursor),
            order_by: Some(vec![OrderItem::new("name", SortDirection::Asc)]),
            ..Default::default()
        };
        // order gains the `id` tiebreaker, so the one-value cursor no longer fits
        let (qb, _) = build_page_query::<Account>(&page, None).unwrap();
        assert!(!qb.sql().contains("name >"));
    }

    #[test]
    fn filter_and_cursor_combine() {
        let page = PageInput {
            first: Some(2),
            ..Default::default()
        };
        let condition = serde_json::json!({"active": {"eq": true}});
        let (qb, _) = build_page_query::<Account>(&page, Some(&condition)).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT id, name, created_at FROM accounts WHERE TRUE AND (active = $1::boolean) ORDER BY id ASC LIMIT $2"
        );
        let count = build_count_query::<Account>(Some(&condition)).unwrap();
        assert_eq!(
            count.sql(),
            "SELECT COUNT(*) FROM accounts WHERE TRUE AND (active = $1::boolean)"
        );
    }

    #[test]
    fn rejects_unknown_order_field() {
        let page = PageInput {
            order_by: Some(vec![OrderItem::new("password", SortDirection::Asc)]),
            ..Default::default()
        };
        assert!(matches!(
            build_page_query::<Account>(&page, None),
            Err(AppError::InvalidOrderField(f)) if f == "password"
        ));
    }

    #[test]
    fn page_size_is_clamped() {
        let page = PageInput {
            first: Some(1000),
            ..Default::default()
        };
        assert_eq!(page.limit(), MAX_PAGE_SIZE);
        let page = PageInput {
            first: Some(0),
            ..Default::default()
        };
        assert_eq!(page.limit(), 1);
        assert_eq!(PageInput::default().limit(), DEFAULT_PAGE_SIZE);
    }
}
