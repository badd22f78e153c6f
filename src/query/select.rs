//! Query builder facade for entity types.
//!
//! `Select` keeps its own state (columns, joins, condition tree, ordering,
//! paging, eager-load plan) and renders a `sea_query::SelectStatement` on
//! demand. The target table is always referenced through an alias, and bare
//! column names are qualified with it, so the same builder can be joined
//! against linking tables without ambiguity.
//!
//! Execution methods (`fetch`, `count`, ...) live in the execution module.

use crate::entity::EntityDef;
use crate::error::{OrmError, Result};
use crate::query::placeholders::{bind_named, Bindings};
use crate::relation::eager::{Constraint, EagerPlan};
use sea_query::{
    Asterisk, BinOper, Condition, DynIden, Expr, ExprTrait, IntoCondition, JoinType, Order,
    PostgresQueryBuilder, Query, SelectStatement, Values,
};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

/// Comparison operators accepted by [`Select::where_op`] and [`Select::where_column`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl From<Op> for BinOper {
    fn from(op: Op) -> Self {
        match op {
            Op::Eq => BinOper::Equal,
            Op::Ne => BinOper::NotEqual,
            Op::Lt => BinOper::SmallerThan,
            Op::Lte => BinOper::SmallerThanOrEqual,
            Op::Gt => BinOper::GreaterThan,
            Op::Gte => BinOper::GreaterThanOrEqual,
            Op::Like => BinOper::Like,
        }
    }
}

impl FromStr for Op {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "=" => Ok(Op::Eq),
            "<>" | "!=" => Ok(Op::Ne),
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Lte),
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Gte),
            "LIKE" => Ok(Op::Like),
            other => Err(OrmError::InvalidConstraint(format!("unsupported operator `{other}`"))),
        }
    }
}

#[derive(Clone)]
enum SelectColumn {
    All(String),
    Column { table: String, column: String },
    Aliased { expr: Expr, alias: String },
}

impl SelectColumn {
    fn output_name(&self) -> Option<&str> {
        match self {
            SelectColumn::All(_) => None,
            SelectColumn::Column { column, .. } => Some(column),
            SelectColumn::Aliased { alias, .. } => Some(alias),
        }
    }
}

#[derive(Clone)]
struct Join {
    kind: JoinType,
    table: String,
    left: (String, String),
    right: (String, String),
}

pub(crate) fn iden(name: &str) -> DynIden {
    DynIden::from(name.to_string())
}

/// Query builder bound to one entity type
#[derive(Clone)]
pub struct Select {
    def: Arc<EntityDef>,
    alias: String,
    columns: Vec<SelectColumn>,
    joins: Vec<Join>,
    condition: Option<Condition>,
    order_by: Vec<(String, String, Order)>,
    group_by: Vec<(String, String)>,
    limit: Option<u64>,
    offset: Option<u64>,
    eager: EagerPlan,
    owning_key: Option<String>,
}

impl fmt::Debug for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sql, values) = self.build();
        f.debug_struct("Select")
            .field("entity", &self.def.name())
            .field("sql", &sql)
            .field("values", &values)
            .field("eager", &self.eager)
            .finish()
    }
}

impl Select {
    pub fn new(def: Arc<EntityDef>) -> Self {
        let alias = def.table().to_string();
        Self {
            def,
            alias,
            columns: Vec::new(),
            joins: Vec::new(),
            condition: None,
            order_by: Vec::new(),
            group_by: Vec::new(),
            limit: None,
            offset: None,
            eager: EagerPlan::default(),
            owning_key: None,
        }
    }

    pub fn def(&self) -> &Arc<EntityDef> {
        &self.def
    }

    /// Table alias the entity's columns are qualified with
    pub fn table_alias(&self) -> &str {
        &self.alias
    }

    /// Reference the target table under a different alias
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// `users.id` stays as is; `id` becomes `(alias, id)`
    fn column_ref(&self, column: &str) -> (DynIden, DynIden) {
        match column.split_once('.') {
            Some((table, column)) => (iden(table), iden(column)),
            None => (iden(&self.alias), iden(column)),
        }
    }

    fn split(&self, column: &str) -> (String, String) {
        match column.split_once('.') {
            Some((table, column)) => (table.to_string(), column.to_string()),
            None => (self.alias.clone(), column.to_string()),
        }
    }

    fn col(&self, column: &str) -> Expr {
        Expr::col(self.column_ref(column))
    }

    // ---- select list ----

    /// Replace the select list
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.columns.clear();
        for column in columns {
            self = self.add_select(column.as_ref());
        }
        self
    }

    pub fn add_select(mut self, column: &str) -> Self {
        let entry = match column.split_once('.') {
            Some((table, "*")) => SelectColumn::All(table.to_string()),
            _ if column == "*" => SelectColumn::All(self.alias.clone()),
            _ => {
                let (table, column) = self.split(column);
                SelectColumn::Column { table, column }
            }
        };
        self.columns.push(entry);
        self
    }

    /// Select `column` under the output name `alias`
    pub fn select_as(self, column: &str, alias: impl Into<String>) -> Self {
        let expr = self.col(column);
        self.select_expr(expr, alias)
    }

    pub fn select_expr(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.columns.push(SelectColumn::Aliased {
            expr,
            alias: alias.into(),
        });
        self
    }

    /// Add a column while keeping the implicit `alias.*` select list
    pub(crate) fn add_hidden_column(mut self, column: &str, alias: impl Into<String>) -> Self {
        if self.columns.is_empty() {
            self.columns.push(SelectColumn::All(self.alias.clone()));
        }
        self.select_as(column, alias)
    }

    /// Output names of the explicitly selected columns; empty means `alias.*`
    pub fn selected_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter_map(SelectColumn::output_name)
            .map(str::to_string)
            .collect()
    }

    /// Whether `column` is part of the rows this query returns
    pub fn selects(&self, column: &str) -> bool {
        self.columns.is_empty()
            || self.columns.iter().any(|c| match c {
                SelectColumn::All(table) => *table == self.alias,
                other => other.output_name() == Some(column),
            })
    }

    // ---- constraints ----

    /// Add any `sea_query` condition, AND-ed with the existing ones
    pub fn filter<F>(mut self, condition: F) -> Self
    where
        F: IntoCondition,
    {
        let condition = condition.into_condition();
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.add(condition),
            None => Condition::all().add(condition),
        });
        self
    }

    /// OR `condition` with everything constrained so far
    pub fn or_filter<F>(mut self, condition: F) -> Self
    where
        F: IntoCondition,
    {
        let condition = condition.into_condition();
        self.condition = Some(match self.condition.take() {
            Some(existing) => Condition::any().add(existing).add(condition),
            None => Condition::all().add(condition),
        });
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<sea_query::Value>) -> Self {
        self.where_op(column, Op::Eq, value)
    }

    pub fn where_op(self, column: &str, op: Op, value: impl Into<sea_query::Value>) -> Self {
        let expr = self.col(column).binary(op, value.into());
        self.filter(expr)
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<sea_query::Value>) -> Self {
        self.or_where_op(column, Op::Eq, value)
    }

    pub fn or_where_op(self, column: &str, op: Op, value: impl Into<sea_query::Value>) -> Self {
        let expr = self.col(column).binary(op, value.into());
        self.or_filter(expr)
    }

    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<sea_query::Value>,
    {
        let expr = self
            .col(column)
            .is_in(values.into_iter().map(Into::<sea_query::Value>::into));
        self.filter(expr)
    }

    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<sea_query::Value>,
    {
        let expr = self
            .col(column)
            .is_not_in(values.into_iter().map(Into::<sea_query::Value>::into));
        self.filter(expr)
    }

    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<sea_query::Value>,
    {
        let expr = self
            .col(column)
            .is_in(values.into_iter().map(Into::<sea_query::Value>::into));
        self.or_filter(expr)
    }

    /// Compare two columns
    pub fn where_column(self, left: &str, op: Op, right: &str) -> Self {
        let expr = self.col(left).binary(op, self.col(right));
        self.filter(expr)
    }

    pub fn where_between(
        self,
        column: &str,
        low: impl Into<sea_query::Value>,
        high: impl Into<sea_query::Value>,
    ) -> Self {
        let expr = self.col(column).between(low.into(), high.into());
        self.filter(expr)
    }

    pub fn where_not_between(
        self,
        column: &str,
        low: impl Into<sea_query::Value>,
        high: impl Into<sea_query::Value>,
    ) -> Self {
        let expr = self.col(column).not_between(low.into(), high.into());
        self.filter(expr)
    }

    pub fn where_null(self, column: &str) -> Self {
        let expr = self.col(column).is_null();
        self.filter(expr)
    }

    pub fn where_not_null(self, column: &str) -> Self {
        let expr = self.col(column).is_not_null();
        self.filter(expr)
    }

    pub fn or_where_null(self, column: &str) -> Self {
        let expr = self.col(column).is_null();
        self.or_filter(expr)
    }

    /// Raw SQL fragment with `:name` placeholders.
    ///
    /// ```
    /// use tidemark::{Bindings, EntityDef, Select};
    /// use std::sync::Arc;
    ///
    /// let users = Arc::new(EntityDef::builder("User", "users").build());
    /// let query = Select::new(users)
    ///     .where_raw("age > :min", &Bindings::new().bind("min", 18))
    ///     .unwrap();
    /// let (sql, values) = query.build();
    /// assert!(sql.contains("age > $"));
    /// assert_eq!(values.0.len(), 1);
    /// ```
    pub fn where_raw(self, sql: &str, bindings: &Bindings) -> Result<Self> {
        let expr = raw_expr(sql, bindings)?;
        Ok(self.filter(expr))
    }

    pub fn or_where_raw(self, sql: &str, bindings: &Bindings) -> Result<Self> {
        let expr = raw_expr(sql, bindings)?;
        Ok(self.or_filter(expr))
    }

    /// AND NOT (`condition`)
    pub fn where_not<F>(self, condition: F) -> Self
    where
        F: IntoCondition,
    {
        self.filter(Condition::all().add(condition.into_condition()).not())
    }

    // ---- joins, ordering, paging ----

    /// INNER JOIN `table` ON `left` = `right`
    pub fn join(self, table: &str, left: &str, right: &str) -> Self {
        self.push_join(JoinType::InnerJoin, table, left, right)
    }

    pub fn left_join(self, table: &str, left: &str, right: &str) -> Self {
        self.push_join(JoinType::LeftJoin, table, left, right)
    }

    fn push_join(mut self, kind: JoinType, table: &str, left: &str, right: &str) -> Self {
        let left = self.split(left);
        let right = self.split(right);
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            left,
            right,
        });
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        let (table, column) = self.split(column);
        self.order_by.push((table, column, order));
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        let column = self.split(column);
        self.group_by.push(column);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    // ---- eager loading and scopes ----

    /// Eager-load one or more dot-separated relationship paths
    pub fn with<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            self.eager.with(path.as_ref());
        }
        self
    }

    /// Eager-load `path`, passing its query through `constraint` first
    pub fn with_constraint<F>(mut self, path: &str, constraint: F) -> Self
    where
        F: Fn(Select) -> Result<Select> + 'static,
    {
        self.eager.with_constraint(path, Rc::new(constraint) as Constraint);
        self
    }

    pub(crate) fn with_plan(mut self, plan: EagerPlan) -> Self {
        self.eager.merge(plan);
        self
    }

    pub fn eager_plan(&self) -> &EagerPlan {
        &self.eager
    }

    /// Apply a named scope registered on the entity type
    pub fn scope(self, name: &str) -> Result<Self> {
        let scope = self
            .def
            .scope(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownScope {
                entity: self.def.name().to_string(),
                scope: name.to_string(),
            })?;
        scope(self)
    }

    /// Column on the returned rows that points back at the owner of a relationship query
    pub fn owning_key(&self) -> Option<&str> {
        self.owning_key.as_deref()
    }

    pub(crate) fn set_owning_key(mut self, column: impl Into<String>) -> Self {
        self.owning_key = Some(column.into());
        self
    }

    // ---- rendering ----

    fn statement(&self, paging: bool) -> SelectStatement {
        let mut stmt = Query::select();
        if self.alias == self.def.table() {
            stmt.from(iden(self.def.table()));
        } else {
            stmt.from_as(iden(self.def.table()), iden(&self.alias));
        }

        if self.columns.is_empty() {
            stmt.column((iden(&self.alias), Asterisk));
        }
        for column in &self.columns {
            match column {
                SelectColumn::All(table) => {
                    stmt.column((iden(table), Asterisk));
                }
                SelectColumn::Column { table, column } => {
                    stmt.column((iden(table), iden(column)));
                }
                SelectColumn::Aliased { expr, alias } => {
                    stmt.expr_as(expr.clone(), iden(alias));
                }
            }
        }

        for join in &self.joins {
            let on = Expr::col((iden(&join.left.0), iden(&join.left.1)))
                .eq(Expr::col((iden(&join.right.0), iden(&join.right.1))));
            stmt.join(join.kind, iden(&join.table), on);
        }

        if let Some(condition) = &self.condition {
            stmt.cond_where(condition.clone());
        }
        for (table, column) in &self.group_by {
            stmt.group_by_col((iden(table), iden(column)));
        }

        if paging {
            for (table, column, order) in &self.order_by {
                stmt.order_by((iden(table), iden(column)), order.clone());
            }
            if let Some(limit) = self.limit {
                stmt.limit(limit);
            }
            if let Some(offset) = self.offset {
                stmt.offset(offset);
            }
        }
        stmt
    }

    /// Render to PostgreSQL with numbered placeholders
    pub fn build(&self) -> (String, Values) {
        self.statement(true).build(PostgresQueryBuilder)
    }

    /// Render the `COUNT(*)` form; grouped queries are counted through a subquery
    pub fn build_count(&self) -> (String, Values) {
        let mut inner = self.statement(false);
        if self.group_by.is_empty() {
            inner.clear_selects();
            inner.expr(Expr::cust("COUNT(*)"));
            return inner.build(PostgresQueryBuilder);
        }
        let mut outer = Query::select();
        outer
            .expr(Expr::cust("COUNT(*)"))
            .from_subquery(inner, iden("__tm_count"));
        outer.build(PostgresQueryBuilder)
    }
}

fn raw_expr(sql: &str, bindings: &Bindings) -> Result<Expr> {
    let (sql, values) = bind_named(sql, bindings)?;
    Ok(Expr::cust_with_values(sql, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Select {
        Select::new(Arc::new(
            EntityDef::builder("User", "users")
                .attributes(["name", "age", "deleted_at"])
                .scope("adults", |q| Ok(q.where_op("age", Op::Gte, 18)))
                .build(),
        ))
    }

    #[test]
    fn test_default_select_list_is_alias_star() {
        let (sql, values) = users().build();
        assert_eq!(sql, r#"SELECT "users".* FROM "users""#);
        assert!(values.0.is_empty());
        assert!(users().selected_columns().is_empty());
    }

    #[test]
    fn test_columns_are_qualified_with_alias() {
        let (sql, values) = users().alias("u").where_eq("name", "Ada").build();
        assert!(sql.contains(r#"FROM "users" AS "u""#), "{sql}");
        assert!(sql.contains(r#""u"."name" = $1"#), "{sql}");
        assert_eq!(values.0, vec![sea_query::Value::from("Ada")]);
    }

    #[test]
    fn test_or_where_wraps_existing_constraints() {
        let (sql, _) = users()
            .where_eq("name", "Ada")
            .where_null("deleted_at")
            .or_where_eq("name", "Grace")
            .build();
        assert!(sql.contains(" OR "), "{sql}");
        assert!(sql.contains("IS NULL"), "{sql}");
    }

    #[test]
    fn test_in_between_and_column_comparisons() {
        let (sql, values) = users()
            .where_in("id", [1, 2, 3])
            .where_between("age", 18, 65)
            .where_column("name", Op::Ne, "users.email")
            .build();
        assert!(sql.contains(r#""users"."id" IN ($1, $2, $3)"#), "{sql}");
        assert!(sql.contains("BETWEEN $4 AND $5"), "{sql}");
        assert!(sql.contains(r#""users"."name" <> "users"."email""#), "{sql}");
        assert_eq!(values.0.len(), 5);
    }

    #[test]
    fn test_raw_constraints_use_named_bindings() {
        let query = users()
            .where_eq("name", "Ada")
            .where_raw("age > :min", &Bindings::new().bind("min", 18))
            .unwrap();
        let (sql, values) = query.build();
        assert!(sql.contains("age > $"), "{sql}");
        assert_eq!(values.0, vec![sea_query::Value::from("Ada"), sea_query::Value::from(18)]);

        let err = users().where_raw("age > ?", &Bindings::new()).unwrap_err();
        assert!(matches!(err, OrmError::InvalidConstraint(_)));
    }

    #[test]
    fn test_where_not_negates_group() {
        let (sql, _) = users()
            .where_not(Expr::col((iden("users"), iden("age"))).lt(18))
            .build();
        assert!(sql.contains("NOT"), "{sql}");
    }

    #[test]
    fn test_selected_columns_reports_output_names() {
        let query = users().select(["id", "name"]).select_as("age", "years");
        assert_eq!(query.selected_columns(), vec!["id", "name", "years"]);
        assert!(query.selects("name"));
        assert!(!query.selects("deleted_at"));
    }

    #[test]
    fn test_hidden_column_keeps_star() {
        let query = users().add_hidden_column("users.age", "__tm_probe");
        let (sql, _) = query.build();
        assert!(sql.starts_with(r#"SELECT "users".*, "users"."age" AS "__tm_probe""#), "{sql}");
    }

    #[test]
    fn test_join_order_and_paging() {
        let (sql, _) = users()
            .join("role_user", "role_user.user_id", "id")
            .order_by("name", Order::Desc)
            .limit(10)
            .offset(20)
            .build();
        assert!(
            sql.contains(r#"INNER JOIN "role_user" ON "role_user"."user_id" = "users"."id""#),
            "{sql}"
        );
        assert!(sql.contains(r#"ORDER BY "users"."name" DESC"#), "{sql}");
        assert!(sql.ends_with("LIMIT $1 OFFSET $2"), "{sql}");
    }

    #[test]
    fn test_count_drops_paging_and_wraps_grouped_queries() {
        let (sql, _) = users().where_eq("age", 30).order_by("name", Order::Asc).limit(5).build_count();
        assert!(sql.starts_with("SELECT COUNT(*) FROM"), "{sql}");
        assert!(!sql.contains("ORDER BY"), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");

        let (sql, _) = users().select(["age"]).group_by("age").build_count();
        assert!(sql.contains("FROM (SELECT"), "{sql}");
        assert!(sql.contains(r#"AS "__tm_count""#), "{sql}");
    }

    #[test]
    fn test_scopes() {
        let (sql, _) = users().scope("adults").unwrap().build();
        assert!(sql.contains(">= $1"), "{sql}");
        assert!(matches!(
            users().scope("missing"),
            Err(OrmError::UnknownScope { ref scope, .. }) if scope == "missing"
        ));
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("<=".parse::<Op>().unwrap(), Op::Lte);
        assert_eq!("like".parse::<Op>().unwrap(), Op::Like);
        assert!("~*".parse::<Op>().is_err());
    }
}
