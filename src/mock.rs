//! Recording executor for tests, behind the `mock` feature.
//!
//! `MockExecutor` answers each statement with the next queued result set (or
//! a handler closure) and records every `(sql, values)` pair it receives.
//! Clones share state, so a test can hand one clone to a
//! [`Context`](crate::Context) and inspect the log through another.
//!
//! ```
//! use tidemark::mock::MockExecutor;
//! use tidemark::{row, QueryExecutor};
//! use sea_query::Values;
//!
//! let mock = MockExecutor::new().append_query_results(vec![vec![row! { "id" => 1, "name" => "Ada" }]]);
//! let rows = mock.query_all("SELECT 1", &Values(vec![])).unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(mock.statements(), vec!["SELECT 1".to_string()]);
//! ```

use crate::error::{OrmError, Result};
use crate::executor::QueryExecutor;
use crate::row::Row;
use sea_query::Values;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

type Handler = Rc<dyn Fn(&str, &Values) -> Result<Vec<Row>>>;

#[derive(Default)]
struct MockState {
    results: VecDeque<Vec<Row>>,
    handler: Option<Handler>,
    log: Vec<(String, Values)>,
}

/// In-memory [`QueryExecutor`] returning canned rows
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Rc<RefCell<MockState>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue result sets, answered in order, one per statement
    pub fn append_query_results<I>(self, results: I) -> Self
    where
        I: IntoIterator<Item = Vec<Row>>,
    {
        self.state.borrow_mut().results.extend(results);
        self
    }

    /// Answer statements through `handler` once the queue is empty
    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&str, &Values) -> Result<Vec<Row>> + 'static,
    {
        self.state.borrow_mut().handler = Some(Rc::new(handler));
        self
    }

    /// Every `(sql, values)` received so far
    pub fn log(&self) -> Vec<(String, Values)> {
        self.state.borrow().log.clone()
    }

    /// SQL text of every statement received so far
    pub fn statements(&self) -> Vec<String> {
        self.state
            .borrow()
            .log
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn remaining_results(&self) -> usize {
        self.state.borrow().results.len()
    }
}

impl QueryExecutor for MockExecutor {
    fn query_all(&self, sql: &str, values: &Values) -> Result<Vec<Row>> {
        let mut state = self.state.borrow_mut();
        state.log.push((sql.to_string(), values.clone()));
        if let Some(rows) = state.results.pop_front() {
            return Ok(rows);
        }
        let handler = state.handler.clone();
        drop(state);
        match handler {
            Some(handler) => handler(sql, values),
            None => Err(OrmError::Query(format!(
                "MockExecutor has no result queued for `{sql}`"
            ))),
        }
    }
}

/// Build a [`Row`](crate::Row) from `column => value` pairs
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $(row.insert($column, $value);)+
        row
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_results_then_error() {
        let mock = MockExecutor::new().append_query_results(vec![vec![], vec![crate::row! { "id" => 1 }]]);
        assert!(mock.query_all("a", &Values(vec![])).unwrap().is_empty());
        assert_eq!(mock.query_all("b", &Values(vec![])).unwrap().len(), 1);
        assert!(matches!(
            mock.query_all("c", &Values(vec![])),
            Err(OrmError::Query(_))
        ));
        assert_eq!(mock.statements(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_handler_and_shared_log() {
        let mock = MockExecutor::new().with_handler(|sql, _| {
            Ok(vec![crate::row! { "sql" => sql.to_string() }])
        });
        let observer = mock.clone();
        let rows = mock.query_all("SELECT 1", &Values(vec![1.into()])).unwrap();
        assert_eq!(rows[0].get("sql"), Some(&sea_query::Value::from("SELECT 1")));
        assert_eq!(observer.log()[0].1 .0.len(), 1);
        assert_eq!(observer.remaining_results(), 0);
    }
}
