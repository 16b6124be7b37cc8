use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// A row from a database query result.
///
/// Column names are shared across all rows of a result set, with a cached
/// name-to-index map to avoid repeated string comparisons.
#[derive(Debug, Clone)]
pub struct DbRow {
    pub column_names: Arc<Vec<String>>,
    pub values: Vec<RowValues>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl DbRow {
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<RowValues>) -> Self {
        let cache = Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>(),
        );
        Self {
            column_names,
            values,
            column_index_cache: cache,
        }
    }

    fn with_cache(
        column_names: Arc<Vec<String>>,
        values: Vec<RowValues>,
        cache: Arc<HashMap<String, usize>>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index_cache: cache,
        }
    }

    /// Index of a column by name, or None if absent.
    #[must_use]
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Value by column name, or None if the column is absent.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Value by column index, or None if out of bounds.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }
}

/// A result set from a database query.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub rows: Vec<DbRow>,
    /// The number of rows affected (for DML statements)
    pub rows_affected: u64,
    column_names: Option<Arc<Vec<String>>>,
    column_index_cache: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            rows: Vec::with_capacity(capacity),
            rows_affected: 0,
            column_names: None,
            column_index_cache: None,
        }
    }

    /// Set the column names shared by all rows of this result set.
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        let cache = Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>(),
        );
        self.column_names = Some(column_names);
        self.column_index_cache = Some(cache);
    }

    #[must_use]
    pub fn column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Append a row; a no-op until column names have been set.
    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        if let (Some(names), Some(cache)) = (&self.column_names, &self.column_index_cache) {
            self.rows
                .push(DbRow::with_cache(names.clone(), values, cache.clone()));
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// The first row, when the query is expected to return at most one.
    #[must_use]
    pub fn first(&self) -> Option<&DbRow> {
        self.rows.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(Arc::new(vec!["Id".to_string(), "Name".to_string()]));
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Text("alice".into())]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::Text("bob".into())]);
        rs
    }

    #[test]
    fn lookup_by_name_and_index() {
        let rs = sample();
        assert_eq!(rs.len(), 2);
        let row = rs.first().unwrap();
        assert_eq!(row.get("Id").unwrap().as_int(), Some(1));
        assert_eq!(row.get_by_index(1).unwrap().as_text(), Some("alice"));
        assert!(row.get("Missing").is_none());
    }

    #[test]
    fn rows_share_column_names() {
        let rs = sample();
        assert!(Arc::ptr_eq(
            &rs.rows[0].column_names,
            &rs.rows[1].column_names
        ));
    }
}
