//! Small typed SELECT builder over `sqlx::QueryBuilder`.
//!
//! Every value goes through `push_bind`, so a placeholder is only ever emitted
//! together with its argument and the two can't drift apart.

use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Sqlite};

use crate::db::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    GlobalAddressIndex,
    AddressFragments,
    GlobalTransactionIndex,
    Blocks,
    Transactions,
    Addresses,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::GlobalAddressIndex => "global_address_index",
            Table::AddressFragments => "address_fragments",
            Table::GlobalTransactionIndex => "global_transaction_index",
            Table::Blocks => "blocks",
            Table::Transactions => "transactions",
            Table::Addresses => "addresses",
        }
    }
}

/// Turn a literal needle into a `LIKE` pattern matching it anywhere.
pub fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub struct Select {
    builder: QueryBuilder<'static, Sqlite>,
    has_predicate: bool,
}

impl Select {
    pub fn new(columns: &str, table: Table) -> Self {
        let mut builder = QueryBuilder::new("SELECT ");
        builder.push(columns).push(" FROM ").push(table.name());
        Self {
            builder,
            has_predicate: false,
        }
    }

    fn clause(&mut self) -> &mut QueryBuilder<'static, Sqlite> {
        self.builder
            .push(if self.has_predicate { " AND " } else { " WHERE " });
        self.has_predicate = true;
        &mut self.builder
    }

    pub fn eq(mut self, column: &'static str, value: &str) -> Self {
        self.clause()
            .push(column)
            .push(" = ")
            .push_bind(value.to_string());
        self
    }

    /// `column` contains `needle` as a literal substring.
    pub fn contains(mut self, column: &'static str, needle: &str) -> Self {
        self.clause()
            .push(column)
            .push(" LIKE ")
            .push_bind(contains_pattern(needle))
            .push(" ESCAPE '\\'");
        self
    }

    /// Conjunction of `contains` clauses, one per needle.
    pub fn contains_all(self, column: &'static str, needles: &[String]) -> Self {
        needles
            .iter()
            .fold(self, |select, needle| select.contains(column, needle))
    }

    pub fn is_in(mut self, column: &'static str, values: &[String]) -> Self {
        let builder = self.clause();
        push_in_list(builder, column, values);
        self
    }

    /// `(left IN values OR right IN values)`.
    pub fn either_in(mut self, left: &'static str, right: &'static str, values: &[String]) -> Self {
        let builder = self.clause();
        builder.push("(");
        push_in_list(builder, left, values);
        builder.push(" OR ");
        push_in_list(builder, right, values);
        builder.push(")");
        self
    }

    /// Apply `apply` only when a value is present.
    pub fn optional<T>(self, value: Option<T>, apply: impl FnOnce(Self, T) -> Self) -> Self {
        match value {
            Some(value) => apply(self, value),
            None => self,
        }
    }

    pub fn order_by(mut self, ordering: &'static str) -> Self {
        self.builder.push(" ORDER BY ").push(ordering);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.builder.push(" LIMIT ").push_bind(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.builder.push(" OFFSET ").push_bind(offset);
        self
    }

    pub fn sql(&self) -> &str {
        self.builder.sql()
    }

    pub async fn fetch_all<T>(mut self, store: &Store) -> Result<Vec<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        store.record_statement();
        self.builder
            .build_query_as::<T>()
            .fetch_all(store.pool())
            .await
    }

    pub async fn fetch_optional<T>(self, store: &Store) -> Result<Option<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        Ok(self.limit(1).fetch_all(store).await?.into_iter().next())
    }
}

fn push_in_list(builder: &mut QueryBuilder<'static, Sqlite>, column: &'static str, values: &[String]) {
    if values.is_empty() {
        // An empty IN list matches nothing
        builder.push("0 = 1");
        return;
    }

    builder.push(column).push(" IN (");
    let mut list = builder.separated(", ");
    for value in values {
        list.push_bind(value.clone());
    }
    list.push_unseparated(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(contains_pattern("ab"), "%ab%");
        assert_eq!(contains_pattern("a_b%"), "%a\\_b\\%%");
    }

    #[test]
    fn placeholders_follow_bound_values() {
        let select = Select::new("address, blockchain", Table::GlobalAddressIndex)
            .contains_all("address", &["06e3".to_string(), "13d0".to_string()])
            .is_in("blockchain", &["bitcoin".to_string(), "ethereum".to_string()])
            .order_by("address")
            .limit(20);

        assert_eq!(
            select.sql(),
            "SELECT address, blockchain FROM global_address_index \
             WHERE address LIKE ? ESCAPE '\\' AND address LIKE ? ESCAPE '\\' \
             AND blockchain IN (?, ?) ORDER BY address LIMIT ?"
        );
        assert_eq!(select.sql().matches('?').count(), 5);
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let select = Select::new("tx_hash", Table::GlobalTransactionIndex)
            .either_in("from_address", "to_address", &[]);
        assert_eq!(
            select.sql(),
            "SELECT tx_hash FROM global_transaction_index WHERE (0 = 1 OR 0 = 1)"
        );
    }

    #[test]
    fn optional_clause_only_applies_when_present() {
        let chains: Option<Vec<String>> = None;
        let select = Select::new("address", Table::GlobalAddressIndex)
            .optional(chains.as_deref(), |s, chains| s.is_in("blockchain", chains));
        assert!(!select.sql().contains("WHERE"));
    }
}
