//! # Dialect Module
//!
//! Stateless translation of CRUD intents into SQL text for one database
//! flavor.
//!
//! Every function is pure: it receives a table name, an optional alias, an
//! optional WHERE fragment and an optional column list (empty means all
//! columns), and returns SQL using the single positional `?` placeholder
//! style. Callers supply parameters in placeholder order. Right before
//! execution, [`Dialect::prepare`] rewrites the placeholders into the
//! driver's native style.
//!
//! ## Example
//!
//! ```rust,ignore
//! use active_orm::dialect::{Dialect, StandardDialect};
//! use active_orm::database::Drivers;
//!
//! let dialect = StandardDialect::new(Drivers::Postgres);
//! let sql = dialect.select("users", None, Some("age > ?"), &[]);
//! assert_eq!(sql, r#"SELECT * FROM "users" WHERE age > ?"#);
//! assert_eq!(dialect.prepare(&sql), r#"SELECT * FROM "users" WHERE age > $1"#);
//! ```

use std::{borrow::Cow, fmt::Debug};

use crate::database::Drivers;

// ============================================================================
// Isolation Levels
// ============================================================================

/// Standard SQL transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

// ============================================================================
// Dialect Trait
// ============================================================================

/// SQL rendering contract for one database flavor.
pub trait Dialect: Debug + Send + Sync {
    fn driver(&self) -> Drivers;

    /// Quotes an identifier; dotted names are quoted part by part.
    fn quote(&self, identifier: &str) -> String;

    fn select(&self, table: &str, alias: Option<&str>, filter: Option<&str>, columns: &[&str]) -> String;

    fn insert(&self, table: &str, columns: &[&str]) -> String;

    fn update(&self, table: &str, alias: Option<&str>, filter: Option<&str>, columns: &[&str]) -> String;

    fn delete(&self, table: &str, filter: Option<&str>) -> String;

    fn count(&self, table: &str, alias: Option<&str>, filter: Option<&str>) -> String;

    /// Limits `sql` to page `page_number` (1-indexed) of `page_size` rows.
    fn paginate_with(&self, page_number: usize, page_size: usize, sql: &str) -> String;

    /// Counts the rows `sql` would return.
    fn count_with(&self, sql: &str) -> String;

    /// Rewrites `?` placeholders into the driver's native style.
    fn prepare<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(sql)
    }

    /// Statements that physically open a transaction.
    fn begin_statements(&self, readonly: bool, isolation: Option<IsolationLevel>) -> Vec<String>;

    fn commit_statement(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_statement(&self) -> &'static str {
        "ROLLBACK"
    }

    /// Suffix appended to an INSERT to read a generated key back, for drivers
    /// that do not report the last inserted id.
    fn returning(&self, _key: &str) -> Option<String> {
        None
    }
}

// ============================================================================
// Standard Dialect
// ============================================================================

/// Dialect for the drivers shipped with sqlx: PostgreSQL, MySQL and SQLite.
#[derive(Debug, Clone, Copy)]
pub struct StandardDialect {
    driver: Drivers,
}

impl StandardDialect {
    pub fn new(driver: Drivers) -> Self {
        Self { driver }
    }

    fn quote_part(&self, part: &str) -> String {
        let part = part.trim();
        if part == "*" {
            return part.to_string();
        }
        match self.driver {
            Drivers::MySQL => format!("`{}`", part.replace('`', "``")),
            Drivers::Postgres | Drivers::SQLite => format!("\"{}\"", part.replace('"', "\"\"")),
        }
    }

    fn column_list(&self, alias: Option<&str>, columns: &[&str]) -> String {
        let columns: Vec<&str> = columns.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
        if columns.is_empty() || columns == ["*"] {
            return match alias {
                Some(a) => format!("{}.*", a),
                None => "*".to_string(),
            };
        }
        columns
            .iter()
            .map(|c| match alias {
                Some(a) if is_plain_identifier(c) => format!("{}.{}", a, c),
                _ => c.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn table_ref(&self, table: &str, alias: Option<&str>) -> String {
        match alias {
            Some(a) => format!("{} AS {}", self.quote(table), a),
            None => self.quote(table),
        }
    }
}

/// Appends a filter, omitting `WHERE` when the fragment only orders, groups or
/// limits.
fn push_filter(sql: &mut String, filter: Option<&str>) {
    let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return;
    };
    let lower = filter.to_ascii_lowercase();
    if ["order by", "group by", "limit"].iter().any(|k| lower.starts_with(k)) {
        sql.push(' ');
    } else {
        sql.push_str(" WHERE ");
    }
    sql.push_str(filter);
}

fn is_plain_identifier(column: &str) -> bool {
    column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

impl Dialect for StandardDialect {
    fn driver(&self) -> Drivers {
        self.driver
    }

    fn quote(&self, identifier: &str) -> String {
        identifier.split('.').map(|p| self.quote_part(p)).collect::<Vec<_>>().join(".")
    }

    fn select(&self, table: &str, alias: Option<&str>, filter: Option<&str>, columns: &[&str]) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.column_list(alias, columns), self.table_ref(table, alias));
        push_filter(&mut sql, filter);
        sql
    }

    fn insert(&self, table: &str, columns: &[&str]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", self.quote(table), names.join(", "), placeholders)
    }

    fn update(&self, table: &str, alias: Option<&str>, filter: Option<&str>, columns: &[&str]) -> String {
        let assignments: Vec<String> = columns.iter().map(|c| format!("{} = ?", self.quote(c))).collect();
        let mut sql = format!("UPDATE {} SET {}", self.table_ref(table, alias), assignments.join(", "));
        push_filter(&mut sql, filter);
        sql
    }

    fn delete(&self, table: &str, filter: Option<&str>) -> String {
        let mut sql = format!("DELETE FROM {}", self.quote(table));
        push_filter(&mut sql, filter);
        sql
    }

    fn count(&self, table: &str, alias: Option<&str>, filter: Option<&str>) -> String {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table_ref(table, alias));
        push_filter(&mut sql, filter);
        sql
    }

    fn paginate_with(&self, page_number: usize, page_size: usize, sql: &str) -> String {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        format!("{} LIMIT {} OFFSET {}", strip_terminator(sql), page_size, offset)
    }

    fn count_with(&self, sql: &str) -> String {
        format!("SELECT COUNT(*) FROM ({}) count_source", strip_terminator(sql))
    }

    fn prepare<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        match self.driver {
            Drivers::Postgres if sql.contains('?') => Cow::Owned(numbered_placeholders(sql)),
            _ => Cow::Borrowed(sql),
        }
    }

    fn begin_statements(&self, readonly: bool, isolation: Option<IsolationLevel>) -> Vec<String> {
        match self.driver {
            Drivers::Postgres => {
                let mut begin = String::from("BEGIN");
                if let Some(level) = isolation {
                    begin.push_str(" ISOLATION LEVEL ");
                    begin.push_str(level.as_sql());
                }
                if readonly {
                    begin.push_str(" READ ONLY");
                }
                vec![begin]
            }
            Drivers::MySQL => {
                let mut statements = Vec::with_capacity(2);
                if let Some(level) = isolation {
                    statements.push(format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()));
                }
                statements.push(if readonly { "START TRANSACTION READ ONLY" } else { "START TRANSACTION" }.to_string());
                statements
            }
            // SQLite transactions are always serializable and have no read-only mode.
            Drivers::SQLite => vec!["BEGIN".to_string()],
        }
    }

    fn returning(&self, key: &str) -> Option<String> {
        match self.driver {
            Drivers::Postgres => Some(format!(" RETURNING {}", self.quote(key))),
            _ => None,
        }
    }
}

/// Replaces `?` with `$1`, `$2`, ... outside of quoted literals and identifiers.
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut counter = 1;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '?' => {
                out.push_str(&format!("${}", counter));
                counter += 1;
                continue;
            }
            None => {}
        }
        out.push(c);
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite() -> StandardDialect {
        StandardDialect::new(Drivers::SQLite)
    }

    #[test]
    fn test_select_variants() {
        let d = sqlite();
        assert_eq!(d.select("users", None, None, &[]), r#"SELECT * FROM "users""#);
        assert_eq!(d.select("users", None, Some("id = ?"), &["id", " name"]), r#"SELECT id, name FROM "users" WHERE id = ?"#);
        assert_eq!(
            d.select("users", Some("u"), Some("u.age > ?"), &["id", "count(*)"]),
            r#"SELECT u.id, count(*) FROM "users" AS u WHERE u.age > ?"#
        );
        assert_eq!(d.select("users", Some("u"), None, &["*"]), r#"SELECT u.* FROM "users" AS u"#);
        assert_eq!(d.select("users", None, Some("ORDER BY id DESC"), &[]), r#"SELECT * FROM "users" ORDER BY id DESC"#);
    }

    #[test]
    fn test_write_statements() {
        let d = StandardDialect::new(Drivers::MySQL);
        assert_eq!(d.insert("users", &["name", "age"]), "INSERT INTO `users` (`name`, `age`) VALUES (?, ?)");
        assert_eq!(d.update("users", None, Some("`id`=?"), &["name"]), "UPDATE `users` SET `name` = ? WHERE `id`=?");
        assert_eq!(d.delete("users", None), "DELETE FROM `users`");
        assert_eq!(d.count("users", None, Some("age > ?")), "SELECT COUNT(*) FROM `users` WHERE age > ?");
        assert_eq!(d.quote("shop.orders"), "`shop`.`orders`");
    }

    #[test]
    fn test_pagination_rewrites_keep_order_by() {
        let d = sqlite();
        let sql = "SELECT * FROM users ORDER BY name;";
        assert_eq!(d.paginate_with(1, 1, sql), "SELECT * FROM users ORDER BY name LIMIT 1 OFFSET 0");
        assert_eq!(d.paginate_with(3, 10, sql), "SELECT * FROM users ORDER BY name LIMIT 10 OFFSET 20");
        let huge = d.paginate_with(usize::MAX, 2, sql);
        assert!(huge.ends_with(&format!("OFFSET {}", usize::MAX)));
        assert_eq!(d.count_with(sql), "SELECT COUNT(*) FROM (SELECT * FROM users ORDER BY name) count_source");
    }

    #[test]
    fn test_postgres_placeholders_skip_literals() {
        let d = StandardDialect::new(Drivers::Postgres);
        assert_eq!(d.prepare("SELECT * FROM t WHERE a = ? AND b = '?' AND c IN (?, ?)"), "SELECT * FROM t WHERE a = $1 AND b = '?' AND c IN ($2, $3)");
        assert!(matches!(sqlite().prepare("a = ?"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_begin_statements_per_driver() {
        let pg = StandardDialect::new(Drivers::Postgres);
        assert_eq!(pg.begin_statements(true, Some(IsolationLevel::Serializable)), vec!["BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY"]);

        let my = StandardDialect::new(Drivers::MySQL);
        assert_eq!(
            my.begin_statements(false, Some(IsolationLevel::ReadCommitted)),
            vec!["SET TRANSACTION ISOLATION LEVEL READ COMMITTED", "START TRANSACTION"]
        );

        assert_eq!(sqlite().begin_statements(true, None), vec!["BEGIN"]);
        assert_eq!(pg.returning("id").as_deref(), Some(r#" RETURNING "id""#));
        assert_eq!(sqlite().returning("id"), None);
    }
}
