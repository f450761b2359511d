//! Named-parameter binding for SQL templates.
//!
//! Templates use `:name` placeholders. Binding rewrites them into the
//! positional syntax of the target dialect and lines up argument values in
//! first-occurrence order. Repeated names reuse the same positional slot.
//! Placeholders inside string literals and comments are left untouched.

use serde_json::{Map, Value};

/// Placeholder syntax of the four supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    SqlServer,
    Oracle,
}

impl Dialect {
    fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql => "?".to_string(),
            Dialect::SqlServer => format!("@p{}", index),
            Dialect::Oracle => format!(":{}", index),
        }
    }
}

/// A rewritten statement and its positional argument values.
///
/// Values are JSON: the executing connector converts them to driver types.
/// A placeholder with no matching argument binds as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub sql: String,
    pub values: Vec<Value>,
}

/// Rewrites `template` for `dialect`, drawing values from `args`.
///
/// Arguments not referenced by the template are ignored. A template with no
/// placeholders comes back unchanged with an empty value list.
pub fn bind(template: &str, args: &Map<String, Value>, dialect: Dialect) -> Binding {
    let mut sql = String::with_capacity(template.len());
    let mut names: Vec<String> = Vec::new();

    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            // String literals: copy through verbatim. '' inside a single
            // quoted literal is an escaped quote, not a terminator.
            b'\'' | b'"' => {
                let quote = bytes[i];
                sql.push(quote as char);
                i += 1;
                while i < bytes.len() {
                    sql.push(bytes[i] as char);
                    if bytes[i] == quote {
                        if quote == b'\'' && bytes.get(i + 1) == Some(&b'\'') {
                            sql.push('\'');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            // Line comment: -- to end of line.
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    sql.push(bytes[i] as char);
                    i += 1;
                }
            }
            // Block comment: /* ... */
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                sql.push_str("/*");
                i += 2;
                while i < bytes.len() {
                    if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        sql.push_str("*/");
                        i += 2;
                        break;
                    }
                    sql.push(bytes[i] as char);
                    i += 1;
                }
            }
            // A `::` cast is not a placeholder.
            b':' if bytes.get(i + 1) == Some(&b':') => {
                sql.push_str("::");
                i += 2;
            }
            b':' if bytes
                .get(i + 1)
                .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') =>
            {
                let start = i + 1;
                let mut end = start + 1;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                let name = &template[start..end];
                let index = match names.iter().position(|n| n == name) {
                    Some(pos) => pos + 1,
                    None => {
                        names.push(name.to_string());
                        names.len()
                    }
                };
                sql.push_str(&dialect.placeholder(index));
                i = end;
            }
            b => {
                // Template is valid UTF-8; copy multi-byte sequences as-is.
                let ch_len = utf8_len(b);
                sql.push_str(&template[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    let values = names
        .iter()
        .map(|name| args.get(name).cloned().unwrap_or(Value::Null))
        .collect();

    Binding { sql, values }
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn rewrites_postgres_placeholders() {
        let binding = bind(
            "SELECT * FROM users WHERE id = :id AND name = :name",
            &args(&[("id", json!(1)), ("name", json!("John"))]),
            Dialect::Postgres,
        );
        assert_eq!(binding.sql, "SELECT * FROM users WHERE id = $1 AND name = $2");
        assert_eq!(binding.values, vec![json!(1), json!("John")]);
    }

    #[test]
    fn rewrites_mysql_placeholders() {
        let binding = bind(
            "SELECT * FROM users WHERE id = :id AND name = :name",
            &args(&[("id", json!(1)), ("name", json!("John"))]),
            Dialect::MySql,
        );
        assert_eq!(binding.sql, "SELECT * FROM users WHERE id = ? AND name = ?");
        assert_eq!(binding.values.len(), 2);
    }

    #[test]
    fn rewrites_sqlserver_placeholders() {
        let binding = bind(
            "SELECT * FROM users WHERE id = :id AND name = :name",
            &args(&[("id", json!(1)), ("name", json!("John"))]),
            Dialect::SqlServer,
        );
        assert_eq!(
            binding.sql,
            "SELECT * FROM users WHERE id = @p1 AND name = @p2"
        );
    }

    #[test]
    fn rewrites_oracle_placeholders() {
        let binding = bind(
            "SELECT * FROM t WHERE a = :a AND b = :b",
            &args(&[("a", json!(1)), ("b", json!(2))]),
            Dialect::Oracle,
        );
        assert_eq!(binding.sql, "SELECT * FROM t WHERE a = :1 AND b = :2");
    }

    #[test]
    fn repeated_name_reuses_slot() {
        let binding = bind(
            "SELECT * FROM users WHERE id = :id OR parent_id = :id",
            &args(&[("id", json!(1))]),
            Dialect::Postgres,
        );
        assert_eq!(
            binding.sql,
            "SELECT * FROM users WHERE id = $1 OR parent_id = $1"
        );
        assert_eq!(binding.values, vec![json!(1)]);
    }

    #[test]
    fn missing_arg_binds_null() {
        let binding = bind(
            "SELECT * FROM users WHERE id = :id",
            &args(&[("other", json!("value"))]),
            Dialect::Postgres,
        );
        assert_eq!(binding.sql, "SELECT * FROM users WHERE id = $1");
        assert_eq!(binding.values, vec![Value::Null]);
    }

    #[test]
    fn extra_args_are_ignored() {
        let binding = bind(
            "SELECT :a",
            &args(&[("a", json!(1)), ("b", json!(2)), ("c", json!(3))]),
            Dialect::Postgres,
        );
        assert_eq!(binding.values, vec![json!(1)]);
    }

    #[test]
    fn no_placeholders_passes_through() {
        let binding = bind("SELECT * FROM users", &Map::new(), Dialect::Postgres);
        assert_eq!(binding.sql, "SELECT * FROM users");
        assert!(binding.values.is_empty());
    }

    #[test]
    fn rebinding_rewritten_sql_is_identity() {
        for dialect in [
            Dialect::Postgres,
            Dialect::MySql,
            Dialect::SqlServer,
            Dialect::Oracle,
        ] {
            let first = bind(
                "SELECT * FROM t WHERE a = :a AND b = :b OR a = :a",
                &args(&[("a", json!(1)), ("b", json!(2))]),
                dialect,
            );
            let second = bind(&first.sql, &Map::new(), dialect);
            assert_eq!(second.sql, first.sql, "dialect {:?}", dialect);
            assert!(second.values.is_empty(), "dialect {:?}", dialect);
        }
    }

    #[test]
    fn skips_string_literals() {
        let binding = bind(
            "SELECT ':not_a_param', \":also_not\" FROM t WHERE id = :id",
            &args(&[("id", json!(5))]),
            Dialect::Postgres,
        );
        assert_eq!(
            binding.sql,
            "SELECT ':not_a_param', \":also_not\" FROM t WHERE id = $1"
        );
        assert_eq!(binding.values, vec![json!(5)]);
    }

    #[test]
    fn skips_escaped_quote_in_literal() {
        let binding = bind(
            "SELECT 'it''s :fine' FROM t WHERE id = :id",
            &args(&[("id", json!(5))]),
            Dialect::Postgres,
        );
        assert_eq!(binding.sql, "SELECT 'it''s :fine' FROM t WHERE id = $1");
    }

    #[test]
    fn skips_comments() {
        let binding = bind(
            "SELECT 1 -- :nope\n/* :also_nope */ FROM t WHERE id = :id",
            &args(&[("id", json!(5))]),
            Dialect::Postgres,
        );
        assert_eq!(
            binding.sql,
            "SELECT 1 -- :nope\n/* :also_nope */ FROM t WHERE id = $1"
        );
        assert_eq!(binding.values.len(), 1);
    }

    #[test]
    fn double_colon_cast_is_not_a_placeholder() {
        let binding = bind(
            "SELECT id::text FROM t WHERE id = :id",
            &args(&[("id", json!(5))]),
            Dialect::Postgres,
        );
        assert_eq!(binding.sql, "SELECT id::text FROM t WHERE id = $1");
    }
}
