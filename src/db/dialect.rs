//! SQL dialect rewriting.
//!
//! The store writes every query once, in PostgreSQL style: `$N`
//! placeholders and explicit `::TYPE` casts (the casts carry the type
//! information that keeps distinct queries distinct in the statement
//! cache). The other backends get a mechanical rewrite:
//!
//! - SQLite: `$N` becomes `?N`, casts are stripped, and the `GREATEST`
//!   function becomes SQLite's scalar `MAX`.
//! - MySQL: `$N` becomes `?`, casts are stripped. Placeholders must
//!   therefore appear exactly once each, in ascending order; the store
//!   keeps that discipline.
//!
//! The rewriter skips quoted strings and comments with a small state
//! machine; it is not a SQL parser and is only meant for the store's own
//! queries.

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    Sqlite,
    Mysql,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

fn scan_digits(bytes: &[u8], start: usize) -> Option<usize> {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    (end > start).then_some(end)
}

fn scan_cast(bytes: &[u8], start: usize) -> Option<usize> {
    // `::IDENT`, optionally `::IDENT(n)` for things like VARCHAR(30).
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    if end == start {
        return None;
    }
    if bytes.get(end) == Some(&b'(') {
        let mut close = end + 1;
        while close < bytes.len() && bytes[close] != b')' {
            close += 1;
        }
        if close < bytes.len() {
            end = close + 1;
        }
    }
    Some(end)
}

/// Rewrite a store query for the target dialect. Returns the input
/// unchanged for PostgreSQL.
#[must_use]
pub fn rewrite_for_dialect(sql: &str, dialect: SqlDialect) -> Cow<'_, str> {
    if dialect == SqlDialect::Postgres {
        return Cow::Borrowed(sql);
    }

    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        let mut consumed = false;
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => state = State::LineComment,
                b'/' if bytes.get(idx + 1) == Some(&b'*') => state = State::BlockComment,
                b'$' => {
                    if let Some(digits_end) = scan_digits(bytes, idx + 1) {
                        let buf = out.get_or_insert_with(|| sql[..idx].to_string());
                        match dialect {
                            SqlDialect::Sqlite => {
                                buf.push('?');
                                buf.push_str(&sql[idx + 1..digits_end]);
                            }
                            SqlDialect::Mysql => buf.push('?'),
                            SqlDialect::Postgres => unreachable!(),
                        }
                        idx = digits_end;
                        consumed = true;
                    }
                }
                b':' if bytes.get(idx + 1) == Some(&b':') => {
                    if let Some(cast_end) = scan_cast(bytes, idx + 2) {
                        out.get_or_insert_with(|| sql[..idx].to_string());
                        idx = cast_end;
                        consumed = true;
                    }
                }
                b'G' | b'g'
                    if dialect == SqlDialect::Sqlite
                        && sql[idx..].len() >= 9
                        && sql[idx..idx + 8].eq_ignore_ascii_case("GREATEST")
                        && bytes[idx + 8] == b'(' =>
                {
                    let buf = out.get_or_insert_with(|| sql[..idx].to_string());
                    buf.push_str("MAX");
                    idx += 8;
                    consumed = true;
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        if let Some(buf) = out.as_mut() {
                            buf.push('\'');
                        }
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    if let Some(buf) = out.as_mut() {
                        buf.push('*');
                    }
                    idx += 1;
                    state = State::Normal;
                }
            }
        }

        if !consumed {
            if let Some(buf) = out.as_mut() {
                buf.push(bytes[idx] as char);
            }
            idx += 1;
        }
    }

    match out {
        Some(buf) => Cow::Owned(buf),
        None => Cow::Borrowed(sql),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_is_identity() {
        let sql = "SELECT Name FROM Worlds WHERE WorldID = $1::INTEGER";
        assert!(matches!(
            rewrite_for_dialect(sql, SqlDialect::Postgres),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn sqlite_numbers_placeholders_and_strips_casts() {
        let sql = "SELECT $1::TEXT, $2::INTEGER FROM t WHERE a = $3::BOOLEAN";
        let out = rewrite_for_dialect(sql, SqlDialect::Sqlite);
        assert_eq!(out, "SELECT ?1, ?2 FROM t WHERE a = ?3");
    }

    #[test]
    fn mysql_uses_positional_placeholders() {
        let sql = "INSERT INTO t (a, b) VALUES ($1::INTEGER, $2::TEXT)";
        let out = rewrite_for_dialect(sql, SqlDialect::Mysql);
        assert_eq!(out, "INSERT INTO t (a, b) VALUES (?, ?)");
    }

    #[test]
    fn parameterized_casts_survive() {
        let sql = "SELECT $1::VARCHAR(30) FROM t";
        let out = rewrite_for_dialect(sql, SqlDialect::Sqlite);
        assert_eq!(out, "SELECT ?1 FROM t");
    }

    #[test]
    fn greatest_maps_to_scalar_max_on_sqlite() {
        let sql = "SELECT GREATEST(PremiumEnd - $1::INTEGER, 0) FROM Accounts";
        let out = rewrite_for_dialect(sql, SqlDialect::Sqlite);
        assert_eq!(out, "SELECT MAX(PremiumEnd - ?1, 0) FROM Accounts");
        // MySQL keeps GREATEST.
        let out = rewrite_for_dialect(sql, SqlDialect::Mysql);
        assert_eq!(out, "SELECT GREATEST(PremiumEnd - ?, 0) FROM Accounts");
    }

    #[test]
    fn literals_and_comments_are_untouched() {
        let sql = "SELECT '$1', \"$2\" -- $3\n/* $4 */ FROM t WHERE a = $5";
        let out = rewrite_for_dialect(sql, SqlDialect::Sqlite);
        assert_eq!(out, "SELECT '$1', \"$2\" -- $3\n/* $4 */ FROM t WHERE a = ?5");
    }

    #[test]
    fn escaped_quotes_stay_quoted() {
        let sql = "SELECT 'it''s $1' WHERE a = $1";
        let out = rewrite_for_dialect(sql, SqlDialect::Sqlite);
        assert_eq!(out, "SELECT 'it''s $1' WHERE a = ?1");
    }
}
