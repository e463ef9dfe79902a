//! Built statements and the SQL text helpers shared by the builders.

use crate::{RecordDescriptor, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Delete,
    Raw,
}

/// Parent columns selected through a join, in the parent's column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedShape {
    pub relation: String,
    pub columns: Vec<String>,
}

/// Expected layout of each returned row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowShape {
    /// Record columns, in row order.
    pub columns: Vec<String>,
    /// Joined parents, following the record columns.
    pub joined: Vec<JoinedShape>,
    /// Relations loaded by a secondary query after the rows are mapped.
    pub deferred: Vec<String>,
}

impl RowShape {
    /// Number of values each row must carry.
    pub fn width(&self) -> usize {
        self.columns.len() + self.joined.iter().map(|j| j.columns.len()).sum::<usize>()
    }
}

/// SQL text plus bound parameters, ready for a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltStatement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<Value>,
    pub returning: Option<Vec<String>>,
    pub shape: RowShape,
}

impl BuiltStatement {
    /// A statement written by hand, e.g. `SELECT 1`.
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            kind: StatementKind::Raw,
            sql: sql.into(),
            params,
            returning: None,
            shape: RowShape::default(),
        }
    }

    /// Number of `$n` placeholders in the SQL text, ignoring quoted sections.
    pub fn placeholder_count(&self) -> usize {
        let mut count = 0;
        let mut chars = self.sql.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\'' | '"' => {
                    for inner in chars.by_ref() {
                        if inner == c {
                            break;
                        }
                    }
                }
                '$' if chars.peek().is_some_and(|n| n.is_ascii_digit()) => {
                    count += 1;
                    while chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                        chars.next();
                    }
                }
                _ => {}
            }
        }
        count
    }
}

/// Quote an identifier for PostgreSQL.
pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Rewrite a caller expression: `?` becomes `$n` starting at `first_param`.
///
/// With a scope, bare identifiers naming one of its columns are qualified
/// with its alias. Identifiers that are already qualified, qualify something
/// else, are function calls or casts are left alone, as is anything quoted.
/// Nothing inside a parenthesized subquery is qualified: its bare names
/// belong to its own FROM list.
///
/// Returns the rewritten text and the number of placeholders found.
pub(crate) fn rewrite_expr(
    expr: &str,
    first_param: usize,
    scope: Option<&RecordDescriptor>,
) -> (String, usize) {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len() + 16);
    let mut placeholders = 0;
    let mut i = 0;
    // One entry per open paren, true once that group turned out to be a subquery.
    let mut groups: Vec<bool> = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != c {
                    i += 1;
                }
                i = (i + 1).min(chars.len());
                out.extend(&chars[start..i]);
            }
            '?' => {
                out.push('$');
                out.push_str(&(first_param + placeholders).to_string());
                placeholders += 1;
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                out.extend(&chars[start..i]);
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let opens_subquery = ident.eq_ignore_ascii_case("select");
                if let Some(group) = groups.last_mut().filter(|_| opens_subquery) {
                    *group = true;
                }
                let in_subquery = groups.iter().any(|g| *g);

                let after_dot_or_cast = out.ends_with('.') || out.ends_with(':');
                let before_dot = chars.get(i) == Some(&'.');
                let is_call = chars[i..].iter().find(|c| !c.is_whitespace()) == Some(&'(');

                match scope {
                    Some(descriptor)
                        if !in_subquery
                            && !after_dot_or_cast
                            && !before_dot
                            && !is_call
                            && descriptor.has_column(&ident) =>
                    {
                        out.push_str(&quote(&descriptor.alias));
                        out.push('.');
                        out.push_str(&quote(&ident));
                    }
                    _ => out.push_str(&ident),
                }
            }
            _ => {
                match c {
                    '(' => groups.push(false),
                    ')' => {
                        groups.pop();
                    }
                    _ => {}
                }
                out.push(c);
                i += 1;
            }
        }
    }

    (out, placeholders)
}

/// Whether an expression refers to `qualifier.something`, outside string literals.
pub(crate) fn mentions_qualifier(expr: &str, qualifier: &str) -> bool {
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let ident: Option<String> = match c {
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                i += 1;
                None
            }
            '"' => {
                let start = i + 1;
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    i += 1;
                }
                let quoted = chars[start..i.min(chars.len())].iter().collect();
                i += 1;
                Some(quoted)
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let bare: String = chars[start..i].iter().collect();
                Some(bare.to_lowercase())
            }
            _ => {
                i += 1;
                None
            }
        };

        let qualifies = chars.get(i) == Some(&'.');
        if qualifies && ident.as_deref() == Some(qualifier) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DescriptorBuilder;

    fn books() -> RecordDescriptor {
        DescriptorBuilder::new("Book")
            .table("books")
            .alias("book")
            .primary_key("id")
            .column("title")
            .column("author_id")
            .build()
            .unwrap()
    }

    #[test]
    fn placeholders_are_numbered_from_offset() {
        let (sql, count) = rewrite_expr("a = ? OR b = ?", 3, None);
        assert_eq!(sql, "a = $3 OR b = $4");
        assert_eq!(count, 2);
    }

    #[test]
    fn question_marks_inside_quotes_are_literal() {
        let (sql, count) = rewrite_expr("title = 'why?' AND \"odd?\" = ?", 1, None);
        assert_eq!(sql, "title = 'why?' AND \"odd?\" = $1");
        assert_eq!(count, 1);
    }

    #[test]
    fn bare_child_columns_are_qualified_in_scope() {
        let descriptor = books();
        let (sql, _) = rewrite_expr("id = ? AND author.id = ?", 1, Some(&descriptor));
        assert_eq!(sql, "\"book\".\"id\" = $1 AND author.id = $2");
    }

    #[test]
    fn calls_casts_and_unknown_names_are_untouched() {
        let descriptor = books();
        let (sql, _) = rewrite_expr("lower(title) = ? AND x::title IS NOT NULL", 1, Some(&descriptor));
        assert_eq!(sql, "lower(\"book\".\"title\") = $1 AND x::title IS NOT NULL");
    }

    #[test]
    fn subqueries_keep_their_own_names() {
        let descriptor = books();
        let (sql, count) = rewrite_expr(
            "author_id IN (SELECT id FROM authors WHERE name = ?) AND (title = ? OR id > 2)",
            1,
            Some(&descriptor),
        );
        assert_eq!(
            sql,
            concat!(
                "\"book\".\"author_id\" IN (SELECT id FROM authors WHERE name = $1) ",
                "AND (\"book\".\"title\" = $2 OR \"book\".\"id\" > 2)"
            )
        );
        assert_eq!(count, 2);
    }

    #[test]
    fn finds_relation_qualifiers() {
        assert!(mentions_qualifier("author.id = ?", "author"));
        assert!(mentions_qualifier("\"author\".\"name\" = ?", "author"));
        assert!(mentions_qualifier("lower(Author.name) = ?", "author"));
        assert!(!mentions_qualifier("author_id = ?", "author"));
        assert!(!mentions_qualifier("title = 'author.id'", "author"));
        assert!(!mentions_qualifier("coauthor.id = ?", "author"));
    }

    #[test]
    fn counts_placeholders_outside_quotes() {
        let statement = BuiltStatement::raw("SELECT '$1', $1, $2, \"$3\"", vec![]);
        assert_eq!(statement.placeholder_count(), 2);
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }
}
