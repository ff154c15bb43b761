//! Literal text rewrites applied to every query before it reaches the driver.
//!
//! These are narrow substring substitutions, not a SQL parser. A query that is
//! not written in the exact form a rule expects passes through unchanged.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::error::SqlPoolError;
use crate::types::Dialect;

/// `FORMAT(col, 'yyyy-MM')`, where `col` is a `[bracketed]` or plain
/// (optionally dotted) identifier, written with exactly one space after the comma.
static MONTH_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"FORMAT\((?P<col>\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*), 'yyyy-MM'\)",
    )
    .unwrap_or_else(|err| unreachable!("month format pattern is valid: {err}"))
});

#[derive(Debug, Clone)]
enum Replacement {
    /// `$name` / `${name}` refer to capture groups.
    Template(String),
    Literal(String),
}

#[derive(Debug, Clone)]
pub struct RewriteRule {
    name: String,
    pattern: Regex,
    replacement: Replacement,
}

impl RewriteRule {
    /// A rule driven by a regular expression; `replacement` may reference
    /// capture groups as `$name`.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::ConfigError`] if `pattern` does not compile.
    pub fn pattern(
        name: impl Into<String>,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> Result<Self, SqlPoolError> {
        let name = name.into();
        let pattern = Regex::new(pattern)
            .map_err(|e| SqlPoolError::ConfigError(format!("rewrite rule {name}: {e}")))?;
        Ok(Self {
            name,
            pattern,
            replacement: Replacement::Template(replacement.into()),
        })
    }

    /// Replace every occurrence of `from` with `to`, byte for byte.
    #[must_use]
    pub fn literal(name: impl Into<String>, from: &str, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: Regex::new(&regex::escape(from))
                .unwrap_or_else(|err| unreachable!("escaped literal is a valid pattern: {err}")),
            replacement: Replacement::Literal(to.into()),
        }
    }

    /// `FORMAT(col, 'yyyy-MM')` becomes `CONVERT(varchar(7), col, 120)`, since
    /// the driver cannot run `FORMAT`.
    #[must_use]
    pub fn month_format() -> Self {
        Self {
            name: "month-format".to_string(),
            pattern: MONTH_FORMAT.clone(),
            replacement: Replacement::Template("CONVERT(varchar(7), ${col}, 120)".to_string()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn apply<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        match &self.replacement {
            Replacement::Template(template) => self.pattern.replace_all(sql, template.as_str()),
            Replacement::Literal(text) => self.pattern.replace_all(sql, NoExpand(text)),
        }
    }
}

/// Ordered set of rules; each rule sees the output of the previous one.
#[derive(Debug, Clone, Default)]
pub struct Rewriter {
    rules: Vec<RewriteRule>,
}

impl Rewriter {
    /// No rules at all.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// The rules every query for `dialect` goes through.
    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Mssql => Self::none().with_rule(RewriteRule::month_format()),
            Dialect::Sqlite => Self::none(),
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: RewriteRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    #[must_use]
    pub fn apply<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(sql);
        for rule in &self.rules {
            let rewritten = match rule.apply(&current) {
                Cow::Owned(text) => Some(text),
                Cow::Borrowed(_) => None,
            };
            if let Some(text) = rewritten {
                current = Cow::Owned(text);
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_format_rewrites_bracketed_column() {
        let sql = "SELECT FORMAT([LoanDisbursementDate], 'yyyy-MM') AS m, COUNT(*) FROM Loans \
                   GROUP BY FORMAT([LoanDisbursementDate], 'yyyy-MM')";
        let out = RewriteRule::month_format().apply(sql);
        assert_eq!(
            out,
            "SELECT CONVERT(varchar(7), [LoanDisbursementDate], 120) AS m, COUNT(*) FROM Loans \
             GROUP BY CONVERT(varchar(7), [LoanDisbursementDate], 120)"
        );
    }

    #[test]
    fn month_format_rewrites_plain_and_dotted_columns() {
        let out = RewriteRule::month_format().apply("SELECT FORMAT(l.PaidOn, 'yyyy-MM') FROM l");
        assert_eq!(out, "SELECT CONVERT(varchar(7), l.PaidOn, 120) FROM l");
    }

    #[test]
    fn non_canonical_forms_pass_through() {
        let rule = RewriteRule::month_format();
        for sql in [
            "SELECT FORMAT([d],'yyyy-MM')",
            "SELECT format([d], 'yyyy-MM')",
            "SELECT FORMAT([d], 'yyyy-MM-dd')",
            "SELECT FORMAT(DATEADD(day, 1, d), 'yyyy-MM')",
        ] {
            assert!(matches!(rule.apply(sql), Cow::Borrowed(_)), "{sql}");
        }
    }

    #[test]
    fn rewriting_twice_equals_rewriting_once() {
        let rewriter = Rewriter::for_dialect(Dialect::Mssql);
        for sql in [
            "SELECT FORMAT([LoanDisbursementDate], 'yyyy-MM') FROM Loans",
            "SELECT CONVERT(varchar(7), [LoanDisbursementDate], 120) FROM Loans",
            "SELECT 1",
        ] {
            let once = rewriter.apply(sql).into_owned();
            let twice = rewriter.apply(&once).into_owned();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn literal_rule_does_not_expand_dollars() {
        let rule = RewriteRule::literal("price", "PRICE()", "$amount");
        assert_eq!(rule.apply("SELECT PRICE()"), "SELECT $amount");
    }

    #[test]
    fn rules_apply_in_order_and_sqlite_has_none() {
        let rewriter = Rewriter::none()
            .with_rule(RewriteRule::literal("a", "GETDATE()", "CURRENT_TIMESTAMP"))
            .with_rule(RewriteRule::pattern("b", "CURRENT_(?P<x>TIMESTAMP)", "NOW_$x").unwrap());
        assert_eq!(rewriter.apply("SELECT GETDATE()"), "SELECT NOW_TIMESTAMP");
        assert!(Rewriter::for_dialect(Dialect::Sqlite).rules().is_empty());
        assert!(RewriteRule::pattern("bad", "(", "").is_err());
    }
}
