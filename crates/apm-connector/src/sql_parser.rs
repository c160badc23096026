// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::OnceLock;

use apm_pdata::trace::Span;
use regex::Regex;

pub const DB_SQL_TABLE: &str = "db.sql.table";
pub const DB_STATEMENT: &str = "db.statement";
pub const UNKNOWN_TABLE: &str = "unknown";

static FROM_CLAUSE: OnceLock<Regex> = OnceLock::new();

// The pattern is a literal known to compile.
#[allow(clippy::unwrap_used)]
fn from_clause() -> &'static Regex {
    FROM_CLAUSE.get_or_init(|| Regex::new(r"(?i).*?\sfrom[\s\[]+([^\]\s,)(;]*).*").unwrap())
}

/// Tolerant table-name extraction for datastore spans lacking a structured
/// table attribute.
#[derive(Clone, Debug)]
pub struct SqlParser {
    re: &'static Regex,
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlParser {
    #[must_use]
    pub fn new() -> Self {
        Self { re: from_clause() }
    }

    /// Returns the lower-cased first table after `FROM`, and whether a `FROM`
    /// clause was found at all.
    pub fn extract_table(&self, sql: &str) -> (String, bool) {
        match self.re.captures(sql).and_then(|c| c.get(1)) {
            Some(table) => (table.as_str().to_lowercase(), true),
            None => (String::new(), false),
        }
    }

    /// Table name for a datastore span: `db.sql.table` if set, else parsed from
    /// `db.statement`, else `"unknown"`.
    pub fn get_db_table(&self, span: &Span) -> String {
        if let Some(table) = span.attributes.get_string(DB_SQL_TABLE) {
            return table.into_owned();
        }
        if let Some(statement) = span.attributes.get_string(DB_STATEMENT) {
            let (table, found) = self.extract_table(&statement);
            if found {
                return table;
            }
        }
        UNKNOWN_TABLE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplicate::duplicate_item;

    #[duplicate_item(
        test_name                       sql                                                             table       found;
        [test_select_with_alias_list]   ["Select owners.* from Owners, users"]                          ["owners"]  [true];
        [test_select_with_join]         ["Select * from users u join company c on u.company_id = c.id"] ["users"]   [true];
        [test_bracketed_table]          ["SELECT id FROM [Orders] WHERE id = 1"]                        ["orders"]  [true];
        [test_subquery_paren]           ["select count(*) from pets;"]                                  ["pets"]    [true];
        [test_no_from_clause]           ["DELETE everything"]                                           [""]        [false];
        [test_insert_statement]         ["INSERT INTO users (id) VALUES (1)"]                           [""]        [false];
    )]
    #[test]
    fn test_name() {
        let parser = SqlParser::new();
        assert_eq!(parser.extract_table(sql), (table.to_string(), found));
    }

    #[test]
    fn test_structured_table_wins() {
        let mut span = Span::default();
        span.attributes.insert(DB_SQL_TABLE, "Accounts");
        span.attributes.insert(DB_STATEMENT, "select * from users");
        assert_eq!(SqlParser::new().get_db_table(&span), "Accounts");
    }

    #[test]
    fn test_table_parsed_from_statement() {
        let mut span = Span::default();
        span.attributes.insert(DB_STATEMENT, "select * from Users where id = ?");
        assert_eq!(SqlParser::new().get_db_table(&span), "users");
    }

    #[test]
    fn test_unknown_when_nothing_matches() {
        let mut span = Span::default();
        assert_eq!(SqlParser::new().get_db_table(&span), UNKNOWN_TABLE);

        span.attributes.insert(DB_STATEMENT, "UPDATE users SET name = ?");
        assert_eq!(SqlParser::new().get_db_table(&span), UNKNOWN_TABLE);
    }
}
