use std::fmt;

/// A SELECT statement as clause lists, rendered in fixed order:
/// select list, source, conditions, grouping, post-aggregation conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlStatement {
    pub select: Vec<String>,
    pub from: String,
    pub filters: Vec<String>,
    pub group_by: Vec<String>,
    pub having: Vec<String>,
}

impl SqlStatement {
    pub fn render(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.select.join(", "), self.from);

        if !self.filters.is_empty() {
            sql.push_str(&format!(" WHERE {}", self.filters.join(" AND ")));
        }

        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }

        if !self.having.is_empty() {
            sql.push_str(&format!(" HAVING {}", self.having.join(" AND ")));
        }

        sql
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
