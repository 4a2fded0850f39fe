//! Backend-neutral read queries.
//!
//! A [`Select`] names a table or view, equality/range filters and an
//! ordering. Each store renders it in its own dialect; paging is supplied
//! separately so the same query can be walked page by page.

use anyhow::Result;
use serde_json::Value;

/// Row filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::Gte(c, _) | Filter::Lte(c, _) => c,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Filter::Eq(_, v) | Filter::Gte(_, v) | Filter::Lte(_, v) => v,
        }
    }

    /// PostgREST operator name
    pub fn rest_op(&self) -> &'static str {
        match self {
            Filter::Eq(..) => "eq",
            Filter::Gte(..) => "gte",
            Filter::Lte(..) => "lte",
        }
    }

    /// SQL comparison operator
    pub fn sql_op(&self) -> &'static str {
        match self {
            Filter::Eq(..) => "=",
            Filter::Gte(..) => ">=",
            Filter::Lte(..) => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub desc: bool,
}

/// Read query over one table or view
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    /// Empty selects every column
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
}

impl Select {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(column.to_string(), value.into()));
        self
    }

    pub fn order(mut self, column: &str, desc: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            desc,
        });
        self
    }

    /// Reject identifiers that are not plain column names
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)?;
        for c in &self.columns {
            validate_identifier(c)?;
        }
        for f in &self.filters {
            validate_identifier(f.column())?;
        }
        for o in &self.order {
            validate_identifier(&o.column)?;
        }
        Ok(())
    }

    /// Render as PostgREST query parameters for one page
    pub fn to_rest_params(&self, offset: usize, limit: usize) -> Vec<(String, String)> {
        let select = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        };

        let mut params = vec![("select".to_string(), select)];
        for f in &self.filters {
            params.push((
                f.column().to_string(),
                format!("{}.{}", f.rest_op(), value_text(f.value())),
            ));
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.desc { "desc" } else { "asc" }))
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }
        params.push(("offset".to_string(), offset.to_string()));
        params.push(("limit".to_string(), limit.to_string()));
        params
    }
}

/// Plain text of a filter value
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Identifiers are ASCII letters, digits and underscores
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("Invalid identifier: {:?}", name);
    }
    Ok(())
}
