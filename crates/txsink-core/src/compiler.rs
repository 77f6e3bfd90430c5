//! Filter-to-SQL compiler for tx searches.
//!
//! Compilation happens in two steps:
//!
//! 1. [`TxQueryPlan::compile`] is pure: it splits the conjunction into a
//!    height window (equality dedup, range extraction) and the remaining
//!    attribute filters, and clamps the limit.
//! 2. [`TxQueryPlan::render`] emits the SQL text and its positional
//!    parameters for a [`Dialect`]. When the query carries no height
//!    constraint the window is bounded by the chain tip, which the caller
//!    reads inside the search transaction and passes in.
//!
//! Only fixed table/column names and operator symbols are ever written into
//! the SQL text. Every tag and value from the filter becomes a bind parameter.

use crate::error::IndexerError;
use crate::query::{Condition, Number, Operator, Query, Value};
use crate::sink::{TABLE_ATTRIBUTES, TABLE_EVENTS, TABLE_TX_REQUESTS, TABLE_TX_RESULTS};
use crate::types::TX_HEIGHT_KEY;

/// Ceiling applied to the caller's requested limit.
pub const TX_SEARCH_LIMIT: u16 = 5000;

// ─── Height info ──────────────────────────────────────────────────────────────

/// One side of a height range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    pub value: i64,
    pub inclusive: bool,
}

/// Optional lower and upper height bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeightRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl HeightRange {
    pub fn is_empty(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Keep the tighter of the current and the new lower bound.
    pub fn tighten_lower(&mut self, b: Bound) {
        let replace = match self.lower {
            None => true,
            Some(cur) => b.value > cur.value || (b.value == cur.value && !b.inclusive),
        };
        if replace {
            self.lower = Some(b);
        }
    }

    /// Keep the tighter of the current and the new upper bound.
    pub fn tighten_upper(&mut self, b: Bound) {
        let replace = match self.upper {
            None => true,
            Some(cur) => b.value < cur.value || (b.value == cur.value && !b.inclusive),
        };
        if replace {
            self.upper = Some(b);
        }
    }
}

/// Height constraints pulled out of a filter expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeightInfo {
    /// Bare `tx.height = N`; the last one in the expression wins.
    pub height: Option<i64>,
    pub range: HeightRange,
}

/// Remove every `tx.height = N` condition, keeping the last value.
pub fn dedup_height(conditions: &[Condition]) -> Result<(Vec<Condition>, HeightInfo), IndexerError> {
    let mut info = HeightInfo::default();
    let mut rest = Vec::with_capacity(conditions.len());
    for c in conditions {
        if c.tag == TX_HEIGHT_KEY && c.op == Operator::Eq {
            info.height = Some(height_arg(c)?);
        } else {
            rest.push(c.clone());
        }
    }
    Ok((rest, info))
}

/// Remove every `tx.height` range comparison, folding them into one range.
pub fn extract_height_range(
    conditions: Vec<Condition>,
) -> Result<(Vec<Condition>, HeightRange), IndexerError> {
    let mut range = HeightRange::default();
    let mut rest = Vec::with_capacity(conditions.len());
    for c in conditions {
        if c.tag != TX_HEIGHT_KEY || !c.op.is_range() {
            rest.push(c);
            continue;
        }
        let value = height_arg(&c)?;
        match c.op {
            Operator::Gt => range.tighten_lower(Bound { value, inclusive: false }),
            Operator::Geq => range.tighten_lower(Bound { value, inclusive: true }),
            Operator::Lt => range.tighten_upper(Bound { value, inclusive: false }),
            Operator::Leq => range.tighten_upper(Bound { value, inclusive: true }),
            _ => unreachable!("is_range covers exactly the four bound operators"),
        }
    }
    Ok((rest, range))
}

fn height_arg(c: &Condition) -> Result<i64, IndexerError> {
    match &c.arg {
        Some(Value::Number(n)) => n.to_i64_exact(),
        Some(Value::Str(s)) => match Number::parse(s) {
            Some(n) => n.to_i64_exact(),
            None => Err(IndexerError::RangeConversion { value: s.clone() }),
        },
        None => Err(IndexerError::RangeConversion {
            value: c.to_string(),
        }),
    }
}

// ─── Dialect ──────────────────────────────────────────────────────────────────

/// Backend-specific SQL expressions. Implementations must only return fixed
/// SQL text around the expressions they are given.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Numeric view of a text column; `NULL` when the text is not a number.
    fn numeric_column(&self, expr: &str) -> String;

    /// Numeric view of a text bind parameter that is known to be a number.
    fn numeric_param(&self, param: &str) -> String;

    /// Boolean "`haystack` contains `needle`".
    fn contains(&self, haystack: &str, needle: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn numeric_column(&self, expr: &str) -> String {
        format!("(CASE WHEN {expr} ~ '^-?[0-9]+(\\.[0-9]+)?$' THEN CAST({expr} AS NUMERIC) END)")
    }

    fn numeric_param(&self, param: &str) -> String {
        format!("CAST({param} AS NUMERIC)")
    }

    fn contains(&self, haystack: &str, needle: &str) -> String {
        format!("strpos({haystack}, {needle}) > 0")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    /// GLOB has no anchored regex, so `-?[0-9]+(\.[0-9]+)?` is spelled out:
    /// a leading digit (after an optional sign), only digits, `-` and `.`,
    /// no inner `-`, at most one `.` and no trailing `.`.
    fn numeric_column(&self, expr: &str) -> String {
        format!(
            "(CASE WHEN ({expr} GLOB '[0-9]*' OR {expr} GLOB '-[0-9]*') \
             AND {expr} NOT GLOB '*[^0-9.-]*' \
             AND {expr} NOT GLOB '?*-*' \
             AND {expr} NOT GLOB '*.*.*' \
             AND {expr} NOT GLOB '*.' \
             THEN CAST({expr} AS REAL) END)"
        )
    }

    fn numeric_param(&self, param: &str) -> String {
        format!("CAST({param} AS REAL)")
    }

    fn contains(&self, haystack: &str, needle: &str) -> String {
        format!("instr({haystack}, {needle}) > 0")
    }
}

// ─── Compiled output ──────────────────────────────────────────────────────────

/// A positional bind parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlArg {
    Int(i64),
    Text(String),
}

/// SQL text plus its parameters, `$1` being `args[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

struct Args(Vec<SqlArg>);

impl Args {
    /// Push a parameter and return its placeholder.
    fn push(&mut self, arg: SqlArg) -> String {
        self.0.push(arg);
        format!("${}", self.0.len())
    }
}

// ─── Plan ─────────────────────────────────────────────────────────────────────

/// Which heights the candidate scan is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightWindow {
    Range(HeightRange),
    Exact(i64),
    /// No height constraint: everything at or below the chain tip.
    BelowTip,
}

/// A compiled, backend-independent tx search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxQueryPlan {
    window: HeightWindow,
    filters: Vec<Condition>,
    limit: u16,
}

impl TxQueryPlan {
    pub fn compile(query: &Query, limit: u16) -> Result<Self, IndexerError> {
        Self::compile_with_ceiling(query, limit, TX_SEARCH_LIMIT)
    }

    pub fn compile_with_ceiling(
        query: &Query,
        limit: u16,
        ceiling: u16,
    ) -> Result<Self, IndexerError> {
        let (rest, mut info) = dedup_height(query.conditions())?;
        let (filters, range) = extract_height_range(rest)?;
        info.range = range;

        let window = if !info.range.is_empty() {
            HeightWindow::Range(info.range)
        } else if let Some(h) = info.height {
            HeightWindow::Exact(h)
        } else {
            HeightWindow::BelowTip
        };

        for c in &filters {
            if c.op != Operator::Exists && c.arg.is_none() {
                return Err(IndexerError::query(format!("missing value for {}", c.tag)));
            }
        }

        Ok(Self {
            window,
            filters,
            limit: limit.min(ceiling),
        })
    }

    pub fn window(&self) -> HeightWindow {
        self.window
    }

    /// Conditions that are matched against event attributes.
    pub fn filters(&self) -> &[Condition] {
        &self.filters
    }

    pub fn limit(&self) -> u16 {
        self.limit
    }

    /// Whether [`render`](Self::render) needs the current chain tip.
    pub fn needs_tip(&self) -> bool {
        self.window == HeightWindow::BelowTip
    }

    pub fn render(&self, dialect: &dyn Dialect, tip: Option<i64>) -> Result<CompiledQuery, IndexerError> {
        let mut args = Args(Vec::new());

        let height_clause = match self.window {
            HeightWindow::Range(range) => {
                let mut parts = Vec::with_capacity(2);
                if let Some(b) = range.lower {
                    let op = if b.inclusive { ">=" } else { ">" };
                    parts.push(format!("tr.height {op} {}", args.push(SqlArg::Int(b.value))));
                }
                if let Some(b) = range.upper {
                    let op = if b.inclusive { "<=" } else { "<" };
                    parts.push(format!("tr.height {op} {}", args.push(SqlArg::Int(b.value))));
                }
                parts.join(" AND ")
            }
            HeightWindow::Exact(h) => format!("tr.height = {}", args.push(SqlArg::Int(h))),
            HeightWindow::BelowTip => {
                let tip = tip.ok_or_else(|| IndexerError::query("tip height required"))?;
                format!("tr.height <= {}", args.push(SqlArg::Int(tip)))
            }
        };

        let semi_joins: Vec<String> = self
            .filters
            .iter()
            .map(|c| semi_join(c, dialect, &mut args))
            .collect();
        let filter_clause = if semi_joins.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", semi_joins.join("\n      AND "))
        };

        let sql = format!(
            r#"WITH candidate_txs AS (
    SELECT tr.rowid AS tx_id, tr.height
    FROM {TABLE_TX_RESULTS} tr
    JOIN {TABLE_TX_REQUESTS} req ON req.block_id = tr.block_id AND req."index" = tr."index"
    WHERE {height_clause}
),
matched_txs AS (
    SELECT c.tx_id, c.height
    FROM candidate_txs c
    {filter_clause}
    ORDER BY c.height DESC, c.tx_id DESC
    LIMIT {limit}
)
SELECT tr.height, req.created_at, tr.tx_hash, req.messages, req.memo, req.fee, tr.tx_result
FROM matched_txs m
JOIN {TABLE_TX_RESULTS} tr ON tr.rowid = m.tx_id
JOIN {TABLE_TX_REQUESTS} req ON req.block_id = tr.block_id AND req."index" = tr."index"
ORDER BY m.height DESC, m.tx_id DESC"#,
            limit = self.limit,
        );

        Ok(CompiledQuery { sql, args: args.0 })
    }
}

fn semi_join(c: &Condition, dialect: &dyn Dialect, args: &mut Args) -> String {
    let key = args.push(SqlArg::Text(c.tag.clone()));
    let predicate = match (&c.arg, c.op) {
        (_, Operator::Exists) | (None, _) => String::new(),
        (Some(Value::Str(s)), Operator::Contains) => {
            let p = args.push(SqlArg::Text(s.clone()));
            format!(" AND {}", dialect.contains("a.value", &p))
        }
        (Some(Value::Number(n)), Operator::Contains) => {
            let p = args.push(SqlArg::Text(n.as_str().to_string()));
            format!(" AND {}", dialect.contains("a.value", &p))
        }
        (Some(Value::Str(s)), op) => {
            let p = args.push(SqlArg::Text(s.clone()));
            format!(" AND a.value {} {p}", op.sql().unwrap_or("="))
        }
        (Some(Value::Number(n)), op) => {
            let p = args.push(SqlArg::Text(n.as_str().to_string()));
            format!(
                " AND {} {} {}",
                dialect.numeric_column("a.value"),
                op.sql().unwrap_or("="),
                dialect.numeric_param(&p)
            )
        }
    };
    format!(
        "EXISTS (SELECT 1 FROM {TABLE_EVENTS} e JOIN {TABLE_ATTRIBUTES} a ON a.event_id = e.rowid \
         WHERE e.tx_id = c.tx_id AND a.composite_key = {key}{predicate})"
    )
}
