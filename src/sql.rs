use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::limits::MAX_INSERT_ROWS;
use crate::model::*;

/// Parsed command from SQL input.
///
/// Every ad-writing command takes its owner from the session, never from the
/// statement.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// `INSERT INTO content (content_type, id, name, duration_seconds)`
    RegisterContent {
        item: ContentItem,
    },
    /// `INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour)`,
    /// one row per slot. All rows must carry the same template.
    BatchAdd {
        slots: Vec<SlotKey>,
        content: ContentKey,
        plays_per_hour: u32,
    },
    /// `INSERT INTO ad_blocks (anchor_day, anchor_hour, day, hour, content_type, content_id, plays_per_hour)`
    BlockAdd {
        anchor: SlotKey,
        current: SlotKey,
        content: ContentKey,
        plays_per_hour: u32,
    },
    /// `INSERT INTO ad_revisions (id, content_type, content_id, plays_per_hour)`
    EditAd {
        id: AdId,
        content: ContentKey,
        plays_per_hour: u32,
    },
    /// `INSERT INTO pause_toggles (id)`
    TogglePause {
        id: AdId,
    },
    /// `DELETE FROM ads WHERE id = '<day>:<hour>:<ulid>'`
    DeleteAd {
        id: AdId,
    },
    SelectContent,
    SelectSlots {
        day: u8,
    },
    SelectRotation {
        slot: SlotKey,
    },
    SelectWeekSummary,
    SelectOwnAds,
}

/// Parse the first statement of `sql`.
pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let stmts = parse_statements(sql)?;
    parse_statement(&stmts[0])
}

/// Parse every `;`-separated statement. Nothing runs unless all of them parse.
pub fn parse_batch(sql: &str) -> Result<Vec<Command>, SqlError> {
    parse_statements(sql)?.iter().map(parse_statement).collect()
}

fn parse_statements(sql: &str) -> Result<Vec<Statement>, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    Ok(stmts)
}

fn parse_statement(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_insert_rows(insert)?;
    if rows.len() > MAX_INSERT_ROWS {
        return Err(SqlError::TooManyRows(rows.len()));
    }

    match table.as_str() {
        "content" => {
            let values = single_row("content", &rows, 4)?;
            Ok(Command::RegisterContent {
                item: ContentItem {
                    content_type: parse_content_type(&values[0])?,
                    id: parse_string(&values[1])?,
                    name: parse_string(&values[2])?,
                    duration_seconds: parse_u32(&values[3])?,
                },
            })
        }
        "ads" => {
            let mut slots = Vec::with_capacity(rows.len());
            let mut template: Option<(ContentKey, u32)> = None;
            for (i, row) in rows.iter().enumerate() {
                if row.len() < 5 {
                    return Err(SqlError::WrongArity("ads row", 5, row.len()));
                }
                let in_row = |e: SqlError| SqlError::Parse(format!("row {i}: {e}"));
                slots.push(SlotKey::new(
                    parse_u8(&row[0]).map_err(in_row)?,
                    parse_u8(&row[1]).map_err(in_row)?,
                ));
                let row_template = (
                    ContentKey::new(
                        parse_content_type(&row[2]).map_err(in_row)?,
                        parse_string(&row[3]).map_err(in_row)?,
                    ),
                    parse_u32(&row[4]).map_err(in_row)?,
                );
                match &template {
                    None => template = Some(row_template),
                    Some(first) if *first != row_template => {
                        return Err(SqlError::MixedTemplates(i));
                    }
                    Some(_) => {}
                }
            }
            let (content, plays_per_hour) = template.ok_or(SqlError::Parse("empty VALUES".into()))?;
            Ok(Command::BatchAdd {
                slots,
                content,
                plays_per_hour,
            })
        }
        "ad_blocks" => {
            let values = single_row("ad_blocks", &rows, 7)?;
            Ok(Command::BlockAdd {
                anchor: SlotKey::new(parse_u8(&values[0])?, parse_u8(&values[1])?),
                current: SlotKey::new(parse_u8(&values[2])?, parse_u8(&values[3])?),
                content: ContentKey::new(parse_content_type(&values[4])?, parse_string(&values[5])?),
                plays_per_hour: parse_u32(&values[6])?,
            })
        }
        "ad_revisions" => {
            let values = single_row("ad_revisions", &rows, 4)?;
            Ok(Command::EditAd {
                id: parse_ad_id(&values[0])?,
                content: ContentKey::new(parse_content_type(&values[1])?, parse_string(&values[2])?),
                plays_per_hour: parse_u32(&values[3])?,
            })
        }
        "pause_toggles" => {
            let values = single_row("pause_toggles", &rows, 1)?;
            Ok(Command::TogglePause {
                id: parse_ad_id(&values[0])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    match table.as_str() {
        "ads" => Ok(Command::DeleteAd {
            id: extract_where_id(&delete.selection)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = SlotFilters::default();
    if let Some(selection) = &select.selection {
        filters.extract(selection)?;
    }

    match table.as_str() {
        "content" => Ok(Command::SelectContent),
        "slots" => Ok(Command::SelectSlots {
            day: filters.day.ok_or(SqlError::MissingFilter("day"))?,
        }),
        "rotation" => Ok(Command::SelectRotation {
            slot: SlotKey::new(
                filters.day.ok_or(SqlError::MissingFilter("day"))?,
                filters.hour.ok_or(SqlError::MissingFilter("hour"))?,
            ),
        }),
        "week_summary" => Ok(Command::SelectWeekSummary),
        "own_ads" => Ok(Command::SelectOwnAds),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

#[derive(Default)]
struct SlotFilters {
    day: Option<u8>,
    hour: Option<u8>,
}

impl SlotFilters {
    fn extract(&mut self, expr: &Expr) -> Result<(), SqlError> {
        match expr {
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::And,
                right,
            } => {
                self.extract(left)?;
                self.extract(right)?;
            }
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::Eq,
                right,
            } => match expr_column_name(left).as_deref() {
                Some("day") => self.day = Some(parse_u8(right)?),
                Some("hour") => self.hour = Some(parse_u8(right)?),
                _ => {}
            },
            Expr::Nested(inner) => self.extract(inner)?,
            _ => {}
        }
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(&values.rows)
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

/// Tables that take exactly one row per statement.
fn single_row<'a>(
    table: &'static str,
    rows: &'a [Vec<Expr>],
    arity: usize,
) -> Result<&'a [Expr], SqlError> {
    if rows.len() != 1 {
        return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}")));
    }
    let values = &rows[0];
    if values.len() < arity {
        return Err(SqlError::WrongArity(table, arity, values.len()));
    }
    Ok(values)
}

fn extract_where_id(selection: &Option<Expr>) -> Result<AdId, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ad_id(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_ad_id(expr: &Expr) -> Result<AdId, SqlError> {
    let s = parse_string(expr)?;
    s.parse().map_err(|e| SqlError::Parse(format!("{e}")))
}

fn parse_content_type(expr: &Expr) -> Result<ContentType, SqlError> {
    parse_string(expr)?.parse().map_err(SqlError::Parse)
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u8(expr: &Expr) -> Result<u8, SqlError> {
    let v = parse_i64(expr)?;
    u8::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u8 range")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    /// Row index whose template differs from the first row's.
    MixedTemplates(usize),
    TooManyRows(usize),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MixedTemplates(row) => {
                write!(f, "row {row}: every row of a batch must use the same content and frequency")
            }
            SqlError::TooManyRows(n) => {
                write!(f, "{n} rows exceeds the limit of {MAX_INSERT_ROWS}")
            }
        }
    }
}

impl std::error::Error for SqlError {}
