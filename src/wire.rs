use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use tokio::net::TcpStream;

use crate::auth::AirtimeAuthSource;
use crate::engine::{Engine, SchedulingError};
use crate::limits::{MAX_CONTENT_NAME_LEN, MAX_ID_LEN};
use crate::model::*;
use crate::observability;
use crate::selection::SelectionSet;
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

/// Campaign used when the client sent no user name.
const ANONYMOUS_CAMPAIGN: &str = "anonymous";

pub struct AirtimeHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<AirtimeQueryParser>,
}

/// Who is asking, and against which screen network.
struct Session {
    engine: Arc<Engine>,
    campaign: String,
}

impl AirtimeHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(AirtimeQueryParser),
        }
    }

    fn resolve_session<C: ClientInfo>(&self, client: &C) -> PgWireResult<Session> {
        let metadata = client.metadata();
        let db = metadata
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        let campaign = metadata
            .get("user")
            .cloned()
            .unwrap_or_else(|| ANONYMOUS_CAMPAIGN.to_string());
        let engine = self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("network error: {e}"),
            )))
        })?;
        Ok(Session { engine, campaign })
    }

    /// Execute and record one command.
    async fn run(&self, session: &Session, cmd: Command) -> PgWireResult<Vec<Response>> {
        let started = Instant::now();
        let label = observability::command_label(&cmd);
        let result = self.execute_command(session, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, session: &Session, cmd: Command) -> PgWireResult<Vec<Response>> {
        let engine = &session.engine;
        match cmd {
            Command::RegisterContent { item } => {
                if item.id.len() > MAX_ID_LEN {
                    return Err(limit_err("content id too long"));
                }
                if item.name.len() > MAX_CONTENT_NAME_LEN {
                    return Err(limit_err("content name too long"));
                }
                self.tenant_manager.catalog().register(item);
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::BatchAdd {
                slots,
                content,
                plays_per_hour,
            } => {
                let selection: SelectionSet = slots.into_iter().collect();
                let template = AdTemplate::new(session.campaign.as_str(), content, plays_per_hour);
                let ids = engine
                    .batch_add(&selection, &template)
                    .await
                    .map_err(scheduling_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(ids.len()))])
            }
            Command::BlockAdd {
                anchor,
                current,
                content,
                plays_per_hour,
            } => {
                let selection = SelectionSet::rectangle_from(anchor, current);
                let template = AdTemplate::new(session.campaign.as_str(), content, plays_per_hour);
                let ids = engine
                    .batch_add(&selection, &template)
                    .await
                    .map_err(scheduling_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(ids.len()))])
            }
            Command::EditAd {
                id,
                content,
                plays_per_hour,
            } => {
                ensure_owned(session, &id)?;
                let template = AdTemplate::new(session.campaign.as_str(), content, plays_per_hour);
                engine
                    .edit(id.slot, id, &template)
                    .await
                    .map_err(scheduling_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::TogglePause { id } => {
                ensure_owned(session, &id)?;
                engine
                    .toggle_pause(id.slot, id)
                    .await
                    .map_err(scheduling_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteAd { id } => {
                ensure_owned(session, &id)?;
                engine.delete(id.slot, id).await.map_err(scheduling_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectContent => {
                let schema = Arc::new(content_schema());
                let rows: Vec<PgWireResult<DataRow>> = self
                    .tenant_manager
                    .catalog()
                    .list()
                    .into_iter()
                    .map(|item| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&item.content_type.as_str())?;
                        encoder.encode_field(&item.id)?;
                        encoder.encode_field(&item.name)?;
                        encoder.encode_field(&i64::from(item.duration_seconds))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectSlots { day } => {
                let summaries = engine
                    .view(&session.campaign)
                    .day_summary(day)
                    .map_err(scheduling_err)?;
                let schema = Arc::new(slots_schema());
                let rows: Vec<PgWireResult<DataRow>> = summaries
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&i16::from(s.slot.day))?;
                        encoder.encode_field(&i16::from(s.slot.hour))?;
                        encoder.encode_field(&i16::from(s.fill_percentage))?;
                        encoder.encode_field(&(s.ad_count as i32))?;
                        encoder.encode_field(&s.has_own_ad)?;
                        encoder.encode_field(&i64::from(s.occupied_seconds))?;
                        encoder.encode_field(&i64::from(s.available_seconds))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectRotation { slot } => {
                let rotation = engine
                    .view(&session.campaign)
                    .rotation(slot)
                    .map_err(scheduling_err)?;
                let schema = Arc::new(rotation_schema());
                let mut rows: Vec<PgWireResult<DataRow>> = rotation
                    .ads
                    .iter()
                    .enumerate()
                    .map(|(i, ad)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(i as i32 + 1))?;
                        encoder.encode_field(&"ad")?;
                        encoder.encode_field(&Some(ad.id.to_string()))?;
                        encoder.encode_field(&Some(ad.owner_id.as_str()))?;
                        encoder.encode_field(&Some(ad.content.content_type.as_str()))?;
                        encoder.encode_field(&Some(ad.content.content_id.as_str()))?;
                        encoder.encode_field(&Some(ad.content.name.as_str()))?;
                        encoder.encode_field(&i64::from(ad.content.single_play_duration_seconds))?;
                        encoder.encode_field(&i64::from(ad.plays_per_hour))?;
                        encoder.encode_field(&i64::from(ad.total_seconds_per_hour()))?;
                        encoder.encode_field(&ad.paused)?;
                        encoder.encode_field(&ad.is_own_ad(&session.campaign))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                if let Some(fill) = rotation.house_ad {
                    let position = rotation.ads.len() + 1;
                    let duration = engine.config().house_ad_duration_seconds;
                    rows.push(house_ad_row(&schema, position, duration, fill));
                }
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectWeekSummary => {
                let summary = engine.view(&session.campaign).weekly_summary();
                let schema = Arc::new(week_summary_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(summary.empty_slots as i32))?;
                encoder.encode_field(&(summary.partially_filled_slots as i32))?;
                encoder.encode_field(&(summary.fully_booked_slots as i32))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectOwnAds => {
                let report = engine.view(&session.campaign).own_ads_across_week();
                let schema = Arc::new(own_ads_schema());
                let rows: Vec<PgWireResult<DataRow>> = report
                    .active
                    .iter()
                    .chain(report.paused.iter())
                    .map(|entry| {
                        let ad = &entry.ad;
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&i16::from(entry.slot.day))?;
                        encoder.encode_field(&i16::from(entry.slot.hour))?;
                        encoder.encode_field(&ad.id.to_string())?;
                        encoder.encode_field(&ad.content.content_type.as_str())?;
                        encoder.encode_field(&ad.content.content_id)?;
                        encoder.encode_field(&ad.content.name)?;
                        encoder.encode_field(&i64::from(ad.plays_per_hour))?;
                        encoder.encode_field(&i64::from(ad.total_seconds_per_hour()))?;
                        encoder.encode_field(&ad.paused)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
        }
    }
}

/// Competing advertisers' bookings are read-only. A missing ad passes so the
/// engine reports it as not found.
fn ensure_owned(session: &Session, id: &AdId) -> PgWireResult<()> {
    let owner = session
        .engine
        .ledger()
        .get_slot(&id.slot)
        .and_then(|slot| slot.get(id).map(|ad| ad.owner_id.clone()));
    match owner {
        Some(owner) if owner != session.campaign => {
            Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "42501".into(),
                format!("ad {id} belongs to another campaign"),
            ))))
        }
        _ => Ok(()),
    }
}

/// Closing row of a rotation: the house ad fills whatever airtime is left.
fn house_ad_row(
    schema: &Arc<Vec<FieldInfo>>,
    position: usize,
    duration: Secs,
    fill: HouseAdFill,
) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&(position as i32))?;
    encoder.encode_field(&"house")?;
    for _ in 0..5 {
        encoder.encode_field(&None::<String>)?;
    }
    encoder.encode_field(&i64::from(duration))?;
    encoder.encode_field(&i64::from(fill.house_ad_plays))?;
    encoder.encode_field(&i64::from(fill.leftover_seconds))?;
    encoder.encode_field(&false)?;
    encoder.encode_field(&false)?;
    Ok(encoder.take_row())
}

fn query_response(schema: Arc<Vec<FieldInfo>>, rows: Vec<PgWireResult<DataRow>>) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn content_schema() -> Vec<FieldInfo> {
    vec![
        field("content_type", Type::VARCHAR),
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("duration_seconds", Type::INT8),
    ]
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![
        field("day", Type::INT2),
        field("hour", Type::INT2),
        field("fill_percentage", Type::INT2),
        field("ad_count", Type::INT4),
        field("has_own_ad", Type::BOOL),
        field("occupied_seconds", Type::INT8),
        field("available_seconds", Type::INT8),
    ]
}

fn rotation_schema() -> Vec<FieldInfo> {
    vec![
        field("position", Type::INT4),
        field("kind", Type::VARCHAR),
        field("id", Type::VARCHAR),
        field("owner_id", Type::VARCHAR),
        field("content_type", Type::VARCHAR),
        field("content_id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("duration_seconds", Type::INT8),
        field("plays_per_hour", Type::INT8),
        field("seconds_per_hour", Type::INT8),
        field("paused", Type::BOOL),
        field("is_own_ad", Type::BOOL),
    ]
}

fn week_summary_schema() -> Vec<FieldInfo> {
    vec![
        field("empty_slots", Type::INT4),
        field("partially_filled_slots", Type::INT4),
        field("fully_booked_slots", Type::INT4),
    ]
}

fn own_ads_schema() -> Vec<FieldInfo> {
    vec![
        field("day", Type::INT2),
        field("hour", Type::INT2),
        field("id", Type::VARCHAR),
        field("content_type", Type::VARCHAR),
        field("content_id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("plays_per_hour", Type::INT8),
        field("seconds_per_hour", Type::INT8),
        field("paused", Type::BOOL),
    ]
}

/// Result columns for a statement, decided from its text alone.
fn schema_for(sql: &str) -> Vec<FieldInfo> {
    match sql::parse_sql(sql) {
        Ok(Command::SelectContent) => content_schema(),
        Ok(Command::SelectSlots { .. }) => slots_schema(),
        Ok(Command::SelectRotation { .. }) => rotation_schema(),
        Ok(Command::SelectWeekSummary) => week_summary_schema(),
        Ok(Command::SelectOwnAds) => own_ads_schema(),
        _ => schema_by_table(sql),
    }
}

/// Fallback for statements with unbound `$n` placeholders, which don't parse
/// as values yet.
fn schema_by_table(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    if !lower.trim_start().starts_with("select") {
        return vec![];
    }
    if lower.contains("from slots") {
        slots_schema()
    } else if lower.contains("from rotation") {
        rotation_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for AirtimeHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.resolve_session(client)?;
        let cmds = sql::parse_batch(query).map_err(parse_failed)?;
        let mut responses = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            responses.extend(self.run(&session, cmd).await?);
        }
        Ok(responses)
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct AirtimeQueryParser;

#[async_trait]
impl QueryParser for AirtimeQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for AirtimeHandler {
    type Statement = String;
    type QueryParser = AirtimeQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.resolve_session(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(parse_failed)?;
        let mut responses = self.run(&session, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for(&substitute_params(target))))
    }
}

/// Parse a `$N` placeholder starting at `bytes[at]`. Returns N and the index past it.
fn placeholder_at(sql: &str, at: usize) -> Option<(usize, usize)> {
    let bytes = sql.as_bytes();
    if bytes.get(at) != Some(&b'$') {
        return None;
    }
    let start = at + 1;
    let end = start + bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count();
    let n = sql[start..end].parse().ok()?;
    Some((n, end))
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let mut i = 0;
    while i < sql.len() {
        match placeholder_at(sql, i) {
            Some((n, end)) => {
                max = max.max(n);
                i = end;
            }
            None => i += 1,
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    substitute_text(&portal.statement.statement, &portal.parameters)
}

/// Single left-to-right pass over `sql`: substituted values are never rescanned,
/// so a value containing `$1` stays literal. Unbound placeholders are kept as is.
fn substitute_text(sql: &str, params: &[Option<impl AsRef<[u8]>>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut i = 0;
    while i < sql.len() {
        let Some((n, end)) = placeholder_at(sql, i) else {
            i += 1;
            continue;
        };
        if let Some(param) = n.checked_sub(1).and_then(|idx| params.get(idx)) {
            result.push_str(&sql[copied..i]);
            match param {
                Some(bytes) => {
                    let text = String::from_utf8_lossy(bytes.as_ref());
                    result.push('\'');
                    result.push_str(&text.replace('\'', "''"));
                    result.push('\'');
                }
                None => result.push_str("NULL"),
            }
            copied = end;
        }
        i = end;
    }
    result.push_str(&sql[copied..]);
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct AirtimeFactory {
    handler: Arc<AirtimeHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<AirtimeAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl AirtimeFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = AirtimeAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(AirtimeHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for AirtimeFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<AirtimeFactory>,
) -> std::io::Result<()> {
    pgwire::tokio::process_socket(socket, None, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn sqlstate(e: &SchedulingError) -> &'static str {
    match e {
        SchedulingError::InsufficientCapacity { .. } => "23514",
        SchedulingError::MissingContent => "23503",
        SchedulingError::NotFound { .. } => "02000",
        SchedulingError::InvalidSelection
        | SchedulingError::InvalidSlot(_)
        | SchedulingError::InvalidFrequency { .. } => "22023",
        SchedulingError::LimitExceeded(_) => "54000",
    }
}

fn scheduling_err(e: SchedulingError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn limit_err(msg: &str) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "54000".into(),
        msg.to_string(),
    )))
}

fn parse_failed(e: SqlError) -> PgWireError {
    metrics::counter!(observability::QUERIES_TOTAL, "command" => "parse", "status" => "error")
        .increment(1);
    sql_err(e)
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
