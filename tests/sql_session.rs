use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use airtime::catalog::InMemoryCatalog;
use airtime::config::SchedulerConfig;
use airtime::model::SlotKey;
use airtime::tenant::TenantManager;
use airtime::wire::{self, AirtimeFactory};

// ── Test infrastructure ──────────────────────────────────────

const CATALOG: &str = r#"[
    {"content_type": "media", "id": "spot-15", "name": "Summer Sale", "duration_seconds": 15},
    {"content_type": "media", "id": "spot-30", "name": "Grand Opening", "duration_seconds": 30},
    {"content_type": "media", "id": "long-3000", "name": "Takeover", "duration_seconds": 3000}
]"#;

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
    let tm = Arc::new(TenantManager::new(SchedulerConfig::default(), Arc::new(catalog)).unwrap());
    let factory = Arc::new(AirtimeFactory::new(tm.clone(), "airtime".to_string()));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let factory = factory.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, factory).await;
            });
        }
    });

    (addr, tm)
}

async fn try_connect(
    addr: SocketAddr,
    network: &str,
    campaign: &str,
    password: &str,
) -> Result<Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(network)
        .user(campaign)
        .password(password);

    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

async fn connect(addr: SocketAddr, network: &str, campaign: &str) -> Client {
    try_connect(addr, network, campaign, "airtime").await.unwrap()
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn affected(client: &Client, sql: &str) -> u64 {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .find_map(|msg| match msg {
            SimpleQueryMessage::CommandComplete(n) => Some(n),
            _ => None,
        })
        .unwrap()
}

async fn error_code(client: &Client, sql: &str) -> SqlState {
    let err = client.simple_query(sql).await.unwrap_err();
    err.code().cloned().unwrap_or_else(|| panic!("no SQLSTATE in {err}"))
}

fn col<'a>(row: &'a SimpleQueryRow, name: &str) -> &'a str {
    row.get(name).unwrap_or_else(|| panic!("{name} is NULL"))
}

async fn own_ad_ids(client: &Client) -> Vec<String> {
    rows(client, "SELECT * FROM own_ads")
        .await
        .iter()
        .map(|r| col(r, "id").to_string())
        .collect()
}

// ── Scheduling over the wire ─────────────────────────────────

#[tokio::test]
async fn block_add_then_read_back() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "downtown", "acme").await;

    let n = affected(
        &client,
        "INSERT INTO ad_blocks (anchor_day, anchor_hour, day, hour, content_type, content_id, plays_per_hour) \
         VALUES (1, 9, 3, 14, 'media', 'spot-15', 12)",
    )
    .await;
    assert_eq!(n, 18);

    let day = rows(&client, "SELECT * FROM slots WHERE day = 2").await;
    assert_eq!(day.len(), 24);
    assert_eq!(col(&day[9], "fill_percentage"), "5");
    assert_eq!(col(&day[9], "has_own_ad"), "t");
    assert_eq!(col(&day[9], "available_seconds"), "3420");
    assert_eq!(col(&day[8], "ad_count"), "0");

    let summary = rows(&client, "SELECT * FROM week_summary").await;
    assert_eq!(col(&summary[0], "empty_slots"), "150");
    assert_eq!(col(&summary[0], "partially_filled_slots"), "18");
    assert_eq!(col(&summary[0], "fully_booked_slots"), "0");

    let ids = own_ad_ids(&client).await;
    assert_eq!(ids.len(), 18);
    assert!(ids[0].starts_with("1:9:"));
}

#[tokio::test]
async fn rotation_ends_with_house_ad() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "downtown", "acme").await;

    client
        .batch_execute(
            "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (1, 9, 'media', 'spot-15', 12); \
             INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (1, 9, 'media', 'spot-30', 8)",
        )
        .await
        .unwrap();

    let rotation = rows(&client, "SELECT * FROM rotation WHERE day = 1 AND hour = 9").await;
    assert_eq!(rotation.len(), 3);
    assert_eq!(col(&rotation[0], "content_id"), "spot-15");
    assert_eq!(col(&rotation[1], "content_id"), "spot-30");
    assert_eq!(col(&rotation[1], "seconds_per_hour"), "240");
    assert_eq!(col(&rotation[2], "kind"), "house");
    assert_eq!(col(&rotation[2], "plays_per_hour"), "318");
    assert_eq!(col(&rotation[2], "seconds_per_hour"), "3180");
    assert!(rotation[2].get("id").is_none());
}

#[tokio::test]
async fn multi_row_insert_is_one_batch() {
    let (addr, tm) = start_test_server().await;
    let client = connect(addr, "downtown", "acme").await;

    let n = affected(
        &client,
        "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES \
         (0, 8, 'media', 'spot-30', 10), (4, 20, 'media', 'spot-30', 10)",
    )
    .await;
    assert_eq!(n, 2);

    let ids = own_ad_ids(&client).await;
    let batches: Vec<&str> = ids.iter().map(|id| id.rsplit(':').next().unwrap()).collect();
    assert_eq!(batches[0], batches[1]);

    let engine = tm.get_or_create("downtown").unwrap();
    assert_eq!(engine.ledger().occupied_seconds(&SlotKey::new(4, 20)), 300);
}

#[tokio::test]
async fn capacity_rejection_writes_nothing() {
    let (addr, tm) = start_test_server().await;
    let rival = connect(addr, "downtown", "globex").await;
    let client = connect(addr, "downtown", "acme").await;

    affected(
        &rival,
        "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (2, 10, 'media', 'long-3000', 1)",
    )
    .await;

    let code = error_code(
        &client,
        "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES \
         (2, 9, 'media', 'spot-30', 30), (2, 10, 'media', 'spot-30', 30)",
    )
    .await;
    assert_eq!(code, SqlState::CHECK_VIOLATION);

    let engine = tm.get_or_create("downtown").unwrap();
    assert!(engine.ledger().get_slot(&SlotKey::new(2, 9)).is_none());
    assert_eq!(engine.ledger().occupied_seconds(&SlotKey::new(2, 10)), 3000);
    assert!(own_ad_ids(&client).await.is_empty());
}

#[tokio::test]
async fn edit_pause_delete_cycle() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "downtown", "acme").await;

    affected(
        &client,
        "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (5, 18, 'media', 'spot-15', 4)",
    )
    .await;
    let id = own_ad_ids(&client).await.remove(0);

    affected(
        &client,
        &format!("INSERT INTO ad_revisions (id, content_type, content_id, plays_per_hour) VALUES ('{id}', 'media', 'spot-30', 6)"),
    )
    .await;
    affected(&client, &format!("INSERT INTO pause_toggles (id) VALUES ('{id}')")).await;

    let own = rows(&client, "SELECT * FROM own_ads").await;
    assert_eq!(own.len(), 1);
    assert_eq!(col(&own[0], "id"), id);
    assert_eq!(col(&own[0], "content_id"), "spot-30");
    assert_eq!(col(&own[0], "seconds_per_hour"), "180");
    assert_eq!(col(&own[0], "paused"), "t");

    // Paused airtime stays reserved.
    let day = rows(&client, "SELECT * FROM slots WHERE day = 5").await;
    assert_eq!(col(&day[18], "occupied_seconds"), "180");

    assert_eq!(affected(&client, &format!("DELETE FROM ads WHERE id = '{id}'")).await, 1);
    let code = error_code(&client, &format!("DELETE FROM ads WHERE id = '{id}'")).await;
    assert_eq!(code, SqlState::NO_DATA);

    let day = rows(&client, "SELECT * FROM slots WHERE day = 5").await;
    assert_eq!(col(&day[18], "available_seconds"), "3600");
}

#[tokio::test]
async fn competitor_ads_are_read_only() {
    let (addr, _tm) = start_test_server().await;
    let owner = connect(addr, "downtown", "acme").await;
    let rival = connect(addr, "downtown", "globex").await;

    affected(
        &owner,
        "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (1, 1, 'media', 'spot-15', 1)",
    )
    .await;
    let id = own_ad_ids(&owner).await.remove(0);

    let code = error_code(&rival, &format!("DELETE FROM ads WHERE id = '{id}'")).await;
    assert_eq!(code, SqlState::INSUFFICIENT_PRIVILEGE);
    let code = error_code(&rival, &format!("INSERT INTO pause_toggles (id) VALUES ('{id}')")).await;
    assert_eq!(code, SqlState::INSUFFICIENT_PRIVILEGE);

    // Visible to the rival, but not theirs.
    let rotation = rows(&rival, "SELECT * FROM rotation WHERE day = 1 AND hour = 1").await;
    assert_eq!(col(&rotation[0], "is_own_ad"), "f");
    assert_eq!(col(&rotation[0], "owner_id"), "acme");
    assert!(own_ad_ids(&rival).await.is_empty());
}

#[tokio::test]
async fn networks_are_isolated() {
    let (addr, _tm) = start_test_server().await;
    let downtown = connect(addr, "downtown", "acme").await;
    let airport = connect(addr, "airport", "acme").await;

    affected(
        &downtown,
        "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (0, 0, 'media', 'spot-15', 1)",
    )
    .await;

    assert_eq!(own_ad_ids(&downtown).await.len(), 1);
    assert!(own_ad_ids(&airport).await.is_empty());
}

#[tokio::test]
async fn registered_content_is_shared_across_networks() {
    let (addr, _tm) = start_test_server().await;
    let downtown = connect(addr, "downtown", "acme").await;
    let airport = connect(addr, "airport", "acme").await;

    affected(
        &downtown,
        "INSERT INTO content (content_type, id, name, duration_seconds) VALUES ('playlist', 'loop', 'Morning Loop', 60)",
    )
    .await;
    let n = affected(
        &airport,
        "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (3, 7, 'playlist', 'loop', 5)",
    )
    .await;
    assert_eq!(n, 1);

    let content = rows(&airport, "SELECT * FROM content").await;
    assert_eq!(content.len(), 4);
    assert_eq!(col(&content[3], "content_type"), "playlist");
}

// ── Errors ───────────────────────────────────────────────────

#[tokio::test]
async fn error_codes() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "downtown", "acme").await;

    assert_eq!(error_code(&client, "SELEC nonsense").await, SqlState::SYNTAX_ERROR);
    assert_eq!(
        error_code(
            &client,
            "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (1, 1, 'media', 'missing', 1)",
        )
        .await,
        SqlState::FOREIGN_KEY_VIOLATION
    );
    assert_eq!(
        error_code(
            &client,
            "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (1, 24, 'media', 'spot-15', 1)",
        )
        .await,
        SqlState::INVALID_PARAMETER_VALUE
    );
    assert_eq!(
        error_code(
            &client,
            "INSERT INTO ads (day, hour, content_type, content_id, plays_per_hour) VALUES (1, 1, 'media', 'spot-15', 361)",
        )
        .await,
        SqlState::INVALID_PARAMETER_VALUE
    );
    assert_eq!(
        error_code(&client, "SELECT * FROM slots WHERE day = 9").await,
        SqlState::INVALID_PARAMETER_VALUE
    );
}

// ── Authentication ───────────────────────────────────────────

#[tokio::test]
async fn shared_password_is_enforced() {
    let (addr, _tm) = start_test_server().await;

    assert!(try_connect(addr, "downtown", "acme", "airtime").await.is_ok());
    assert!(try_connect(addr, "downtown", "globex", "airtime").await.is_ok());
    assert!(try_connect(addr, "downtown", "acme", "wrong").await.is_err());
}
