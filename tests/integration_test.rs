/// Integration tests for the reconciliation flow
/// Uses a mock Discord REST server to drive store -> resolver -> role sync end to end

use chrono::{NaiveTime, TimeZone, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use shiftrole::commands::Commands;
use shiftrole::config::Config;
use shiftrole::health::TickMetrics;
use shiftrole::orchestrator::run_tick;
use shiftrole::roles::DiscordRoles;
use shiftrole::schedule::{DaySet, UserId};
use shiftrole::store::{FileStore, ScheduleStore};

const GUILD: u64 = 1;
const BOT: u64 = 999;
const ROLE: u64 = 900;
const GUILD_NAME: &str = "Night Ops";
const TOKEN: &str = "MTIzNDU2Nzg5MDEy.GhIjKl.abcdefghijklmnop";

/// One request as seen by the mock server
#[derive(Debug, Clone)]
struct SeenRequest {
    method: String,
    path: String,
    authorization: Option<String>,
    audit_reason: Option<String>,
}

/// Mock Discord API serving one guild with an "At Work" role
struct MockDiscord {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
}

#[derive(Clone)]
struct GuildFixture {
    role_name: &'static str,
    bot_role_position: i64,
    /// (user id, role ids, is bot)
    members: Vec<(u64, Vec<u64>, bool)>,
    /// Answer the first roles request with 429
    rate_limit_roles_once: Arc<AtomicBool>,
    /// Answer guild lookups with 404 Unknown Guild
    guild_missing: bool,
}

impl Default for GuildFixture {
    fn default() -> Self {
        Self {
            role_name: "At Work",
            bot_role_position: 5,
            members: Vec::new(),
            rate_limit_roles_once: Arc::new(AtomicBool::new(false)),
            guild_missing: false,
        }
    }
}

impl MockDiscord {
    async fn start(fixture: GuildFixture) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let seen = seen.clone();
                let fixture = fixture.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut socket).await else {
                        return;
                    };
                    let response = respond(&fixture, &request);
                    seen.lock().unwrap().push(request);
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.flush().await;
                });
            }
        });

        Self { addr, requests }
    }

    fn config(&self) -> Config {
        let env: HashMap<&str, String> = HashMap::from([
            ("DISCORD_TOKEN", TOKEN.to_string()),
            ("GUILD_ID", GUILD.to_string()),
            ("DISCORD_API_BASE", format!("http://{}", self.addr)),
            ("DEFAULT_TIMEZONE", "UTC".to_string()),
        ]);
        Config::from_getter(|key| env.get(key).cloned()).unwrap()
    }

    fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn mutations(&self) -> Vec<(String, String)> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "PUT" || r.method == "DELETE")
            .map(|r| (r.method, r.path))
            .collect()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let text = String::from_utf8_lossy(&buf).to_string();
    let mut lines = text.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Some(SeenRequest {
        method,
        path,
        authorization: headers.remove("authorization"),
        audit_reason: headers.remove("x-audit-log-reason"),
    })
}

fn http(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

fn member_json(id: u64, roles: &[u64], bot: bool) -> String {
    let roles: Vec<String> = roles.iter().map(|r| format!("\"{}\"", r)).collect();
    format!(
        r#"{{"user":{{"id":"{}","username":"user{}","bot":{}}},"nick":null,"roles":[{}]}}"#,
        id,
        id,
        bot,
        roles.join(",")
    )
}

fn respond(fixture: &GuildFixture, request: &SeenRequest) -> String {
    let guild = format!("/guilds/{}", GUILD);
    let path = request.path.as_str();

    match request.method.as_str() {
        "GET" if path.starts_with("/users/") => http("200 OK", &format!(r#"{{"id":"{}","username":"bot","bot":true}}"#, BOT)),
        "GET" if path == guild => {
            if fixture.guild_missing {
                return http("404 Not Found", r#"{"message":"Unknown Guild","code":10004}"#);
            }
            http("200 OK", &format!(r#"{{"id":"{}","name":"{}"}}"#, GUILD, GUILD_NAME))
        }
        "GET" if path == format!("{}/roles", guild) => {
            if fixture.rate_limit_roles_once.swap(false, Ordering::SeqCst) {
                return http("429 Too Many Requests", r#"{"message":"You are being rate limited.","retry_after":0.05,"global":false}"#);
            }
            let body = format!(
                r#"[{{"id":"{}","name":"@everyone","position":0}},{{"id":"{}","name":"{}","position":2}},{{"id":"50","name":"Bot","position":{}}}]"#,
                GUILD, ROLE, fixture.role_name, fixture.bot_role_position
            );
            http("200 OK", &body)
        }
        "GET" if path == format!("{}/members/{}", guild, BOT) => http("200 OK", &member_json(BOT, &[50], true)),
        "GET" if path.starts_with(&format!("{}/members?", guild)) => {
            // Single page; a second page request (after > 0) gets nothing
            if path.contains("after=0") {
                let members: Vec<String> = fixture
                    .members
                    .iter()
                    .map(|(id, roles, bot)| member_json(*id, roles, *bot))
                    .collect();
                http("200 OK", &format!("[{}]", members.join(",")))
            } else {
                http("200 OK", "[]")
            }
        }
        "PUT" | "DELETE" if path.starts_with(&format!("{}/members/", guild)) => {
            "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string()
        }
        _ => http("404 Not Found", r#"{"message":"Unknown","code":0}"#),
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[tokio::test]
async fn test_tick_adds_and_removes_role() {
    let mock = MockDiscord::start(GuildFixture {
        members: vec![
            (1, vec![], false),     // on shift, missing role
            (2, vec![ROLE], false), // off shift, holds role
            (3, vec![ROLE], false), // on shift, holds role
            (BOT, vec![50], true),
        ],
        ..GuildFixture::default()
    })
    .await;

    let store = FileStore::in_memory();
    store.upsert(UserId(1), "UTC", hm(9, 0), hm(17, 0), DaySet::all()).unwrap();
    store.upsert(UserId(2), "UTC", hm(18, 0), hm(20, 0), DaySet::all()).unwrap();
    store.upsert(UserId(3), "Australia/Sydney", hm(19, 0), hm(22, 0), DaySet::all()).unwrap();

    let roles = DiscordRoles::new(&mock.config());
    let metrics = TickMetrics::new();
    // 10:00 UTC is 20:00 in Sydney (AEST, June)
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();

    let report = run_tick(&store, &roles, &metrics, now).await.expect("tick should succeed");

    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert!(report.failed.is_empty());

    let mut mutations = mock.mutations();
    mutations.sort();
    assert_eq!(
        mutations,
        vec![
            ("DELETE".to_string(), format!("/guilds/{}/members/2/roles/{}", GUILD, ROLE)),
            ("PUT".to_string(), format!("/guilds/{}/members/1/roles/{}", GUILD, ROLE)),
        ]
    );

    let status = metrics.status();
    assert_eq!(status.ticks_ok, 1);
    assert_eq!(status.active_users, 2);
    assert_eq!(status.role_changes, 2);
}

#[tokio::test]
async fn test_other_bot_holding_role_loses_it() {
    let mock = MockDiscord::start(GuildFixture {
        members: vec![(77, vec![ROLE], true), (BOT, vec![50], true)],
        ..GuildFixture::default()
    })
    .await;

    let store = FileStore::in_memory();
    let roles = DiscordRoles::new(&mock.config());
    let metrics = TickMetrics::new();

    let report = run_tick(&store, &roles, &metrics, Utc::now()).await.expect("tick should succeed");

    assert_eq!(report.removed, 1);
    assert_eq!(
        mock.mutations(),
        vec![("DELETE".to_string(), format!("/guilds/{}/members/77/roles/{}", GUILD, ROLE))]
    );
}

#[tokio::test]
async fn test_requests_carry_bot_auth_and_audit_reason() {
    let mock = MockDiscord::start(GuildFixture {
        members: vec![(1, vec![], false)],
        ..GuildFixture::default()
    })
    .await;

    let store = FileStore::in_memory();
    store.upsert(UserId(1), "UTC", hm(0, 0), hm(23, 59), DaySet::all()).unwrap();

    let roles = DiscordRoles::new(&mock.config());
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
    run_tick(&store, &roles, &TickMetrics::new(), now).await.unwrap();

    let requests = mock.requests();
    assert!(!requests.is_empty());
    for request in &requests {
        assert_eq!(request.authorization.as_deref(), Some(&*format!("Bot {}", TOKEN)));
        // URL-encoded, so no raw spaces
        let reason = request.audit_reason.as_deref().unwrap_or_default();
        assert!(!reason.is_empty() && !reason.contains(' '), "bad audit reason: {:?}", reason);
    }
}

#[tokio::test]
async fn test_tick_converges_on_second_pass() {
    let mock = MockDiscord::start(GuildFixture {
        members: vec![(1, vec![ROLE], false), (2, vec![], false)],
        ..GuildFixture::default()
    })
    .await;

    let store = FileStore::in_memory();
    store.upsert(UserId(1), "UTC", hm(9, 0), hm(17, 0), DaySet::all()).unwrap();

    let roles = DiscordRoles::new(&mock.config());
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
    let report = run_tick(&store, &roles, &TickMetrics::new(), now).await.unwrap();

    assert_eq!(report.changes(), 0);
    assert_eq!(report.unchanged, 2);
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_sick_user_loses_role() {
    let mock = MockDiscord::start(GuildFixture {
        members: vec![(1, vec![ROLE], false)],
        ..GuildFixture::default()
    })
    .await;

    let config = mock.config();
    let store = FileStore::in_memory();
    let commands = Commands::new(&store, config.default_timezone);
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();

    commands.set_work(UserId(1), "09:00", "17:00", Some("0,1,2,3,4,5,6")).unwrap();
    commands.sick(UserId(1), 8, now).unwrap();

    let roles = DiscordRoles::new(&config);
    let report = run_tick(&store, &roles, &TickMetrics::new(), now).await.unwrap();

    assert_eq!(report.removed, 1);
    assert_eq!(
        mock.mutations(),
        vec![("DELETE".to_string(), format!("/guilds/{}/members/1/roles/{}", GUILD, ROLE))]
    );
}

#[tokio::test]
async fn test_missing_role_fails_tick() {
    let mock = MockDiscord::start(GuildFixture {
        role_name: "On Shift",
        members: vec![(1, vec![], false)],
        ..GuildFixture::default()
    })
    .await;

    let roles = DiscordRoles::new(&mock.config());
    let metrics = TickMetrics::new();
    let report = run_tick(&FileStore::in_memory(), &roles, &metrics, Utc::now()).await;

    assert!(report.is_none());
    assert_eq!(metrics.status().ticks_failed, 1);
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_role_above_bot_is_rejected() {
    let mock = MockDiscord::start(GuildFixture {
        bot_role_position: 2, // same as the managed role
        members: vec![(1, vec![], false)],
        ..GuildFixture::default()
    })
    .await;

    let roles = DiscordRoles::new(&mock.config());
    let err = roles.snapshot().await.unwrap_err();

    assert!(err.to_string().contains("below the bot's role"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_role_status_explains_hierarchy_problem() {
    let mock = MockDiscord::start(GuildFixture {
        bot_role_position: 2,
        members: vec![(1, vec![], false)],
        ..GuildFixture::default()
    })
    .await;

    let store = FileStore::in_memory();
    let commands = Commands::new(&store, chrono_tz::UTC);
    commands.set_work(UserId(1), "00:00", "23:59", Some("0,1,2,3,4,5,6")).unwrap();

    let roles = DiscordRoles::new(&mock.config());
    let check = roles.inspect().await;
    let reply = commands
        .role_status(UserId(1), Utc::now(), roles.role_name(), check.as_ref())
        .unwrap();

    assert!(reply.contains(&format!("Guild: **{}**", GUILD_NAME)), "{}", reply);
    assert!(reply.contains("must be *below* the bot's role"), "{}", reply);
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_role_status_reports_missing_guild() {
    let mock = MockDiscord::start(GuildFixture {
        guild_missing: true,
        ..GuildFixture::default()
    })
    .await;

    let store = FileStore::in_memory();
    let commands = Commands::new(&store, chrono_tz::UTC);
    let roles = DiscordRoles::new(&mock.config());

    let check = roles.inspect().await;
    let reply = commands
        .role_status(UserId(1), Utc::now(), roles.role_name(), check.as_ref())
        .unwrap();
    assert!(reply.contains(&format!("Guild `{}` not found", GUILD)), "{}", reply);

    let err = roles.snapshot().await.unwrap_err();
    assert!(err.to_string().contains("not found"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let fixture = GuildFixture {
        members: vec![(1, vec![], false)],
        rate_limit_roles_once: Arc::new(AtomicBool::new(true)),
        ..GuildFixture::default()
    };
    let mock = MockDiscord::start(fixture).await;

    let roles = DiscordRoles::new(&mock.config());
    let guild = tokio::time::timeout(Duration::from_secs(5), roles.snapshot())
        .await
        .expect("retry should not stall")
        .expect("snapshot should succeed after one 429");

    assert_eq!(guild.role.id, ROLE);
    let role_requests = mock
        .requests()
        .into_iter()
        .filter(|r| r.path.ends_with("/roles") && r.method == "GET")
        .count();
    assert_eq!(role_requests, 2);
}

#[test]
fn test_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedules.json");

    {
        let store = FileStore::open(&path).unwrap();
        let commands = Commands::new(&store, chrono_tz::Australia::Sydney);
        commands.set_work(UserId(7), "22:00", "06:00", Some("fri,sat")).unwrap();
        commands.sick(UserId(7), 12, Utc::now()).unwrap();
    }

    let store = FileStore::open(&path).unwrap();
    let record = store.get(UserId(7)).unwrap().expect("schedule should persist");
    assert_eq!(record.timezone, "Australia/Sydney");
    assert_eq!(record.days, "4,5");
    assert!(record.sick_until.is_some());
}
