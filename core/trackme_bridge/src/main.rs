use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use trackme_view::model::{ActivityEntry, ExeDuration};
use trackme_view::range::DAY_MS;
use trackme_view::source::BackendConfig;

const DEFAULT_PORT: u16 = 17700;
const DEFAULT_DB: &str = "./data/trackme.db";
const TZ_OFFSET_MINUTES_MIN: i32 = -14 * 60;
const TZ_OFFSET_MINUTES_MAX: i32 = 14 * 60;

#[derive(Parser, Debug)]
#[command(name = "trackme_bridge", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:17700
    /// - ip (implies port 17700), e.g. 127.0.0.1
    /// - localhost or localhost:port
    #[arg(long, default_value = "127.0.0.1:17700")]
    listen: String,

    /// Tracker SQLite database. Falls back to `storage.location` from the
    /// config file, then to ./data/trackme.db.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Tracker configuration (blacklist, matchers, storage), served as-is on /config.
    #[arg(long, default_value = "./config.json")]
    config: PathBuf,
}

#[derive(Clone)]
struct AppState {
    conn: Arc<Mutex<Connection>>,
    config: Arc<BackendConfig>,
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

fn err_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrResponse { ok: false, error })).into_response()
}

/// Epoch-ms bounds, `from` inclusive, `to` exclusive.
#[derive(Deserialize)]
struct RangeQuery {
    from: Option<i64>,
    to: Option<i64>,
}

impl RangeQuery {
    fn bounds(&self) -> Option<(i64, i64)> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from <= to => Some((from, to)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ActiveDatesQuery {
    /// Client local offset minutes, e.g. 480 for UTC+8.
    tz_offset_minutes: Option<i32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackme_bridge=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    let db = args
        .db
        .clone()
        .or_else(|| config.storage.location.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB));

    let conn = Connection::open_with_flags(
        &db,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let state = AppState {
        conn: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
    };

    let app = router(state);

    let addr = parse_listen(&args.listen)?;
    info!("Bridge listening on http://{addr}");
    info!("DB: {}", db.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/select", get(get_select))
        .route("/duration_by_exe", get(get_duration_by_exe))
        .route("/active_dates", get(get_active_dates))
        .route("/config", get(get_config))
        .with_state(state)
        .layer(cors)
}

fn load_config(path: &Path) -> anyhow::Result<BackendConfig> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} not found; serving an empty config", path.display());
            return Ok(BackendConfig::default());
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&raw)?)
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    if let Some(("localhost", port_str)) = input.rsplit_once(':') {
        let port: u16 = port_str.parse().map_err(|_| {
            anyhow::anyhow!(
                "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                input,
                DEFAULT_PORT
            )
        })?;
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port));
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "trackme_bridge",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

async fn get_select(State(state): State<AppState>, Query(q): Query<RangeQuery>) -> Response {
    let Some((from, to)) = q.bounds() else {
        return err_response(StatusCode::BAD_REQUEST, "invalid_range");
    };

    let conn = state.conn.lock().await;
    match select_activities(&conn, from, to) {
        Ok(entries) => Json(OkResponse {
            ok: true,
            data: Some(entries),
        })
        .into_response(),
        Err(err) => {
            error!("select_activities failed: {err}");
            err_response(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}

async fn get_duration_by_exe(State(state): State<AppState>, Query(q): Query<RangeQuery>) -> Response {
    let Some((from, to)) = q.bounds() else {
        return err_response(StatusCode::BAD_REQUEST, "invalid_range");
    };

    let conn = state.conn.lock().await;
    match duration_by_exe(&conn, from, to) {
        Ok(pairs) => Json(OkResponse {
            ok: true,
            data: Some(pairs),
        })
        .into_response(),
        Err(err) => {
            error!("duration_by_exe failed: {err}");
            err_response(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}

async fn get_active_dates(State(state): State<AppState>, Query(q): Query<ActiveDatesQuery>) -> Response {
    let tz_offset_minutes = normalize_tz_offset_minutes(q.tz_offset_minutes);

    let conn = state.conn.lock().await;
    match active_dates(&conn, tz_offset_minutes) {
        Ok(days) => Json(OkResponse {
            ok: true,
            data: Some(days),
        })
        .into_response(),
        Err(err) => {
            error!("active_dates failed: {err}");
            err_response(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}

async fn get_config(State(state): State<AppState>) -> Response {
    Json(OkResponse {
        ok: true,
        data: Some(state.config.as_ref().clone()),
    })
    .into_response()
}

fn select_activities(conn: &Connection, from: i64, to: i64) -> rusqlite::Result<Vec<ActivityEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT begin_ms, end_ms, pid, exe, title FROM activities WHERE begin_ms >= ?1 AND begin_ms < ?2 ORDER BY begin_ms ASC",
    )?;
    let rows = stmt.query_map((from, to), |row| {
        Ok(ActivityEntry {
            start_ms: row.get(0)?,
            end_ms: row.get(1)?,
            pid: row.get(2)?,
            exe: row.get(3)?,
            title: row.get(4)?,
        })
    })?;
    rows.collect()
}

fn duration_by_exe(conn: &Connection, from: i64, to: i64) -> rusqlite::Result<Vec<ExeDuration>> {
    let mut stmt = conn.prepare_cached(
        "SELECT exe, SUM(end_ms - begin_ms) FROM activities WHERE begin_ms >= ?1 AND begin_ms < ?2 GROUP BY exe ORDER BY 2 DESC, exe ASC",
    )?;
    let rows = stmt.query_map((from, to), |row| {
        Ok(ExeDuration {
            exe: row.get(0)?,
            duration_ms: row.get(1)?,
        })
    })?;
    rows.collect()
}

/// Start (UTC epoch ms) of every local day with any activity, ascending.
fn active_dates(conn: &Connection, tz_offset_minutes: i32) -> rusqlite::Result<Vec<i64>> {
    let offset_ms = i64::from(tz_offset_minutes) * 60_000;
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT ((begin_ms + ?1) / ?2) * ?2 - ?1 AS day FROM activities ORDER BY day ASC",
    )?;
    let rows = stmt.query_map((offset_ms, DAY_MS), |row| row.get(0))?;
    rows.collect()
}

fn normalize_tz_offset_minutes(v: Option<i32>) -> i32 {
    v.unwrap_or(0)
        .clamp(TZ_OFFSET_MINUTES_MIN, TZ_OFFSET_MINUTES_MAX)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    const H: i64 = 3_600_000;

    fn db(rows: &[(i64, i64, &str)]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE activities (begin_ms INTEGER NOT NULL, end_ms INTEGER NOT NULL, pid INTEGER NOT NULL, exe TEXT NOT NULL, title TEXT NOT NULL);",
        )
        .unwrap();
        for (i, (begin, end, exe)) in rows.iter().enumerate() {
            conn.execute(
                "INSERT INTO activities (begin_ms, end_ms, pid, exe, title) VALUES (?1, ?2, ?3, ?4, ?5)",
                (begin, end, i as i64, exe, format!("window {i}")),
            )
            .unwrap();
        }
        conn
    }

    #[test]
    fn select_is_half_open_and_ordered() {
        let day = 20_000 * DAY_MS;
        let conn = db(&[
            (day + 5 * H, day + 6 * H, "/bin/b"),
            (day, day + H, "/bin/a"),
            (day + DAY_MS, day + DAY_MS + H, "/bin/next-day"),
            (day - 1, day + 1, "/bin/previous-day"),
        ]);

        let rows = select_activities(&conn, day, day + DAY_MS).unwrap();
        let exes: Vec<_> = rows.iter().map(|r| r.exe.as_str()).collect();
        assert_eq!(exes, vec!["/bin/a", "/bin/b"]);
        assert_eq!(rows[0].title, "window 1");
        assert_eq!(rows[0].pid, 1);
    }

    #[test]
    fn durations_are_summed_per_path() {
        let day = 20_000 * DAY_MS;
        let conn = db(&[
            (day, day + H, "/bin/a"),
            (day + H, day + 3 * H, "/bin/b"),
            (day + 3 * H, day + 5 * H, "/bin/a"),
            (day + 6 * H, day + 7 * H, "C:\\bin\\a"),
        ]);

        let pairs = duration_by_exe(&conn, day, day + DAY_MS).unwrap();
        let pairs: Vec<_> = pairs.iter().map(|p| (p.exe.as_str(), p.duration_ms)).collect();
        assert_eq!(pairs, vec![("/bin/a", 3 * H), ("/bin/b", 2 * H), ("C:\\bin\\a", H)]);
    }

    #[test]
    fn active_dates_follow_the_client_offset() {
        let day = 20_000 * DAY_MS;
        let conn = db(&[
            (day + 2 * H, day + 3 * H, "/bin/a"),
            (day + 20 * H, day + 21 * H, "/bin/a"),
            (day + DAY_MS + H, day + DAY_MS + 2 * H, "/bin/a"),
        ]);

        assert_eq!(active_dates(&conn, 0).unwrap(), vec![day, day + DAY_MS]);

        // UTC+8: 20:00Z is already the next local day, whose start is 16:00Z.
        let local_next = day + DAY_MS - 8 * H;
        assert_eq!(
            active_dates(&conn, 8 * 60).unwrap(),
            vec![day - 8 * H, local_next]
        );
    }

    #[test]
    fn range_query_validation() {
        assert_eq!(RangeQuery { from: Some(1), to: Some(2) }.bounds(), Some((1, 2)));
        assert_eq!(RangeQuery { from: Some(2), to: Some(2) }.bounds(), Some((2, 2)));
        assert_eq!(RangeQuery { from: Some(3), to: Some(2) }.bounds(), None);
        assert_eq!(RangeQuery { from: None, to: Some(2) }.bounds(), None);
    }

    #[test]
    fn tz_offset_is_clamped() {
        assert_eq!(normalize_tz_offset_minutes(None), 0);
        assert_eq!(normalize_tz_offset_minutes(Some(480)), 480);
        assert_eq!(normalize_tz_offset_minutes(Some(100 * 60)), 14 * 60);
        assert_eq!(normalize_tz_offset_minutes(Some(-100 * 60)), -14 * 60);
    }

    #[test]
    fn parse_listen_accepts_common_forms() {
        assert_eq!(parse_listen("127.0.0.1:9000").unwrap().port(), 9000);
        assert_eq!(parse_listen("0.0.0.0").unwrap().port(), DEFAULT_PORT);
        assert_eq!(parse_listen("localhost").unwrap().to_string(), "127.0.0.1:17700");
        assert_eq!(parse_listen("localhost:8080").unwrap().port(), 8080);
        assert!(parse_listen("localhost:http").is_err());
        assert!(parse_listen("example.com:80").is_err());
    }

    fn state(conn: Connection) -> AppState {
        AppState {
            conn: Arc::new(Mutex::new(conn)),
            config: Arc::new(BackendConfig {
                blacklist: vec!["browser_private".to_string()],
                ..Default::default()
            }),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn select_route_returns_rows_in_the_envelope() {
        let day = 20_000 * DAY_MS;
        let app = router(state(db(&[(day, day + H, "/bin/a")])));

        let (status, body) = get_json(app, &format!("/select?from={day}&to={}", day + DAY_MS)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({"ok": true, "data": [[day, day + H, 0, "/bin/a", "window 0"]]})
        );
    }

    #[tokio::test]
    async fn bad_ranges_are_400_invalid_range() {
        let app = router(state(db(&[])));
        for uri in [
            "/select?from=5&to=1",
            "/select?from=5",
            "/duration_by_exe?to=1",
            "/duration_by_exe?from=9&to=3",
        ] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body, serde_json::json!({"ok": false, "error": "invalid_range"}), "{uri}");
        }
    }

    #[tokio::test]
    async fn query_failures_are_500_db_error() {
        // No `activities` table.
        let app = router(state(Connection::open_in_memory().unwrap()));
        for uri in ["/select?from=0&to=1", "/duration_by_exe?from=0&to=1", "/active_dates"] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert_eq!(body, serde_json::json!({"ok": false, "error": "db_error"}), "{uri}");
        }
    }

    #[tokio::test]
    async fn health_config_and_active_dates_routes() {
        let day = 20_000 * DAY_MS;
        let app = router(state(db(&[(day + 2 * H, day + 3 * H, "/bin/a")])));

        let (status, body) = get_json(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["service"], "trackme_bridge");

        let (_, body) = get_json(app.clone(), "/config").await;
        assert_eq!(body["data"]["blacklist"], serde_json::json!(["browser_private"]));

        let (status, body) = get_json(app, "/active_dates?tz_offset_minutes=480").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"ok": true, "data": [day - 8 * H]}));
    }

    #[test]
    fn missing_config_file_is_an_empty_config() {
        let config = load_config(Path::new("./definitely/not/here/config.json")).unwrap();
        assert_eq!(config, BackendConfig::default());
    }
}
