use std::collections::BTreeSet;
use std::future::Future;

use chrono::{FixedOffset, Offset, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FetchError;
use crate::model::{ActivityEntry, ExeDuration};
use crate::range::QueryRange;

pub trait DataSource: Send + Sync + 'static {
    /// Raw activity rows whose start lies in `range`, in start order.
    fn list_activities(
        &self,
        range: QueryRange,
    ) -> impl Future<Output = Result<Vec<ActivityEntry>, FetchError>> + Send;

    /// Per-path totals for `range`. May repeat a path.
    fn duration_by_executable(
        &self,
        range: QueryRange,
    ) -> impl Future<Output = Result<Vec<ExeDuration>, FetchError>> + Send;

    /// Epoch-ms starts of every local day that has any activity.
    fn list_active_dates(&self) -> impl Future<Output = Result<BTreeSet<i64>, FetchError>> + Send;

    fn get_config(&self) -> impl Future<Output = Result<BackendConfig, FetchError>> + Send;
}

/// Backend configuration as stored in the tracker's `config.json`. Read-only
/// from this side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub matchers: Vec<MatcherRule>,
    #[serde(default)]
    pub storage: StorageDescription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherRule {
    pub name: String,
    pub matcher: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescription {
    #[serde(default)]
    pub location: Option<String>,
}

const TZ_OFFSET_LIMIT_MINUTES: i32 = 14 * 60;

/// Talks to `trackme_bridge` over HTTP.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    tz_offset_minutes: i32,
}

#[derive(Serialize)]
struct ActiveDatesQuery {
    tz_offset_minutes: i32,
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl HttpSource {
    /// `tz_offset_minutes` decides which local days `list_active_dates`
    /// reports, e.g. 480 for UTC+8. Clamped to ±14h like the bridge does.
    pub fn new(base_url: &str, tz_offset_minutes: i32) -> Self {
        HttpSource {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tz_offset_minutes: tz_offset_minutes.clamp(-TZ_OFFSET_LIMIT_MINUTES, TZ_OFFSET_LIMIT_MINUTES),
        }
    }

    /// The zone the reported active days are cut in. Check days against
    /// `list_active_dates` with this, not with a zone that follows DST.
    pub fn zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.tz_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    async fn get_ok<T, Q>(&self, path: &str, query: &Q) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {url}");
        let res = self.client.get(&url).query(query).send().await?;
        let status = res.status().as_u16();
        let body = res.bytes().await?;
        decode_envelope(status, &body)
    }
}

/// Unwraps the bridge's `{ok, data, error}` envelope.
fn decode_envelope<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, FetchError> {
    if !(200..300).contains(&status) {
        let code = serde_json::from_slice::<Envelope<serde_json::Value>>(body)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| format!("http_{status}"));
        return Err(FetchError::Backend(code));
    }

    let envelope: Envelope<T> = serde_json::from_slice(body)?;
    if !envelope.ok {
        return Err(FetchError::Backend(
            envelope.error.unwrap_or_else(|| "not_ok".to_string()),
        ));
    }
    envelope
        .data
        .ok_or_else(|| FetchError::Malformed("missing data".to_string()))
}

impl DataSource for HttpSource {
    async fn list_activities(&self, range: QueryRange) -> Result<Vec<ActivityEntry>, FetchError> {
        self.get_ok("/select", &range).await
    }

    async fn duration_by_executable(&self, range: QueryRange) -> Result<Vec<ExeDuration>, FetchError> {
        self.get_ok("/duration_by_exe", &range).await
    }

    async fn list_active_dates(&self) -> Result<BTreeSet<i64>, FetchError> {
        let query = ActiveDatesQuery {
            tz_offset_minutes: self.tz_offset_minutes,
        };
        let dates: Vec<i64> = self.get_ok("/active_dates", &query).await?;
        Ok(dates.into_iter().collect())
    }

    async fn get_config(&self) -> Result<BackendConfig, FetchError> {
        self.get_ok("/config", &()).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::range::DAY_MS;

    /// Serves a fixed set of rows; counts every call.
    #[derive(Default)]
    pub(crate) struct MemorySource {
        pub entries: Vec<ActivityEntry>,
        pub fail_with: Option<FetchError>,
        pub calls: AtomicUsize,
    }

    impl MemorySource {
        pub fn new(entries: Vec<ActivityEntry>) -> Self {
            MemorySource {
                entries,
                ..Default::default()
            }
        }

        pub fn failing(err: FetchError) -> Self {
            MemorySource {
                fail_with: Some(err),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn check(&self) -> Result<(), FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        fn in_range(&self, range: QueryRange) -> impl Iterator<Item = &ActivityEntry> {
            self.entries
                .iter()
                .filter(move |e| range.from_ms <= e.start_ms && e.start_ms < range.to_ms)
        }
    }

    impl DataSource for MemorySource {
        async fn list_activities(&self, range: QueryRange) -> Result<Vec<ActivityEntry>, FetchError> {
            self.check()?;
            Ok(self.in_range(range).cloned().collect())
        }

        async fn duration_by_executable(&self, range: QueryRange) -> Result<Vec<ExeDuration>, FetchError> {
            self.check()?;
            Ok(self
                .in_range(range)
                .map(|e| ExeDuration {
                    exe: e.exe.clone(),
                    duration_ms: e.end_ms - e.start_ms,
                })
                .collect())
        }

        async fn list_active_dates(&self) -> Result<BTreeSet<i64>, FetchError> {
            self.check()?;
            Ok(self
                .entries
                .iter()
                .map(|e| e.start_ms.div_euclid(DAY_MS) * DAY_MS)
                .collect())
        }

        async fn get_config(&self) -> Result<BackendConfig, FetchError> {
            self.check()?;
            Ok(BackendConfig::default())
        }
    }
}
