use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone};
use tokio::sync::watch;
use tracing::info;

use crate::aggregate::PieSummary;
use crate::decompose::{Layout, WINDOWS};
use crate::error::{FetchError, InvalidRangeError};
use crate::picker::{apply_pick, footer, ActiveDates};
use crate::range::{normalize, DateRange};
use crate::source::{BackendConfig, DataSource};
use crate::sync::{FetchState, RangeBinding};
use crate::timeline::{timeline_rows, TimelineRow};

type PieBinding<Tz> = RangeBinding<DateRange<Tz>, PieSummary>;

pub struct Explorer<S, Tz: TimeZone> {
    source: Arc<S>,
    range: Option<DateRange<Tz>>,
    layout: Option<Layout<Tz>>,
    summary: PieBinding<Tz>,
    timeline: RangeBinding<DateRange<Tz>, Vec<TimelineRow>>,
    /// Parallel to `WINDOWS`.
    windows: Vec<PieBinding<Tz>>,
    active_dates: ActiveDates,
}

impl<S, Tz> Explorer<S, Tz>
where
    S: DataSource,
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    pub fn new(source: Arc<S>) -> Self {
        let summary = pie_binding(&source, "summary");
        let timeline = timeline_binding(&source);
        let windows = WINDOWS.iter().map(|w| pie_binding(&source, w.label)).collect();
        Explorer {
            source,
            range: None,
            layout: None,
            summary,
            timeline,
            windows,
            active_dates: ActiveDates::new(),
        }
    }

    /// Makes `range` the selection and points every view at it.
    ///
    /// An invalid range is rejected before any view or request is touched.
    ///
    /// # Panics
    ///
    /// Panics when a valid range is selected outside a Tokio runtime.
    pub fn select(&mut self, range: DateRange<Tz>) -> Result<(), InvalidRangeError> {
        let query = normalize(&range)?;
        let layout = Layout::for_range(&range);
        info!(from = query.from_ms, to = query.to_ms, "range selected");

        self.summary.set_range(range.clone());
        match &layout {
            Layout::SingleDay => {
                self.timeline.set_range(range.clone());
                for binding in &mut self.windows {
                    binding.clear();
                }
            }
            Layout::MultiDay(subs) => {
                self.timeline.clear();
                for (window, binding) in WINDOWS.iter().zip(&mut self.windows) {
                    match subs.iter().find(|s| s.days == window.days) {
                        Some(sub) => {
                            binding.set_range(sub.range());
                        }
                        None => binding.clear(),
                    }
                }
            }
        }

        self.range = Some(range);
        self.layout = Some(layout);
        Ok(())
    }

    /// Feeds a calendar pick through [`apply_pick`] and selects the result.
    pub fn pick(
        &mut self,
        from: Option<DateTime<Tz>>,
        to: Option<DateTime<Tz>>,
    ) -> Result<(), InvalidRangeError> {
        let next = match (&self.range, from) {
            (Some(current), from) => apply_pick(current, from, to),
            (None, Some(from)) => apply_pick(&DateRange::day(from.clone()), Some(from), to),
            (None, None) => return Err(InvalidRangeError::Missing("from")),
        };
        self.select(next)
    }

    pub fn range(&self) -> Option<&DateRange<Tz>> {
        self.range.as_ref()
    }

    pub fn layout(&self) -> Option<&Layout<Tz>> {
        self.layout.as_ref()
    }

    pub fn footer(&self) -> String {
        footer(self.range.as_ref())
    }

    pub fn summary(&self) -> watch::Receiver<FetchState<PieSummary>> {
        self.summary.subscribe()
    }

    pub fn timeline(&self) -> watch::Receiver<FetchState<Vec<TimelineRow>>> {
        self.timeline.subscribe()
    }

    /// Pies for the windows of the current layout, shortest first.
    pub fn windows(&self) -> Vec<(&'static str, watch::Receiver<FetchState<PieSummary>>)> {
        WINDOWS
            .iter()
            .zip(&self.windows)
            .filter(|(_, binding)| binding.active().is_some())
            .map(|(window, binding)| (window.label, binding.subscribe()))
            .collect()
    }

    pub async fn load_active_dates(&mut self, today: NaiveDate) -> Result<&ActiveDates, FetchError> {
        self.active_dates.ensure_loaded(&*self.source, today).await?;
        Ok(&self.active_dates)
    }

    pub fn active_dates(&self) -> &ActiveDates {
        &self.active_dates
    }

    /// Backend configuration, for the settings screen.
    pub async fn config(&self) -> Result<BackendConfig, FetchError> {
        self.source.get_config().await
    }
}

fn pie_binding<S, Tz>(source: &Arc<S>, name: &'static str) -> PieBinding<Tz>
where
    S: DataSource,
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    let source = Arc::clone(source);
    RangeBinding::new(name, move |range: DateRange<Tz>| {
        let source = Arc::clone(&source);
        async move {
            let query = normalize(&range)?;
            let pairs = source.duration_by_executable(query).await?;
            Ok::<_, FetchError>(PieSummary::build(&pairs))
        }
    })
}

fn timeline_binding<S, Tz>(source: &Arc<S>) -> RangeBinding<DateRange<Tz>, Vec<TimelineRow>>
where
    S: DataSource,
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    let source = Arc::clone(source);
    RangeBinding::new("timeline", move |range: DateRange<Tz>| {
        let source = Arc::clone(&source);
        async move {
            let query = normalize(&range)?;
            let entries = source.list_activities(query).await?;
            Ok::<_, FetchError>(timeline_rows(&entries))
        }
    })
}

/// What a view should draw for its current state.
#[derive(Debug, PartialEq, Eq)]
pub enum Render<'a, T> {
    Nothing,
    Progress,
    Error(&'a FetchError),
    NoData,
    Data(&'a T),
}

/// Maps a state to what gets drawn. Loading is never shown as "No data", and
/// an error always wins over data.
pub fn render<T>(state: &FetchState<T>, is_empty: impl Fn(&T) -> bool) -> Render<'_, T> {
    match state {
        FetchState::Idle => Render::Nothing,
        FetchState::Loading => Render::Progress,
        FetchState::Failed(err) => Render::Error(err),
        FetchState::Loaded(data) if is_empty(data) => Render::NoData,
        FetchState::Loaded(data) => Render::Data(data),
    }
}
