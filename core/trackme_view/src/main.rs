use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::Parser;
use tracing::{error, info, warn};

use trackme_view::aggregate::PieSummary;
use trackme_view::decompose::Layout;
use trackme_view::explorer::{render, Explorer, Render};
use trackme_view::format::format_duration;
use trackme_view::source::HttpSource;
use trackme_view::sync::{settled, FetchState};
use trackme_view::timeline::TimelineRow;
use trackme_view::DateRange;

#[derive(Parser, Debug)]
#[command(name = "trackme", version)]
struct Args {
    /// Bridge base URL, e.g. http://127.0.0.1:17700
    #[arg(long, default_value = "http://127.0.0.1:17700")]
    bridge_url: String,

    /// First day of the range: YYYY-MM-DD or an RFC 3339 timestamp.
    ///
    /// Defaults to today.
    #[arg(long)]
    from: Option<String>,

    /// Last day of the range (inclusive). Defaults to `--from`.
    #[arg(long)]
    to: Option<String>,

    /// Print the backend configuration and exit.
    #[arg(long, default_value_t = false)]
    show_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackme=info,trackme_view=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let now = Local::now();
    let today = now.date_naive().to_string();
    let from = args.from.as_deref().unwrap_or(&today);
    let to = args.to.as_deref().unwrap_or(from);
    let range = DateRange::parse(Some(from), Some(to), &Local)?;

    let tz_offset_minutes = now.offset().local_minus_utc() / 60;
    let source = HttpSource::new(&args.bridge_url, tz_offset_minutes);
    let active_zone = source.zone();
    info!("Reading from {}", args.bridge_url);
    let mut explorer: Explorer<HttpSource, Local> = Explorer::new(Arc::new(source));

    if args.show_config {
        let config = explorer.config().await?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match explorer.load_active_dates(now.date_naive()).await {
        Ok(dates) => {
            let first = range.from.date_naive();
            if !dates.is_day_selectable(first, &active_zone) {
                warn!("nothing recorded on {first}");
            }
        }
        Err(err) => warn!("active dates unavailable: {err}"),
    }

    explorer.select(range)?;
    println!("{}", explorer.footer());
    println!();

    let summary = settled(&mut explorer.summary()).await;
    print_pie("Selected range", &summary);

    match explorer.layout() {
        Some(Layout::SingleDay) => {
            let timeline = settled(&mut explorer.timeline()).await;
            print_timeline(&timeline);
        }
        Some(Layout::MultiDay(_)) => {
            for (label, mut rx) in explorer.windows() {
                let pie = settled(&mut rx).await;
                print_pie(label, &pie);
            }
        }
        None => {}
    }
    Ok(())
}

fn print_pie(label: &str, state: &FetchState<PieSummary>) {
    match render(state, PieSummary::is_empty) {
        Render::Nothing => {}
        Render::Progress => println!("{label}: loading…"),
        Render::Error(err) => {
            error!("{label} failed: {err}");
            println!("{label}: error: {err}");
        }
        Render::NoData => println!("{label}: No data"),
        Render::Data(pie) => {
            println!("{label}: {}", pie.title);
            for total in &pie.totals {
                let share = if pie.total_ms > 0 {
                    total.total_ms as f64 * 100.0 / pie.total_ms as f64
                } else {
                    0.0
                };
                println!(
                    "  {:>5.1}%  {:<12} {}",
                    share,
                    format_duration(total.total_ms),
                    total.name
                );
            }
        }
    }
    println!();
}

fn print_timeline(state: &FetchState<Vec<TimelineRow>>) {
    match render(state, |rows| rows.is_empty()) {
        Render::Nothing => {}
        Render::Progress => println!("Timeline: loading…"),
        Render::Error(err) => {
            error!("timeline failed: {err}");
            println!("Timeline: error: {err}");
        }
        Render::NoData => println!("Timeline: No data"),
        Render::Data(rows) => {
            println!("Timeline");
            for row in rows {
                println!(
                    "  {}–{}  {} {:<20} {}",
                    fmt_hms(row.start_ms),
                    fmt_hms(row.end_ms),
                    row.color,
                    row.exe,
                    row.title
                );
            }
        }
    }
}

fn fmt_hms(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "??:??:??".to_string())
}
