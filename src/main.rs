use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use specmod_review::bandwidth::describe_band;
use specmod_review::config::ReviewConfig;
use specmod_review::data::filter::{StationFilter, filtered_station_ids};
use specmod_review::data::loader::RecordFormat;
use specmod_review::{FileStore, LogBand, SessionStore, SpectraStore};

/// Review seismic signal/noise spectra and record per-station decisions.
#[derive(Parser, Debug)]
#[command(name = "specmod-review")]
#[command(version)]
struct Args {
    /// TOML config file (defaults to ./specmod-review.toml if present)
    #[arg(short, long, env = "SPECMOD_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding one sub-directory per event
    #[arg(short, long, env = "SPECMOD_PARENT_DIR")]
    parent_dir: Option<PathBuf>,

    /// Record encoding
    #[arg(short, long, value_enum)]
    format: Option<RecordFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List events that have a spectral record
    Events,
    /// List the stations of an event
    List {
        event: String,
        #[arg(long, value_enum, default_value = "all")]
        only: StationFilter,
    },
    /// Show derived bounds and bandwidth of one or all stations
    Show {
        event: String,
        #[arg(long)]
        station: Option<String>,
    },
    /// Stage edits and commit them in one save per event
    Review {
        event: String,
        /// `STA=suitable`, `STA=suitable:MIN-MAX` (Hz) or `STA=unsuitable`
        #[arg(long = "edit", required = true)]
        edits: Vec<StationEdit>,
        /// Stage and report, but do not write
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ReviewConfig::resolve(args.config.as_deref())?;
    if let Some(dir) = args.parent_dir {
        config.parent_dir = dir;
    }
    if let Some(format) = args.format {
        config.format = format;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_filter()),
    )
    .init();
    log::debug!("Using {config:?}");

    let store = FileStore::new(config.format);

    match args.command {
        Command::Events => {
            for event in store.events(&config.parent_dir)? {
                println!("{event}");
            }
        }
        Command::List { event, only } => {
            let record = store
                .load(&config.parent_dir, &event)
                .with_context(|| format!("loading event {event}"))?;
            for station in filtered_station_ids(&record, only) {
                println!("{station}");
            }
        }
        Command::Show { event, station } => {
            let mut session = SessionStore::new(&config.parent_dir, store);
            let stations = match station {
                Some(s) => vec![s],
                None => session.station_ids(&event)?,
            };
            for station in &stations {
                show_station(&mut session, &event, station, config.mark_count);
            }
        }
        Command::Review {
            event,
            edits,
            dry_run,
        } => {
            let mut session = SessionStore::new(&config.parent_dir, store);
            for edit in &edits {
                let entry = session.get_or_load(&event, &edit.station)?;
                let bandwidth = match edit.decision {
                    Decision::Suitable(Some(band)) => Some(band),
                    _ => entry.current_bandwidth(),
                };
                let suitable = !matches!(edit.decision, Decision::Unsuitable);

                let outcome = session.stage(&event, &edit.station, suitable, bandwidth)?;
                if outcome.changed {
                    println!("{}", outcome.description);
                } else {
                    println!("{}: nothing to change", edit.station);
                }
            }

            if dry_run {
                println!(
                    "Dry run: {} station(s) staged, nothing written.",
                    session.pending_changes().len()
                );
                return Ok(());
            }

            let report = session.commit();
            println!("{report}");
            if report.has_failures() {
                bail!("commit incomplete");
            }
        }
    }

    Ok(())
}

fn show_station(session: &mut SessionStore<FileStore>, event: &str, station: &str, mark_count: usize) {
    let view = match session.view(event, station, mark_count) {
        Ok(v) => v,
        Err(e) => {
            // a station that cannot be displayed should not hide the rest
            log::warn!("{e}");
            println!("{station}: cannot display station ({e})");
            return;
        }
    };

    println!(
        "{station}: suitable={} range={} bandwidth={}",
        view.suitable_for_modeling,
        view.slider,
        view.readout.as_deref().unwrap_or("-"),
    );
    if let Some(band) = &view.new_bandwidth {
        println!("  override: {}", describe_band(band));
    }
    let marks: Vec<&str> = view.marks.iter().map(|m| m.label.as_str()).collect();
    println!("  marks: {}", marks.join(" "));
}

// ---------------------------------------------------------------------------
// --edit parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Decision {
    /// Suitable, optionally with a new band; otherwise the current band stays.
    Suitable(Option<LogBand>),
    Unsuitable,
}

#[derive(Debug, Clone, PartialEq)]
struct StationEdit {
    station: String,
    decision: Decision,
}

impl FromStr for StationEdit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (station, rest) = s
            .split_once('=')
            .with_context(|| format!("expected STA=suitable[:MIN-MAX] or STA=unsuitable, got '{s}'"))?;
        let station = station.trim();
        if station.is_empty() {
            bail!("missing station in '{s}'");
        }

        let (verdict, band) = match rest.split_once(':') {
            Some((v, b)) => (v, Some(b)),
            None => (rest, None),
        };

        let decision = match (verdict.trim(), band) {
            ("suitable", None) => Decision::Suitable(None),
            ("suitable", Some(b)) => Decision::Suitable(Some(parse_band(b)?)),
            ("unsuitable", None) => Decision::Unsuitable,
            ("unsuitable", Some(_)) => bail!("an unsuitable station takes no bandwidth"),
            (other, _) => bail!("unknown decision '{other}'"),
        };

        Ok(Self {
            station: station.to_string(),
            decision,
        })
    }
}

fn parse_band(s: &str) -> Result<LogBand> {
    let (lo, hi) = s
        .split_once('-')
        .with_context(|| format!("expected MIN-MAX, got '{s}'"))?;
    let lo: f64 = lo.trim().parse().with_context(|| format!("bad minimum '{lo}'"))?;
    let hi: f64 = hi.trim().parse().with_context(|| format!("bad maximum '{hi}'"))?;
    if !(lo > 0.0 && lo < hi) {
        bail!("need 0 < MIN < MAX, got {lo}-{hi}");
    }
    Ok(LogBand::from_hz(lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_edits() {
        let e: StationEdit = "STA1=unsuitable".parse().unwrap();
        assert_eq!(e.decision, Decision::Unsuitable);

        let e: StationEdit = "STA2=suitable".parse().unwrap();
        assert_eq!(e.decision, Decision::Suitable(None));

        let e: StationEdit = "STA3=suitable:1.0-50".parse().unwrap();
        assert_eq!(e.station, "STA3");
        assert_eq!(e.decision, Decision::Suitable(Some(LogBand::from_hz(1.0, 50.0))));
    }

    #[test]
    fn reject_bad_edits() {
        for bad in ["STA1", "=suitable", "STA1=maybe", "STA1=suitable:5-1", "STA1=unsuitable:1-2"] {
            assert!(bad.parse::<StationEdit>().is_err(), "{bad}");
        }
    }

    #[test]
    fn cli_parses() {
        let args = Args::try_parse_from([
            "specmod-review",
            "review",
            "2012-10-08T12:12:12.760000Z",
            "--edit",
            "STA1=unsuitable",
            "--edit",
            "STA2=suitable:0.5-20",
        ])
        .unwrap();
        match args.command {
            Command::Review { edits, dry_run, .. } => {
                assert_eq!(edits.len(), 2);
                assert!(!dry_run);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
