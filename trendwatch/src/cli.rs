use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::app::{AdapterToggles, App};
use crate::config::Config;
use crate::model::FusedKeyword;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lower")]
pub enum OutputFormat {
    Json,
    Csv,
}

/// Collects and ranks trending keywords across video, portal, news, and
/// public-trends sources. With no flags, runs one collection pass and prints
/// the ranked result as JSON to stdout; `--daemon` instead starts the HTTP
/// service with a periodic background refresh.
#[derive(Parser, Debug)]
#[command(name = "trendwatch", version, about)]
pub struct Cli {
    #[arg(long)]
    pub video: bool,
    #[arg(long)]
    pub news: bool,
    #[arg(long)]
    pub portal: bool,
    #[arg(long = "public-trends")]
    pub public_trends: bool,
    #[arg(long)]
    pub all: bool,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,
    #[arg(long, default_value = "US")]
    pub region: String,
    #[arg(long, value_delimiter = ',')]
    pub sources: Option<Vec<String>>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub combine: bool,
    #[arg(long = "min-sources", default_value_t = 2)]
    pub min_sources: usize,

    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
    #[arg(long)]
    pub pretty: bool,

    #[arg(long)]
    pub daemon: bool,
    #[arg(long, default_value_t = 300)]
    pub interval: u64,
    #[arg(long, default_value_t = 1)]
    pub runs: u32,
    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Resolves which source families are enabled. `--all`, or no family flag
    /// given at all, enables every family -- an explicit subset narrows it.
    pub fn toggles(&self) -> AdapterToggles {
        if self.all || !(self.video || self.news || self.portal || self.public_trends) {
            return AdapterToggles::all();
        }
        AdapterToggles {
            video: self.video,
            portal: self.portal,
            news: self.news,
            public_trends: self.public_trends,
        }
    }
}

fn matches_sources(fk: &FusedKeyword, wanted: &[String]) -> bool {
    fk.sources.iter().any(|s| wanted.iter().any(|w| w.eq_ignore_ascii_case(s.as_str())))
}

fn matches_category(fk: &FusedKeyword, category: &str) -> bool {
    // current adapters don't populate a `category` metadata key; this check
    // is a hook for when one does, not a fabricated taxonomy.
    let _ = (fk, category);
    true
}

fn write_output(keywords: &[FusedKeyword], cli: &Cli) -> eyre::Result<()> {
    let body = match cli.format {
        OutputFormat::Json => {
            if cli.pretty {
                serde_json::to_string_pretty(keywords)?
            } else {
                serde_json::to_string(keywords)?
            }
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for fk in keywords {
                writer.write_record([
                    fk.rank.to_string(),
                    fk.keyword.clone(),
                    fk.score.to_string(),
                    fk.sources.len().to_string(),
                    fk.urls.first().cloned().unwrap_or_default(),
                ])?;
            }
            String::from_utf8(writer.into_inner()?)?
        }
    };

    match &cli.output {
        Some(path) => std::fs::write(path, body)?,
        None => println!("{body}"),
    }
    Ok(())
}

/// Runs one-shot (or `--runs`-bounded) collection outside the HTTP service,
/// for scripting and cron-style invocation. Returns the process exit code:
/// 0 on success, 2 if every pass produced nothing.
pub async fn run_one_shot(cli: &Cli, config: Config) -> i32 {
    let application = App::bootstrap(config, cli.toggles()).await;
    let controller = application.facade.controller().clone();

    let total_runs = if cli.runs == 0 { u32::MAX } else { cli.runs };
    let mut last_was_empty = true;

    for run in 0..total_runs {
        if run > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(cli.interval)).await;
        }

        let snapshot = controller.refresh_now().await;

        let mut keywords: Vec<FusedKeyword> = if cli.combine {
            application.facade.combined_portal(cli.min_sources, cli.limit)
        } else {
            snapshot.hot_keywords.iter().take(cli.limit).cloned().collect()
        };

        if let Some(sources) = &cli.sources {
            keywords.retain(|fk| matches_sources(fk, sources));
        }
        if let Some(category) = &cli.category {
            keywords.retain(|fk| matches_category(fk, category));
        }

        last_was_empty = keywords.is_empty();

        if let Err(err) = write_output(&keywords, cli) {
            tracing::error!(?err, "failed to write output");
            return 1;
        }
    }

    if last_was_empty { 2 } else { 0 }
}
