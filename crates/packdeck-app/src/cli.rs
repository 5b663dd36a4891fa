//! Command-line surface: argument parsing and command dispatch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures_util::future::join_all;
use packdeck_catalog::{CatalogSelection, FetchOutcome, QueryBuilder};
use packdeck_config::{SettingsPatch, SettingsStore};
use packdeck_core::{
    CatalogPage, DownloadStartError, DownloadState, PackId, SortDirection, SortSpec,
    error_chain,
};
use packdeck_telemetry::GlobalContextGuard;
use tracing::{info, warn};

use crate::bootstrap::{AppServices, init_telemetry};
use crate::error::AppError;
use crate::output::{self, PackReport};

/// Time the progress renderer gets to print terminal lines after every
/// worker reported.
const RENDER_GRACE: Duration = Duration::from_secs(1);

/// Parses CLI arguments, executes the requested command, and returns the
/// process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let config = match packdeck_config::load_from_env() {
        Ok(config) => config,
        Err(err) => return report_error(&CliError::from(AppError::config("config.load", err))),
    };
    if let Err(err) = init_telemetry(&config) {
        return report_error(&CliError::from(err));
    }
    let _context = GlobalContextGuard::new(cli.command.label());

    match dispatch(cli, config).await {
        Ok(()) => 0,
        Err(err) => report_error(&err),
    }
}

fn report_error(err: &CliError) -> i32 {
    eprintln!("error: {}", err.display_message());
    err.exit_code()
}

async fn dispatch(cli: Cli, config: packdeck_config::AppConfig) -> CliResult<()> {
    let format = cli.format;
    match cli.command {
        Command::Settings(command) => {
            let store = SettingsStore::from_config(&config);
            match command {
                SettingsCommand::Show => handle_settings_show(&store, format).await,
                SettingsCommand::Set(args) => handle_settings_set(&store, args, format).await,
            }
        }
        Command::SortOptions => {
            let services = AppServices::from_config(config)?;
            output::render_sort_options(&services.fetcher.sort_options(), format)
        }
        Command::Packs(args) => {
            let services = AppServices::from_config(config)?;
            let page = load_page(&services, &args).await?;
            output::render_page(&page, format)
        }
        Command::Download(args) => {
            let services = AppServices::from_config(config)?;
            handle_download(&services, args, format).await
        }
    }
}

#[derive(Parser)]
#[command(name = "packdeck", about = "Browse and download Etterna song packs")]
struct Cli {
    /// Output format for command results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List one page of the pack catalog.
    Packs(ListArgs),
    /// List the fields the catalog can be sorted by.
    SortOptions,
    /// Download packs from a catalog page.
    Download(DownloadArgs),
    /// Inspect or change persisted settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
}

impl Command {
    const fn label(&self) -> &'static str {
        match self {
            Self::Packs(_) => "packs",
            Self::SortOptions => "sort-options",
            Self::Download(_) => "download",
            Self::Settings(_) => "settings",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ListArgs {
    /// One-based page number.
    #[arg(long, default_value_t = 1)]
    pub(crate) page: u64,
    /// Field to sort by (see `sort-options`); a leading `-` sorts descending.
    #[arg(long, default_value = "name", allow_hyphen_values = true)]
    pub(crate) sort: String,
    /// Sort in descending order.
    #[arg(long)]
    pub(crate) desc: bool,
    /// Filter packs by name.
    #[arg(long, default_value = "")]
    pub(crate) search: String,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct DownloadArgs {
    /// Ids of packs on the selected page.
    #[arg(required = true)]
    pub(crate) ids: Vec<PackId>,
    #[command(flatten)]
    pub(crate) listing: ListArgs,
    /// Print collected metrics to stderr when done.
    #[arg(long)]
    pub(crate) metrics: bool,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the current settings.
    Show,
    /// Change one or more settings.
    Set(SettingsSetArgs),
}

#[derive(Args, Debug, Clone)]
struct SettingsSetArgs {
    /// HP drain rate for converted charts (0-10).
    #[arg(long)]
    hp_drain_rate: Option<f64>,
    /// Overall difficulty for converted charts (0-10).
    #[arg(long)]
    overall_difficulty: Option<f64>,
    /// Destination for song folders; pass an empty string to disable.
    #[arg(long)]
    song_path: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl From<AppError> for CliError {
    fn from(err: AppError) -> Self {
        match err.validation_detail() {
            Some(detail) => Self::Validation(format!("{}: {detail}", error_chain(&err))),
            None => Self::Failure(err.into()),
        }
    }
}

async fn handle_settings_show(store: &SettingsStore, format: OutputFormat) -> CliResult<()> {
    let settings = store
        .load()
        .await
        .map_err(|err| AppError::config("settings.load", err))?;
    output::render_settings(&settings, format)
}

async fn handle_settings_set(
    store: &SettingsStore,
    args: SettingsSetArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let patch = SettingsPatch {
        hp_drain_rate: args.hp_drain_rate,
        overall_difficulty: args.overall_difficulty,
        song_path: args.song_path,
    };
    if patch.is_empty() {
        return Err(CliError::validation(
            "nothing to update (pass --hp-drain-rate, --overall-difficulty or --song-path)",
        ));
    }
    let settings = store
        .update(&patch)
        .await
        .map_err(|err| AppError::config("settings.update", err))?;
    info!(path = %store.path().display(), "settings saved");
    output::render_settings(&settings, format)
}

pub(crate) fn selection_from(args: &ListArgs) -> CliResult<CatalogSelection> {
    let sort = SortSpec::parse(&args.sort)
        .map_err(|err| CliError::from(AppError::catalog("catalog.sort", err)))?;
    let mut selection = CatalogSelection::new();
    selection.set_sort_field(sort.field);
    selection.set_sort_direction(if args.desc {
        SortDirection::Descending
    } else {
        sort.direction
    });
    selection.set_search(args.search.clone());
    // Sort and search changes reset the page, so it goes last.
    selection.set_page(args.page);
    Ok(selection)
}

pub(crate) async fn load_page(
    services: &AppServices,
    args: &ListArgs,
) -> CliResult<Arc<CatalogPage>> {
    let selection = selection_from(args)?;
    let mut builder = QueryBuilder::new(services.config.page_size);
    let query = builder
        .issue(&selection)
        .map_err(|err| AppError::catalog("catalog.query", err))?
        .ok_or_else(|| CliError::failure(anyhow!("catalog query was not issued")))?;
    match services.fetcher.fetch(&query).await {
        Ok(FetchOutcome::Ready(page)) => Ok(page),
        Ok(outcome) => Err(CliError::failure(anyhow!(
            "catalog request did not complete: {outcome:?}"
        ))),
        Err(err) => Err(AppError::catalog("catalog.fetch", err).into()),
    }
}

pub(crate) async fn handle_download(
    services: &AppServices,
    args: DownloadArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let page = load_page(services, &args.listing).await?;
    let mut packs = Vec::with_capacity(args.ids.len());
    for id in &args.ids {
        let pack = page.find(*id).ok_or_else(|| {
            CliError::validation(format!(
                "pack {id} is not on catalog page {}",
                page.meta.current_page
            ))
        })?;
        packs.push(pack.clone());
    }

    // Events published while the downloads start are replayed from here.
    let since = services.events.last_event_id().unwrap_or_default();
    let mut reports = Vec::with_capacity(packs.len());
    let mut handles = Vec::new();
    for pack in &packs {
        match services.orchestrator.start_pack(pack).await {
            Ok(handle) => handles.push((pack.name.clone(), handle)),
            Err(err) => reports.push(rejected_report(services, pack.id, &pack.name, err).await),
        }
    }

    let started: HashSet<PackId> = handles.iter().map(|(_, handle)| handle.pack_id()).collect();
    let stream = services.events.subscribe(Some(since));
    let mut renderer = tokio::spawn(output::render_progress(stream, started, format));

    let outcomes = join_all(handles.into_iter().map(|(name, handle)| async move {
        let pack_id = handle.pack_id();
        (pack_id, name, handle.wait().await)
    }))
    .await;

    match tokio::time::timeout(RENDER_GRACE, &mut renderer).await {
        Ok(Ok(unfinished)) if !unfinished.is_empty() => {
            warn!(packs = ?unfinished, "progress stream ended early");
        }
        Ok(_) => {}
        Err(_) => renderer.abort(),
    }

    let mut failed = 0_usize;
    for (pack_id, name, outcome) in outcomes {
        reports.push(match outcome {
            Ok(path) => PackReport {
                pack_id,
                name,
                state: DownloadState::Completed,
                archive_path: Some(path.display().to_string()),
                note: None,
            },
            Err(err) => {
                failed += 1;
                PackReport {
                    pack_id,
                    name,
                    state: DownloadState::Failed {
                        message: error_chain(err.as_ref()),
                    },
                    archive_path: None,
                    note: None,
                }
            }
        });
    }
    reports.sort_by_key(|report| report.pack_id);
    output::render_reports(&reports, format)?;

    if args.metrics {
        let rendered = services
            .metrics
            .render()
            .map_err(|err| AppError::telemetry("telemetry.render", err))?;
        eprint!("{rendered}");
    }

    if failed > 0 {
        return Err(CliError::failure(anyhow!(
            "{failed} of {} downloads failed",
            reports.len()
        )));
    }
    Ok(())
}

async fn rejected_report(
    services: &AppServices,
    pack_id: PackId,
    name: &str,
    err: DownloadStartError,
) -> PackReport {
    PackReport {
        pack_id,
        name: name.to_owned(),
        state: services.orchestrator.state(pack_id).await,
        archive_path: None,
        note: Some(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_args(sort: &str, desc: bool, page: u64) -> ListArgs {
        ListArgs {
            page,
            sort: sort.into(),
            desc,
            search: " wave ".into(),
        }
    }

    #[test]
    fn selection_keeps_requested_page_after_sort_and_search() -> anyhow::Result<()> {
        let selection = selection_from(&list_args("Overall", true, 3))
            .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(selection.page(), 3);
        assert_eq!(selection.sort().encode(), "-overall");
        assert_eq!(selection.search(), " wave ");
        Ok(())
    }

    #[test]
    fn sort_prefix_selects_direction() -> anyhow::Result<()> {
        let prefixed = selection_from(&list_args("-stamina", false, 1))
            .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(prefixed.sort().encode(), "-stamina");

        let flagged = selection_from(&list_args("jacks", true, 1))
            .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(flagged.sort().encode(), "-jacks");

        let ascending = selection_from(&list_args("jacks", false, 1))
            .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(ascending.sort().encode(), "jacks");

        let cli = Cli::try_parse_from(["packdeck", "packs", "--sort", "-overall"])?;
        let Command::Packs(args) = cli.command else {
            anyhow::bail!("expected the packs command");
        };
        let selection = selection_from(&args).map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(selection.sort().encode(), "-overall");
        Ok(())
    }

    #[test]
    fn unknown_sort_is_a_validation_error() {
        let err = selection_from(&list_args("speed", false, 1)).expect_err("unknown sort");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.display_message(),
            "catalog operation failed: invalid catalog query: sort (unknown_field): speed"
        );
    }

    #[test]
    fn cli_errors_map_to_exit_codes() {
        assert_eq!(CliError::validation("bad").exit_code(), 2);
        let failure = CliError::failure(anyhow!("network down"));
        assert_eq!(failure.exit_code(), 3);
        assert_eq!(failure.display_message(), "network down");
    }

    #[test]
    fn arguments_parse_into_commands() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "packdeck", "--format", "json", "download", "4", "7", "--sort", "jacks", "--desc",
        ])?;
        assert_eq!(cli.format, OutputFormat::Json);
        let Command::Download(args) = cli.command else {
            anyhow::bail!("expected download command");
        };
        assert_eq!(args.ids, vec![4, 7]);
        assert_eq!(args.listing.sort, "jacks");
        assert!(args.listing.desc);
        assert_eq!(args.listing.page, 1);

        let cli = Cli::try_parse_from(["packdeck", "settings", "set", "--hp-drain-rate", "6.5"])?;
        assert_eq!(cli.command.label(), "settings");
        assert!(Cli::try_parse_from(["packdeck", "download"]).is_err());
        Ok(())
    }
}
