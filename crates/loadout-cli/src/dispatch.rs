use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::CommandFactory;
use loadout_core::FeatureBand;
use loadout_installer::{
    CancelToken, DirectoryPackageSource, HealthFailureMode, HealthOutcome, ManifestHealer,
};
use loadout_resolver::{ManifestProvider, ResolutionSource};
use loadout_state::{
    process_history, DisplayRecord, GlobalJsonPinRegistry, HistoryLedger, InstallStateStore,
    StateLayout, WorkloadSetMode,
};

use crate::render::{format_manifest_row, print_status, print_warning, start_repair_progress};
use crate::{Cli, Commands, UpdateMode};

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "loadout", &mut io::stdout());
        return Ok(());
    }

    let context = CommandContext::from_cli(&cli)?;
    match cli.command {
        Commands::Version { sdk_band } => run_version(&context, sdk_band.as_deref()),
        Commands::Resolve => run_resolve(&context),
        Commands::Repair { source, dry_run } => run_repair(&context, source, dry_run),
        Commands::History => run_history(&context),
        Commands::Pins => run_pins(&context),
        Commands::Config { update_mode } => run_config(&context, update_mode),
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

struct CommandContext {
    layout: StateLayout,
    sdk_band: FeatureBand,
    working_dir: PathBuf,
}

impl CommandContext {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let root = resolve_root(cli.root.clone(), std::env::var("LOADOUT_ROOT").ok())?;
        let sdk_version = resolve_sdk_version(
            cli.sdk_version.clone(),
            std::env::var("LOADOUT_SDK_VERSION").ok(),
        )?;
        let sdk_band = FeatureBand::from_sdk_version(&sdk_version)?;
        let working_dir = match &cli.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("failed to read the current directory")?,
        };
        Ok(Self {
            layout: StateLayout::new(root),
            sdk_band,
            working_dir,
        })
    }

    fn provider(&self, band_override: Option<FeatureBand>) -> Result<ManifestProvider> {
        ManifestProvider::new(
            self.layout.clone(),
            self.sdk_band,
            band_override,
            &self.working_dir,
        )
    }
}

pub(crate) fn resolve_root(flag: Option<PathBuf>, env: Option<String>) -> Result<PathBuf> {
    if let Some(root) = flag {
        return Ok(root);
    }
    if let Some(root) = env {
        return Ok(PathBuf::from(root));
    }
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve the SDK root")?;
        return Ok(PathBuf::from(app_data).join("Loadout"));
    }
    let home = std::env::var("HOME").context("HOME is not set; cannot resolve the SDK root")?;
    Ok(PathBuf::from(home).join(".loadout"))
}

pub(crate) fn resolve_sdk_version(flag: Option<String>, env: Option<String>) -> Result<String> {
    flag.or(env)
        .context("SDK version is required; pass --sdk-version or set LOADOUT_SDK_VERSION")
}

fn run_version(context: &CommandContext, band_flag: Option<&str>) -> Result<()> {
    let band_override = band_flag
        .map(FeatureBand::from_sdk_version)
        .transpose()?;
    let provider = context.provider(band_override)?;
    let info = provider.version_info()?;

    print_status("workload version:", &info.version);
    if !info.is_installed {
        match &info.global_json_path {
            Some(path) => print_warning(&format!(
                "version {} requested by {} is not installed",
                info.version,
                path.display()
            )),
            None => print_warning(&format!("version {} is not installed", info.version)),
        }
    }
    if info.workload_sets_enabled_without_set {
        print_status(
            "note:",
            "workload sets are enabled but none are installed; loose manifests are in effect",
        );
    }
    Ok(())
}

fn run_resolve(context: &CommandContext) -> Result<()> {
    let provider = context.provider(None)?;
    let source = match &provider.resolution().source {
        ResolutionSource::GlobalJson { path } => format!("global.json ({})", path.display()),
        ResolutionSource::InstallState => "install state".to_string(),
        ResolutionSource::LatestInstalled => "latest installed workload set".to_string(),
        ResolutionSource::LooseManifests => "loose manifests".to_string(),
    };
    print_status("resolved from:", &source);
    if let Some(version) = &provider.resolution().requested_version {
        print_status("workload set:", version);
    }

    for record in provider.manifest_records()? {
        println!(
            "{}",
            format_manifest_row(
                record.id.as_str(),
                &record.version,
                &record.feature_band.to_string()
            )
        );
    }
    Ok(())
}

fn run_repair(context: &CommandContext, source: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let provider = context.provider(None)?;
    let resolution = provider.resolution();
    if resolution.workload_set.is_none() {
        if let Some(version) = &resolution.requested_version {
            print_warning(&format!(
                "workload set {version} is not installed; repair can only restore \
                 manifests of an installed set"
            ));
        }
    }

    if dry_run {
        let missing = provider.missing_manifests();
        if missing.is_empty() {
            print_status("repair:", "all manifests are present");
        } else {
            for (id, version) in &missing {
                println!("would install {id} {}", version.version);
            }
        }
        return Ok(());
    }

    let source_dir = source.context("--source is required unless --dry-run is used")?;
    let mut healer = ManifestHealer::new(
        &provider,
        Box::new(DirectoryPackageSource::new(source_dir)),
    );

    let missing_count = provider.missing_manifests().len() as u64;
    let bar = (missing_count > 0).then(|| start_repair_progress(missing_count));
    let outcome = healer.ensure_manifests_healthy(HealthFailureMode::Repair, &CancelToken::new());
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    match outcome? {
        HealthOutcome::Healthy => print_status("repair:", "all manifests are present"),
        HealthOutcome::Repaired { installed } => {
            for (id, version) in &installed {
                println!("installed {id} {}", version.version);
            }
            print_status("repair:", &format!("{} manifests installed", installed.len()));
        }
        HealthOutcome::AlreadyChecked | HealthOutcome::Ignored { .. } => {}
    }
    Ok(())
}

fn run_history(context: &CommandContext) -> Result<()> {
    let ledger = HistoryLedger::new(context.layout.clone(), context.sdk_band);
    let records = ledger.read_all()?;
    let (display, gaps) = process_history(&records);

    if display.is_empty() {
        print_status("history:", "no workload operations recorded");
        return Ok(());
    }
    for record in &display {
        println!("{}", format_history_row(record));
    }
    if gaps {
        print_warning("history contains changes made outside recorded operations");
    }
    Ok(())
}

fn format_history_row(record: &DisplayRecord) -> String {
    let state = match &record.state.workload_set_version {
        Some(version) => format!("set {version}"),
        None => format!("{} loose manifests", record.state.manifests.len()),
    };
    format!(
        "{:>3}  {:>12}  {:<24} {state}",
        record.id, record.time_started, record.command_name
    )
}

fn run_pins(context: &CommandContext) -> Result<()> {
    let registry = GlobalJsonPinRegistry::new(context.layout.clone(), context.sdk_band);
    let pins = registry.live_pins()?;
    if pins.is_empty() {
        print_status("pins:", "no live global.json pins");
        return Ok(());
    }
    for (path, version) in &pins {
        println!("{} -> {version}", path.display());
    }
    Ok(())
}

fn run_config(context: &CommandContext, update_mode: UpdateMode) -> Result<()> {
    let store = InstallStateStore::new(context.layout.clone());
    let state = store.update(context.sdk_band, |state| {
        state.use_workload_sets = Some(update_mode == UpdateMode::WorkloadSets);
    })?;

    let description = match state.mode() {
        WorkloadSetMode::UseLooseManifests => "loose manifests",
        WorkloadSetMode::UseWorkloadSets | WorkloadSetMode::Unset => "workload sets",
    };
    print_status("config:", &format!("update mode set to {description}"));
    Ok(())
}
