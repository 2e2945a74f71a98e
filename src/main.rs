use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mpr_sync::{
    HeadlessViewport, HeadlessVolumeView, Orientation, PresetLibrary, SortBy, SyncCoordinator,
    ViewerConfig, ViewportIndex, VolumeLoad, VolumeLoader,
    http::UreqTransport,
    label_api::{LabelListClient, LabelListStore},
};

#[derive(Clone, ValueEnum)]
enum SortArg {
    Position,
    Table,
    Instance,
    None,
}

impl From<SortArg> for SortBy {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Position => SortBy::ImagePositionPatient,
            SortArg::Table => SortBy::TablePosition,
            SortArg::Instance => SortBy::InstanceNumber,
            SortArg::None => SortBy::None,
        }
    }
}

#[derive(Parser)]
#[command(name = "mpr-sync", about = "Load a DICOM series into synced MPR viewports")]
#[command(version)]
struct Cli {
    /// Directory containing the series' .dcm files
    dicom_dir: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Slice ordering
    #[arg(long, value_enum, default_value = "instance")]
    sort: SortArg,

    /// Slab thickness slider value, in tenths of a millimetre
    #[arg(long, default_value = "50")]
    slab: f64,

    /// Transfer function preset for the volume-render view
    #[arg(long)]
    preset: Option<String>,

    /// Directory the rendered viewports are written to
    #[arg(short, long, default_value = "mpr-output")]
    output: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ViewerConfig::load(cli.config.as_deref())?;
    let pending = VolumeLoader::prepare_from_directory(&cli.dicom_dir, cli.sort.into())
        .with_context(|| format!("reading {}", cli.dicom_dir.display()))?;

    let coordinator = SyncCoordinator::new(&config.sync, PresetLibrary::builtin());
    coordinator.register_volume_view(Arc::new(HeadlessVolumeView::new()));

    // Viewports come up in whatever order their windows mount.
    let orientations = [Orientation::Axial, Orientation::Sagittal, Orientation::Coronal];
    let viewports = orientations.map(|orientation| {
        (
            ViewportIndex::from(orientation),
            Arc::new(HeadlessViewport::new(orientation, pending.volume())),
        )
    });
    for (index, viewport) in &viewports {
        let status = coordinator.register(*index, viewport.clone())?;
        info!(%index, ?status, "Viewport registered");
    }

    let report = VolumeLoad::new(config.load.options())
        .run(pending.into_insertions(), &coordinator)
        .await?;
    info!(
        frames = report.frames,
        renders = report.renders,
        elapsed = ?report.elapsed,
        "Series loaded"
    );

    coordinator.set_slab_thickness(cli.slab);
    if let Some(preset) = &cli.preset {
        coordinator.set_preset(preset)?;
    }

    fs::create_dir_all(&cli.output)?;
    for (_, viewport) in &viewports {
        let name = format!("{:?}", viewport.orientation()).to_lowercase();
        match viewport.last_frame() {
            Some(frame) => {
                let path = cli.output.join(format!("{name}.png"));
                frame.save(&path)?;
                info!(path = %path.display(), "Viewport written");
            }
            None => warn!(viewport = %name, "Nothing rendered"),
        }
    }

    if !config.pacs.host.is_empty() {
        let transport = Arc::new(UreqTransport::new(Duration::from_secs(
            config.http.timeout_secs,
        )));
        let mut labels = LabelListStore::new(LabelListClient::new(transport, config.pacs.clone()));
        match labels.refresh().await {
            Ok(list) => info!(count = list.len(), "Labels available"),
            Err(err) => warn!(%err, "Label list unavailable"),
        }
    }

    Ok(())
}
