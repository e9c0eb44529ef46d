use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::{AnalysisReport, AnnotationBox, PayslipData};
use pdf_engine::{ContentRasterizer, Document};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use viewer_core::{PageStatus, Viewer, ViewerConfig};

#[derive(Debug, Parser)]
#[command(name = "slipview")]
#[command(about = "Payslip viewer harness: page geometry and highlight placement")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable page geometry.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render every page and print per-page status and highlight rectangles.
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Analysis report (JSON) whose anomaly references are highlighted.
        #[arg(long, value_name = "JSON")]
        analysis: Option<PathBuf>,
        /// 1-based anomaly to highlight; defaults to the first.
        #[arg(long, value_name = "N")]
        anomaly: Option<usize>,
        #[arg(long)]
        scale: Option<f64>,
        #[arg(long, value_name = "TOML")]
        config: Option<PathBuf>,
    },
    /// Render one page with its highlights to a PNG file.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// 1-based page to render.
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, short, value_name = "PNG")]
        output: PathBuf,
        #[arg(long, value_name = "JSON")]
        analysis: Option<PathBuf>,
        #[arg(long, value_name = "N")]
        anomaly: Option<usize>,
        #[arg(long)]
        scale: Option<f64>,
        #[arg(long, value_name = "TOML")]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageInfo>,
}

#[derive(Debug, Serialize)]
struct PageInfo {
    page: u32,
    width_pt: f64,
    height_pt: f64,
    rotation: u16,
}

#[derive(Debug, Serialize)]
struct InspectOutput {
    scale: f64,
    dropped_annotations: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extracted: Vec<ExtractedOutput>,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct ExtractedOutput {
    field: &'static str,
    value: Option<f64>,
    raw_text: Option<String>,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct RenderOutput {
    page: u32,
    output: String,
    width_px: u32,
    height_px: u32,
    highlights: usize,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    page: u32,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    width_px: u32,
    height_px: u32,
    highlights: Vec<HighlightOutput>,
}

#[derive(Debug, Serialize)]
struct HighlightOutput {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    label: String,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Inspect { file, analysis, anomaly, scale, config } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start runtime")?;

            let options = ViewerOptions { analysis, anomaly, scale, config };
            runtime.block_on(run_inspect(&file, &options))
        }
        Commands::Render { file, page, output, analysis, anomaly, scale, config } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start runtime")?;

            let options = ViewerOptions { analysis, anomaly, scale, config };
            runtime.block_on(run_render(&file, page, &output, &options))
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    let bytes = read_pdf(file)?;
    let document = Document::open(&bytes).context("failed to open PDF")?;

    let pages = document
        .pages()
        .map(|page| PageInfo {
            page: page.index(),
            width_pt: page.width(),
            height_pt: page.height(),
            rotation: page.rotation().degrees(),
        })
        .collect();

    let payload =
        InfoOutput { path: file.display().to_string(), page_count: document.page_count(), pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

/// Flags shared by the commands that drive the viewer.
struct ViewerOptions {
    analysis: Option<PathBuf>,
    anomaly: Option<usize>,
    scale: Option<f64>,
    config: Option<PathBuf>,
}

struct OpenedViewer {
    viewer: Viewer<ContentRasterizer>,
    dropped_annotations: usize,
    extracted: PayslipData,
}

async fn open_viewer(file: &Path, options: &ViewerOptions) -> Result<OpenedViewer> {
    let config = match &options.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    let config = config.with_env_overrides()?;

    let (annotations, extracted) = match &options.analysis {
        Some(path) => {
            let report = load_report(path)?;
            let annotations = select_highlights(&report, options.anomaly)?;
            (annotations, report.extracted_data)
        }
        None => (Vec::new(), PayslipData::default()),
    };

    let bytes = read_pdf(file)?;
    let mut viewer = Viewer::with_config(config);
    if let Some(scale) = options.scale {
        viewer.set_scale(scale)?;
    }

    viewer.open(bytes).await.context("failed to open PDF")?;
    let dropped_annotations = viewer.set_annotations(annotations);

    Ok(OpenedViewer { viewer, dropped_annotations, extracted })
}

async fn run_inspect(file: &Path, options: &ViewerOptions) -> Result<()> {
    let OpenedViewer { mut viewer, dropped_annotations, extracted } =
        open_viewer(file, options).await?;

    viewer.request_all()?;
    for update in viewer.settle().await {
        log::debug!("page {} is {}", update.page, update.status.as_str());
    }

    let state = viewer.state();
    let pages = state
        .pages()
        .map(|page| PageOutput {
            page: page.index,
            status: page.status.as_str(),
            error: match page.status {
                PageStatus::Failed(err) => Some(err.to_string()),
                _ => None,
            },
            width_px: page.viewport.pixel_width(),
            height_px: page.viewport.pixel_height(),
            highlights: page
                .overlays()
                .iter()
                .map(|highlight| HighlightOutput {
                    left: highlight.rect.left,
                    top: highlight.rect.top,
                    width: highlight.rect.width,
                    height: highlight.rect.height,
                    label: highlight.label.to_owned(),
                })
                .collect(),
        })
        .collect();

    let extracted = extracted
        .fields()
        .into_iter()
        .filter_map(|(field, value)| {
            value.map(|value| ExtractedOutput {
                field,
                value: value.value,
                raw_text: value.raw_text.clone(),
                confidence: value.confidence,
            })
        })
        .collect();

    let payload = InspectOutput { scale: state.scale(), dropped_annotations, extracted, pages };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

async fn run_render(file: &Path, page: u32, output: &Path, options: &ViewerOptions) -> Result<()> {
    let OpenedViewer { mut viewer, .. } = open_viewer(file, options).await?;

    viewer.request(page)?;
    viewer.settle().await;

    let state = viewer.state();
    let view = state.page(page)?;
    if let PageStatus::Failed(err) = view.status {
        anyhow::bail!("page {page} failed to render: {err}");
    }

    let image = state
        .composited(page)?
        .with_context(|| format!("page {page} produced no frame"))?;
    image.save(output).with_context(|| format!("failed to write {}", output.display()))?;

    let payload = RenderOutput {
        page,
        output: output.display().to_string(),
        width_px: image.width(),
        height_px: image.height(),
        highlights: view.overlays().iter().count(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn load_report(path: &Path) -> Result<AnalysisReport> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read analysis {}", path.display()))?;
    Ok(AnalysisReport::from_json(&json)?)
}

fn select_highlights(report: &AnalysisReport, anomaly: Option<usize>) -> Result<Vec<AnnotationBox>> {
    let selected = match anomaly {
        Some(0) => anyhow::bail!("--anomaly is 1-based and must be >= 1"),
        Some(number) => {
            if number > report.anomalies.len() {
                anyhow::bail!(
                    "--anomaly {number} is out of range (report has {} anomalies)",
                    report.anomalies.len()
                );
            }
            Some(number - 1)
        }
        None => None,
    };

    Ok(report.selected_highlights(selected))
}

fn read_pdf(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}
