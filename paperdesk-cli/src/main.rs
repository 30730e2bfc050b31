use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use paperdesk_core::{
    Highlight, OpenRequest, PageRect, PaperService, SessionController,
};
use paperdesk_render::PdfiumRenderService;
use paperdesk_store::{FsPaperStore, NullPicker};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "paperdesk",
    version,
    about = "local paper library with highlights and citation links"
)]
struct Args {
    /// Directory holding the PDFs, sidecars and papers_index.json
    #[arg(long = "papers-dir")]
    papers_dir: Option<PathBuf>,

    /// Viewer width used to compute the page fit scale
    #[arg(long, default_value_t = 1200.0)]
    width: f32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the local papers with their graph and memo badges
    Papers,
    /// Open a paper and print its session summary
    Show { path: PathBuf },
    /// Show a paper's cites / cited-by panel
    Refs { path: PathBuf },
    /// List a paper's highlights
    Memos { path: PathBuf },
    /// Add a highlight to a paper
    Mark {
        path: PathBuf,
        /// 1-based page number
        #[arg(long)]
        page: u32,
        /// Highlighted text
        #[arg(long)]
        text: String,
        /// Rectangle in native page units, as top,left,width,height
        #[arg(long)]
        rect: String,
    },
    /// Delete a highlight by its timestamp
    Unmark { path: PathBuf, timestamp: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "paperdesk", "paperdesk")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let papers_dir = args
        .papers_dir
        .unwrap_or_else(|| project_dirs.data_local_dir().join("papers"));
    let store = Arc::new(FsPaperStore::new(papers_dir, Box::new(NullPicker))?);
    info!(papers_dir = %store.papers_dir().display(), "using papers directory");

    match args.command {
        Command::Papers => papers(store).await,
        Command::Show { path } => show(store, args.width, path).await,
        Command::Refs { path } => refs(store, args.width, path).await,
        Command::Memos { path } => memos(store, path).await,
        Command::Mark {
            path,
            page,
            text,
            rect,
        } => mark(store, path, page, text, &rect).await,
        Command::Unmark { path, timestamp } => unmark(store, path, &timestamp).await,
    }
}

async fn papers(store: Arc<FsPaperStore>) -> Result<()> {
    let papers = store.get_local_papers().await?;
    if papers.is_empty() {
        println!("no papers indexed");
        return Ok(());
    }
    for paper in papers {
        println!(
            "{:<40} {:<30} {:>4}  links:{:<3} memos:{}",
            truncate(&paper.title, 40),
            truncate(&paper.authors, 30),
            paper.year,
            paper.link_count(),
            paper.memos_count
        );
    }
    Ok(())
}

async fn open_session(
    store: Arc<FsPaperStore>,
    width: f32,
    path: PathBuf,
) -> Result<SessionController> {
    let provider = Arc::new(PdfiumRenderService::new()?);
    let mut controller = SessionController::new(store, provider, width);
    controller.refresh_papers().await?;
    if !controller.open(OpenRequest::Path(path.clone())).await? {
        bail!("failed to open {:?}", path);
    }
    controller.render_all()?;
    Ok(controller)
}

async fn show(store: Arc<FsPaperStore>, width: f32, path: PathBuf) -> Result<()> {
    let controller = open_session(store, width, path).await?;
    let session = controller
        .session()
        .ok_or_else(|| anyhow!("no session after open"))?;
    println!("{}", session.filename);
    println!("  pages:      {}", session.surfaces.len());
    println!("  references: {}", session.bibliography.len());
    println!("  highlights: {}", session.highlights.len());
    if let Some(surface) = session.surfaces.first() {
        println!(
            "  fit scale:  {:.2} ({}x{} px)",
            surface.scale, surface.width as u32, surface.height as u32
        );
    }
    Ok(())
}

async fn refs(store: Arc<FsPaperStore>, width: f32, path: PathBuf) -> Result<()> {
    let controller = open_session(store, width, path).await?;
    let panel = controller.reference_panel();
    if !panel.visible {
        println!("no citation links for this paper");
        return Ok(());
    }
    println!("cites:");
    for node in &panel.cites {
        println!("  {}{}", node.label(), marker(node.is_navigable()));
    }
    println!("cited by:");
    for node in &panel.cited_by {
        println!("  {}{}", node.label(), marker(node.is_navigable()));
    }
    Ok(())
}

fn marker(navigable: bool) -> &'static str {
    if navigable {
        " [local]"
    } else {
        ""
    }
}

async fn memos(store: Arc<FsPaperStore>, path: PathBuf) -> Result<()> {
    let payload = store.open_specific_pdf(&path).await?;
    if payload.sidecar.highlights.is_empty() {
        println!("no highlights");
        return Ok(());
    }
    for highlight in &payload.sidecar.highlights {
        println!(
            "{}  p.{}  {}",
            highlight.timestamp,
            highlight.page,
            truncate(&highlight.text, 60)
        );
    }
    Ok(())
}

async fn mark(
    store: Arc<FsPaperStore>,
    path: PathBuf,
    page: u32,
    text: String,
    rect: &str,
) -> Result<()> {
    let rect = parse_rect(rect)?;
    let highlight = Highlight::new(text, page, rect, paperdesk_core::view::HIGHLIGHT_COLOR);
    store.save_highlight(&path, &highlight).await?;
    println!("saved {}", highlight.timestamp);
    Ok(())
}

async fn unmark(store: Arc<FsPaperStore>, path: PathBuf, timestamp: &str) -> Result<()> {
    store.delete_highlight(&path, timestamp).await?;
    println!("deleted {timestamp}");
    Ok(())
}

fn parse_rect(raw: &str) -> Result<PageRect> {
    let parts: Vec<f32> = raw
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid rect {raw:?}, expected top,left,width,height"))?;
    let [top, left, width, height] = parts[..] else {
        bail!("invalid rect {raw:?}, expected four comma-separated numbers");
    };
    let rect = PageRect::new(top, left, width, height);
    if !rect.is_valid() {
        bail!("rect {raw:?} has negative or non-finite dimensions");
    }
    Ok(rect)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_owned()
    } else {
        let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "paperdesk.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_parses_four_components() {
        let rect = parse_rect("10, 20, 100, 14.5").unwrap();
        assert_eq!(rect.top, 10.0);
        assert_eq!(rect.left, 20.0);
        assert_eq!(rect.width, 100.0);
        assert_eq!(rect.height, 14.5);

        assert!(parse_rect("10,20,100").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
        assert!(parse_rect("0,0,-5,5").is_err());
    }

    #[test]
    fn truncation_is_char_aware() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer title here", 10), "a longer …");
    }
}
