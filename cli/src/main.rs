use clap::{Parser, ValueEnum};
use std::error::Error;
use std::path::PathBuf;

use field_locator::{
    DocumentSource, DocumentViewportController, ExtractedField, FieldLocationResolver, Phase,
    PdfTextLayer, PdfTextLayerFactory, ScrollContainer, TextLayer, ZoomConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One line per highlight
    Plain,
    /// Full highlight records plus resolver state
    Debug,
    /// One SVG overlay per page with highlights
    Svg,
}

#[derive(Parser)]
#[command(name = "field-locator")]
#[command(about = "Locate extracted contract fields on PDF pages", long_about = None)]
struct Args {
    /// PDF file the fields were extracted from
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// JSON array of extracted fields
    #[arg(long, value_name = "JSON")]
    fields: PathBuf,

    /// Password for encrypted PDFs
    #[arg(short, long)]
    password: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,

    /// Overlay scale for SVG output (0.5 to 3.0)
    #[arg(long, default_value_t = 1.0)]
    scale: f64,
}

/// Nothing to scroll when printing overlays.
struct Detached;

impl ScrollContainer for Detached {
    fn scroll_to_page(&mut self, _page: u32) {}
}

async fn run(args: Args) -> Result<bool, Box<dyn Error>> {
    let fields: Vec<ExtractedField> = serde_json::from_slice(&std::fs::read(&args.fields)?)?;
    let document = DocumentSource::from_path(&args.file)?;

    let builder = match args.password {
        Some(password) => PdfTextLayer::builder().password(password),
        None => PdfTextLayer::builder(),
    };

    let mut resolver = FieldLocationResolver::new(PdfTextLayerFactory::new(builder.clone()));
    resolver.resolve(Some(document.clone()), fields);
    let state = resolver.settled().await;
    if let Some(error) = &state.error {
        eprintln!("Error resolving fields in {:?}: {}", args.file, error);
    }

    match args.format {
        OutputFormat::Plain => {
            for highlight in &state.highlights {
                println!(
                    "{}\tpage {}\t{}\t{}",
                    highlight.field_name, highlight.page, highlight.bbox, highlight.color
                );
            }
        }
        OutputFormat::Debug => {
            println!("Phase: {:?} (pass {})", state.phase, state.generation);
            if let Some(error) = &state.error {
                println!("Error: {:?}", error);
            }
            println!("{}", serde_json::to_string_pretty(&state.highlights)?);
        }
        OutputFormat::Svg => {
            if state.phase == Phase::Failed {
                return Ok(false);
            }
            // Passes that only echo cached boxes never open the document.
            let page_sizes = if state.page_sizes.is_empty() {
                let mut layer = builder.build();
                layer.load(&document).await?;
                let page_sizes = layer.page_sizes()?;
                layer.destroy();
                page_sizes
            } else {
                Vec::new()
            };

            let zoom = ZoomConfig::default().with_default(args.scale);
            let mut controller =
                DocumentViewportController::new(Detached, page_sizes).with_zoom_config(zoom);
            controller.apply_resolver_state(&state);
            for (page, overlay) in controller.overlays() {
                println!("<!-- page {} -->", page);
                print!("{}", overlay.to_svg());
            }
        }
    }

    Ok(state.phase != Phase::Failed)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
