use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use refit::{
    Canvas, DocumentLoader as _, FsOutputStore, GeminiConfig, GeminiOracle, LayoutOracle,
    LayoutPipeline, LayoutResult, ManifestLoader, OutputStore as _, PipelineConfig, RefitError,
    ReplayOracle,
};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser, Debug)]
#[command(name = "refit", version, about = "Adapt layered designs to new canvas sizes")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the flattened layer table and optionally write the detection image.
    Inspect(InspectArgs),
    /// Print the instruction text that would be sent to the oracle.
    Prompt(PromptArgs),
    /// Apply a saved oracle reply (raw text or JSON) without calling the network.
    Apply(ApplyArgs),
    /// Ask Gemini for a layout and apply it.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Input document manifest JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Target canvas width in pixels.
    #[arg(long)]
    width: u32,

    /// Target canvas height in pixels.
    #[arg(long)]
    height: u32,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output PNG path.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Also store `<id>.png` and `<id>_metadata.json` in this directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Write the full run report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Write the detection PNG here.
    #[arg(long)]
    detection: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PromptArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    target: TargetArgs,

    /// File holding the oracle reply.
    #[arg(long)]
    proposal: PathBuf,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    target: TargetArgs,

    /// Gemini API key (falls back to `GEMINI_API_KEY`).
    #[arg(long)]
    api_key: Option<String>,

    /// Gemini model id.
    #[arg(long)]
    model: Option<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Inspect(args) => cmd_inspect(args),
        Command::Prompt(args) => cmd_prompt(args),
        Command::Apply(args) => cmd_apply(args).await,
        Command::Run(args) => cmd_run(args).await,
    }
}

fn load(input: &InputArgs) -> anyhow::Result<refit::LoadedDocument> {
    ManifestLoader::new()
        .open_path(&input.in_path)
        .with_context(|| format!("load document '{}'", input.in_path.display()))
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let doc = load(&args.input)?;
    let ex = refit::flatten(&doc)?;
    println!(
        "{}x{}, {} layers",
        ex.snapshot.width,
        ex.snapshot.height,
        ex.snapshot.layers.len()
    );
    print!("{}", refit::prompt::format_layer_table(&ex.snapshot.layers));

    if let Some(path) = args.detection {
        let det = refit::render_detection(&ex.snapshot, &ex.bitmaps, &Default::default())?;
        write_file(&path, &det.png)?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

fn cmd_prompt(args: PromptArgs) -> anyhow::Result<()> {
    let doc = load(&args.input)?;
    let target = Canvas::new(args.target.width, args.target.height)?;
    let ex = refit::flatten(&doc)?;
    print!("{}", refit::build_layout_prompt(&ex.snapshot, target));
    Ok(())
}

async fn cmd_apply(args: ApplyArgs) -> anyhow::Result<()> {
    let reply = std::fs::read_to_string(&args.proposal)
        .with_context(|| format!("read proposal '{}'", args.proposal.display()))?;
    let oracle = Arc::new(ReplayOracle::new(reply));
    run_pipeline(oracle, &args.input, &args.target, &args.output).await
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match args.api_key {
        Some(key) => GeminiConfig::new(key),
        None => GeminiConfig::from_env()?,
    };
    if let Some(model) = args.model {
        config.model = model;
    }
    let oracle = Arc::new(GeminiOracle::new(config)?);
    run_pipeline(oracle, &args.input, &args.target, &args.output).await
}

async fn run_pipeline(
    oracle: Arc<dyn LayoutOracle>,
    input: &InputArgs,
    target: &TargetArgs,
    output: &OutputArgs,
) -> anyhow::Result<()> {
    if output.out.is_none() && output.out_dir.is_none() {
        anyhow::bail!("nothing to write: pass --out and/or --out-dir");
    }

    let doc = load(input)?;
    let config =
        PipelineConfig::new(Canvas::new(target.width, target.height)?).with_env_overrides();
    let pipeline = LayoutPipeline::new(oracle, config)?;

    let result = match pipeline.run(doc).await {
        Ok(result) => result,
        Err(RefitError::Validation(err)) => {
            let path = raw_reply_path(output);
            write_file(&path, err.raw_response().as_bytes())?;
            eprintln!("oracle reply saved to {}", path.display());
            return Err(RefitError::Validation(err).into());
        }
        Err(err) => return Err(err.into()),
    };

    write_outputs(&result, output)
}

fn write_outputs(result: &LayoutResult, output: &OutputArgs) -> anyhow::Result<()> {
    for w in &result.report.warnings {
        tracing::warn!(layer = w.layer_id, kind = ?w.kind, "{}", w.message);
    }

    let png = result.encode_png()?;
    if let Some(out) = &output.out {
        write_file(out, &png)?;
        eprintln!("wrote {}", out.display());
    }
    if let Some(dir) = &output.out_dir {
        let id = FsOutputStore::new(dir).store(&png, &result.metadata())?;
        eprintln!("stored {id} in {}", dir.display());
    }
    if let Some(path) = &output.report {
        let json = serde_json::to_vec_pretty(&result.report).context("serialize report")?;
        write_file(path, &json)?;
    }
    Ok(())
}

fn raw_reply_path(output: &OutputArgs) -> PathBuf {
    match (&output.out, &output.out_dir) {
        (Some(out), _) => {
            let mut name = out.as_os_str().to_owned();
            name.push(".oracle_response.txt");
            PathBuf::from(name)
        }
        (None, Some(dir)) => dir.join("oracle_response.txt"),
        (None, None) => PathBuf::from("oracle_response.txt"),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write '{}'", path.display()))
}
