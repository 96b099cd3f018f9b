use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use signed_render::config::RenderConfig;
use signed_render::model::Object;
use signed_render::pipeline::RenderPipeline;

#[derive(Parser, Debug)]
#[command(name = "signed-cli")]
#[command(about = "Render a graph script to a PNG image")]
struct Args {
    /// Graph script to render
    script: PathBuf,

    /// Output image
    #[arg(short, long, default_value = "out.png")]
    output: PathBuf,

    /// JSON render configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON object file whose command stack is rendered
    #[arg(short, long)]
    model: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Number of sample passes
    #[arg(short, long)]
    samples: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => RenderConfig::default(),
    };
    if let Some(w) = args.width {
        config.width = w;
    }
    if let Some(h) = args.height {
        config.height = h;
    }
    if let Some(s) = args.samples {
        config.main_samples = s;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let source = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;
    let mut pipeline = RenderPipeline::cpu(config);
    pipeline
        .compile(&source)
        .with_context(|| format!("compiling {}", args.script.display()))?;
    if let Some(path) = &args.model {
        let object = Object::load(path).with_context(|| format!("loading {}", path.display()))?;
        log::info!("model `{}` with {} commands", object.name, object.commands.len());
        pipeline.set_objects(&[object]);
    }

    let start = Instant::now();
    let passes = pipeline.run()?;
    log::info!(
        "rendered {} passes in {:.2}s",
        passes,
        start.elapsed().as_secs_f64()
    );
    pipeline
        .film()
        .write_png(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!("wrote {}", args.output.display());
    Ok(())
}
