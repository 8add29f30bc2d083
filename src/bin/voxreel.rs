use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "voxreel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a narrated MP4 from a render request (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Print the script segmentation for a given slot count.
    Segment(SegmentArgs),
    /// Synthesize a standalone voice preview clip.
    Preview(PreviewArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input render request JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Storage root; `uploads/`, `outputs/` and `tmp/` live under it.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Override the request's language code.
    #[arg(long)]
    language: Option<String>,

    /// Override the request's quality tier (e.g. `standard`, `full-hd`, `4k`).
    #[arg(long)]
    quality: Option<String>,

    /// Use a named background music preset from `uploads/music/`.
    #[arg(long)]
    music: Option<String>,

    /// Voice model mapping, `lang=path/to/model.onnx`. Repeatable.
    #[arg(long = "piper-model")]
    piper_model: Vec<String>,

    /// Synthesis command to spawn (default `piper`).
    #[arg(long)]
    piper_command: Option<String>,
}

#[derive(Parser, Debug)]
struct SegmentArgs {
    /// Script text to segment.
    #[arg(long)]
    script: String,

    /// Number of character slots.
    #[arg(long, default_value_t = 1)]
    slots: usize,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Text to synthesize.
    #[arg(long)]
    text: String,

    /// Language code (defaults to the configured default).
    #[arg(long)]
    language: Option<String>,

    /// Storage root; `uploads/`, `outputs/` and `tmp/` live under it.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Voice model mapping, `lang=path/to/model.onnx`. Repeatable.
    #[arg(long = "piper-model")]
    piper_model: Vec<String>,

    /// Synthesis command to spawn (default `piper`).
    #[arg(long)]
    piper_command: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Segment(args) => cmd_segment(args),
        Command::Preview(args) => cmd_preview(args),
    }
}

fn read_request_json(path: &Path) -> anyhow::Result<voxreel::RenderRequest> {
    let f = File::open(path).with_context(|| format!("open request '{}'", path.display()))?;
    let r = BufReader::new(f);
    let request: voxreel::RenderRequest =
        serde_json::from_reader(r).with_context(|| "parse render request JSON")?;
    Ok(request)
}

fn make_synthesizer(
    models: &[String],
    command: Option<String>,
) -> anyhow::Result<voxreel::PiperSynthesizer> {
    let mut map = BTreeMap::new();
    for entry in models {
        let (lang, path) = entry
            .split_once('=')
            .with_context(|| format!("expected 'lang=path' in piper model '{entry}'"))?;
        map.insert(lang.to_string(), PathBuf::from(path));
    }
    let mut synth = voxreel::PiperSynthesizer::new(map);
    if let Some(command) = command {
        synth = synth.with_command(command);
    }
    Ok(synth)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let cfg = voxreel::PipelineConfig::rooted(&args.root);
    let store = voxreel::MediaStore::open(&cfg)?;
    let mut request = read_request_json(&args.in_path)?;

    if let Some(language) = args.language {
        request.language = Some(language);
    }
    if let Some(quality) = &args.quality {
        request.quality = voxreel::QualityTier::from_name(quality);
    }
    if let Some(name) = &args.music {
        match store.music_preset(name) {
            Some(media) => request.background_audio = Some(media),
            None => eprintln!("unknown music preset '{name}', continuing without background audio"),
        }
    }

    let synth = make_synthesizer(&args.piper_model, args.piper_command)?;
    let pipeline = voxreel::RenderPipeline::new(&cfg, &store, &synth);
    let jobs = voxreel::InMemoryJobStore::new();

    let job = pipeline.run(request, &jobs, &voxreel::CancelToken::new())?;
    match job.status {
        voxreel::JobStatus::Done => {
            if let Some(output) = &job.output {
                eprintln!("wrote {}", store.output_path(output).display());
            }
            Ok(())
        }
        _ => anyhow::bail!(
            "render failed: {}",
            job.failure.as_deref().unwrap_or("unknown failure")
        ),
    }
}

fn cmd_segment(args: SegmentArgs) -> anyhow::Result<()> {
    if args.slots == 0 {
        anyhow::bail!("--slots must be >= 1");
    }
    for segment in voxreel::script::segment_script(&args.script, args.slots) {
        println!("{segment}");
    }
    Ok(())
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let cfg = voxreel::PipelineConfig::rooted(&args.root);
    let store = voxreel::MediaStore::open(&cfg)?;
    let synth = make_synthesizer(&args.piper_model, args.piper_command)?;
    let pipeline = voxreel::RenderPipeline::new(&cfg, &store, &synth);

    let media = pipeline.preview_voice(&args.text, args.language.as_deref())?;
    eprintln!("wrote {}", store.upload_path(&media).display());
    Ok(())
}
