use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framescrub::{
    CancellationToken, ExtractionConfig, FfmpegDecoder, FfprobeResolver, FrameExtractor,
    FrameServer, FrameStore, OriginPolicy, OutputResolution, PixelFormat, ProgressCallback,
    ProgressInfo, ServerConfig, StreamResolver,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framescrub serve input.mp4 --bind 0.0.0.0:8080 --progress\n  framescrub probe input.mp4 --json\n  framescrub export-frame input.mp4 --frame 120 --out frame.png\n  framescrub completions zsh > _framescrub";

#[derive(Debug, Parser)]
#[command(
    name = "framescrub",
    version,
    about = "Decode a video into memory and serve its frames over WebSocket",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output (RUST_LOG overrides).
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress spinner while decoding.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// ffmpeg executable used for decoding.
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe executable used for probing.
    #[arg(long, global = true, default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Decoder log level passed to ffmpeg -loglevel.
    #[arg(long, global = true, default_value = "error")]
    log_level: String,

    /// Raw pixel format (yuv422p, yuv444p, rgb24, gray).
    #[arg(long, global = true, default_value = "yuv422p")]
    pixel_format: String,

    /// Scale frames to WIDTHxHEIGHT instead of the source size.
    #[arg(long, global = true, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Probe with the linked FFmpeg libraries instead of ffprobe.
    #[cfg(feature = "libav")]
    #[arg(long, global = true)]
    libav: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode a video and serve its frames.
    #[command(
        about = "Serve frames over WebSocket",
        after_help = "Examples:\n  framescrub serve input.mp4\n  framescrub serve input.mp4 --bind 0.0.0.0:9000 --path /frames --allow-origin http://localhost:3000"
    )]
    Serve {
        /// Input media path.
        input: PathBuf,

        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Request path upgraded to a WebSocket.
        #[arg(long, default_value = "/websocket")]
        path: String,

        /// Accept only these Origin values (repeatable). Any origin is
        /// accepted when omitted.
        #[arg(long = "allow-origin")]
        allow_origin: Vec<String>,
    },

    /// Print the video streams of a media file.
    #[command(
        about = "Print video stream information",
        visible_alias = "info",
        after_help = "Examples:\n  framescrub probe input.mp4\n  framescrub probe input.mp4 --json"
    )]
    Probe {
        /// Input media path.
        input: PathBuf,

        /// Output stream information as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Decode a video and write one frame as PNG.
    #[command(
        about = "Export one decoded frame as PNG",
        after_help = "Examples:\n  framescrub export-frame input.mp4 --out frame.png\n  framescrub export-frame input.mp4 --frame 42 --out frame_42.png --overwrite"
    )]
    ExportFrame {
        /// Input media path.
        input: PathBuf,

        /// Zero-based frame index.
        #[arg(long, default_value_t = 0)]
        frame: i64,

        /// Output PNG path.
        #[arg(long)]
        out: PathBuf,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size {value:?}, expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .parse()
        .map_err(|_| format!("invalid width in {value:?}"))?;
    let height: u32 = height
        .parse()
        .map_err(|_| format!("invalid height in {value:?}"))?;
    if width == 0 || height == 0 {
        return Err(format!("size must be non-zero, got {value:?}"));
    }
    Ok((width, height))
}

fn init_logging(global: &GlobalOptions) {
    let default_filter = if global.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn resolver(global: &GlobalOptions) -> Box<dyn StreamResolver> {
    #[cfg(feature = "libav")]
    if global.libav {
        return Box::new(framescrub::LibavResolver);
    }
    Box::new(FfprobeResolver::new().with_program(&global.ffprobe))
}

fn extractor(
    global: &GlobalOptions,
    cancellation: Option<CancellationToken>,
) -> Result<(FrameExtractor, Option<ProgressBar>), Box<dyn std::error::Error>> {
    let pixel_format = PixelFormat::from_name(&global.pixel_format)
        .ok_or(format!("unsupported --pixel-format: {}", global.pixel_format))?;
    let resolution = match global.size {
        Some((width, height)) => OutputResolution::Fixed { width, height },
        None => OutputResolution::Source,
    };

    let mut config = ExtractionConfig::new()
        .with_pixel_format(pixel_format)
        .with_resolution(resolution)
        .with_batch_size(10);
    if let Some(token) = cancellation {
        config = config.with_cancellation(token);
    }

    let spinner = if global.progress {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} frames decoded {msg}",
        )?);
        spinner.enable_steady_tick(Duration::from_millis(100));
        config = config.with_progress(Arc::new(TerminalProgress::new(spinner.clone())));
        Some(spinner)
    } else {
        None
    };

    let decoder = FfmpegDecoder::new()
        .with_program(&global.ffmpeg)
        .with_log_level(global.log_level.clone());

    Ok((FrameExtractor::new(decoder).with_config(config), spinner))
}

fn load(
    global: &GlobalOptions,
    input: &Path,
    cancellation: Option<CancellationToken>,
) -> Result<FrameStore, Box<dyn std::error::Error>> {
    let (extractor, spinner) = extractor(global, cancellation)?;
    let result = extractor.load(input, resolver(global).as_ref());
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let store = result?;

    println!(
        "{} {} frame(s) of {}x{} {} from {}",
        "decoded".green().bold(),
        store.count(),
        store.width(),
        store.height(),
        store.pixel_format(),
        input.display()
    );
    Ok(store)
}

struct TerminalProgress {
    spinner: ProgressBar,
}

impl TerminalProgress {
    fn new(spinner: ProgressBar) -> Self {
        Self { spinner }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.spinner.set_position(info.current);
        self.spinner
            .set_message(format!("({:.1} fps)", info.frames_per_second));
    }
}

async fn serve(
    global: GlobalOptions,
    input: PathBuf,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.path().to_string();
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received");
            interrupt.cancel();
        }
    });

    let extraction_token = token.clone();
    let store = tokio::task::spawn_blocking(move || {
        load(&global, &input, Some(extraction_token)).map_err(|error| error.to_string())
    })
    .await??;

    let server = FrameServer::new(Arc::new(store), config).bind().await?;
    println!(
        "{} ws://{}{} (Ctrl-C to stop)",
        "serving".green().bold(),
        server.local_addr()?,
        path,
    );

    let shutdown = token.clone();
    let summary = server
        .run_until(async move { shutdown.cancelled().await })
        .await;
    println!(
        "{} after {} connection(s)",
        "stopped".green().bold(),
        summary.connections
    );
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global);

    match cli.command {
        Commands::Serve {
            input,
            bind,
            path,
            allow_origin,
        } => {
            let origin_policy = if allow_origin.is_empty() {
                OriginPolicy::Any
            } else {
                OriginPolicy::AllowList(allow_origin)
            };
            let config = ServerConfig::new()
                .with_bind_address(bind)
                .with_path(path)
                .with_origin_policy(origin_policy);

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(cli.global, input, config))?;
        }
        Commands::Probe { input, json } => {
            let streams = resolver(&cli.global).resolve(&input)?;
            if json {
                let payload: Vec<_> = streams
                    .iter()
                    .map(|stream| {
                        json!({
                            "width": stream.width,
                            "height": stream.height,
                            "codec": stream.codec,
                            "frame_rate": stream.frame_rate.to_string(),
                            "fps": stream.frame_rate.as_f64(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else if streams.is_empty() {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("no video streams in {}", input.display()).yellow()
                );
            } else {
                for (index, stream) in streams.iter().enumerate() {
                    println!(
                        "Video #{index}: {}x{} @ {:.2} fps [{}]",
                        stream.width,
                        stream.height,
                        stream.frame_rate.as_f64(),
                        stream.codec,
                    );
                }
            }
        }
        Commands::ExportFrame { input, frame, out } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let store = load(&cli.global, &input, None)?;
            framescrub::export::save_png(store.get(frame)?, store.pixel_format(), &out)?;
            println!("{} {}", "saved".green().bold(), out.display());
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framescrub", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, parse_size};

    #[test]
    fn parse_size_formats() {
        assert_eq!(parse_size("640x360").unwrap(), (640, 360));
        assert_eq!(parse_size("1280X720").unwrap(), (1280, 720));
        assert!(parse_size("640").is_err());
        assert!(parse_size("0x360").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["framescrub", "serve", "input.mp4"]).unwrap();
        assert_eq!(cli.global.pixel_format, "yuv422p");
        match cli.command {
            Commands::Serve {
                bind,
                path,
                allow_origin,
                ..
            } => {
                assert_eq!(bind.to_string(), "127.0.0.1:8080");
                assert_eq!(path, "/websocket");
                assert!(allow_origin.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "framescrub",
            "export-frame",
            "input.mp4",
            "--out",
            "frame.png",
            "--size",
            "320x240",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.global.verbose);
        assert_eq!(cli.global.size, Some((320, 240)));
    }
}
