use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facescore_core::tips::{tips, Tip, DEFAULT_TIP_THRESHOLD};
use facescore_core::{
    AnchorCache, EngineConfig, Metric, Point, RawLandmarkSet, ScoreInput, ScoreResult, ScoringEngine,
    Topology,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facescore", about = "Score faces from detector landmarks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one landmark set
    Score {
        /// JSON array of {"x", "y"} objects or [x, y] pairs
        #[arg(short, long)]
        landmarks: PathBuf,
        /// Landmark scheme: 68 or 468
        #[arg(short, long)]
        topology: Topology,
        /// Image the landmarks were detected on (enables skin and quality signals)
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Landmarks are in 0..1 image-relative coordinates
        #[arg(long, requires = "image")]
        normalized: bool,
        /// Calibration document (overrides FACESCORE_ANCHORS_PATH)
        #[arg(long)]
        anchors: Option<PathBuf>,
        /// TOML parameter overrides (overrides FACESCORE_PARAMS_PATH)
        #[arg(long)]
        params: Option<PathBuf>,
        /// Include improvement tips
        #[arg(long)]
        tips: bool,
        /// Print unrounded values
        #[arg(long)]
        raw: bool,
    },
    /// Compare two saved score results
    Compare {
        first: PathBuf,
        second: PathBuf,
    },
    /// Show the resolved anchor table
    Anchors {
        #[arg(long)]
        anchors: Option<PathBuf>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LandmarkEntry {
    Object { x: f64, y: f64 },
    Pair([f64; 2]),
}

impl From<LandmarkEntry> for Point {
    fn from(entry: LandmarkEntry) -> Self {
        match entry {
            LandmarkEntry::Object { x, y } => Point::new(x, y),
            LandmarkEntry::Pair([x, y]) => Point::new(x, y),
        }
    }
}

#[derive(Serialize)]
struct ScoreOutput {
    #[serde(flatten)]
    result: ScoreResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    tips: Option<Vec<Tip>>,
}

fn read_landmarks(path: &Path) -> Result<Vec<Point>> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read landmarks from {}", path.display()))?;
    let entries: Vec<LandmarkEntry> = serde_json::from_str(&src)
        .with_context(|| format!("{} is not a landmark array", path.display()))?;
    Ok(entries.into_iter().map(Point::from).collect())
}

fn read_result(path: &Path) -> Result<ScoreResult> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&src).with_context(|| format!("{} is not a score result", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();

    match cli.command {
        Commands::Score {
            landmarks,
            topology,
            image: image_path,
            normalized,
            anchors,
            params,
            tips: with_tips,
            raw,
        } => {
            if anchors.is_some() {
                config.anchors_path = anchors;
            }
            if params.is_some() {
                config.params_path = params;
            }
            let engine = ScoringEngine::from_config(&config).context("invalid scoring parameters")?;

            let points = read_landmarks(&landmarks)?;
            let frame = match &image_path {
                Some(path) => Some(
                    image::open(path)
                        .with_context(|| format!("failed to open image {}", path.display()))?
                        .to_rgba8(),
                ),
                None => None,
            };

            let landmark_set = match (&frame, normalized) {
                (Some(img), true) => RawLandmarkSet::from_normalized(&points, img.width(), img.height()),
                (None, true) => bail!("--normalized needs --image for the frame size"),
                (_, false) => RawLandmarkSet::new(points),
            };

            let mut input = ScoreInput::landmarks_only(&landmark_set, topology);
            if let Some(img) = &frame {
                input = input.with_pixels(img);
            }

            let result = engine
                .score(&input)
                .await
                .with_context(|| format!("cannot score {}", landmarks.display()))?;
            if !result.calibrated {
                tracing::warn!("scored against fallback anchors; results are uncalibrated");
            }

            let advice = with_tips.then(|| tips(&result, DEFAULT_TIP_THRESHOLD));
            let result = if raw { result } else { result.rounded() };
            print_json(&ScoreOutput {
                result,
                tips: advice,
            })?;
        }
        Commands::Compare { first, second } => {
            let a = read_result(&first)?;
            let b = read_result(&second)?;
            print_json(&a.compare(&b))?;
        }
        Commands::Anchors { anchors } => {
            if anchors.is_some() {
                config.anchors_path = anchors;
            }
            let source = config.anchor_source();
            let described = source.describe();
            let table = AnchorCache::new(source).get_or_load().await;

            let mut metrics = serde_json::Map::new();
            for metric in Metric::ALL {
                let stat = table.get(metric);
                metrics.insert(
                    metric.key().to_string(),
                    serde_json::json!({ "mean": stat.mean, "std": stat.std }),
                );
            }
            print_json(&serde_json::json!({
                "source": described,
                "calibrated": table.is_calibrated(),
                "origin": table.origin(),
                "metrics": metrics,
            }))?;
        }
    }

    Ok(())
}
