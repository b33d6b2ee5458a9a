use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facetag_core::{
    BoundingBox, FaceCrop, FingerprintGenerator, IdentityMemory, IdentityResolver, ModelPaths,
    Models, ReferenceDatabase, RelativeBox, ResolverSettings,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_URL: &str = "http://127.0.0.1:10000";

#[derive(Parser)]
#[command(name = "facetag", about = "facetag face identity CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fingerprint of a face image
    Fingerprint {
        /// Image containing only the face
        image: PathBuf,
    },
    /// Resolve identities for faces in an image, without the daemon
    Resolve {
        image: PathBuf,
        /// Face box in relative units: xmin,ymin,width,height (repeatable)
        #[arg(short, long = "face", value_parser = parse_relative_box)]
        faces: Vec<RelativeBox>,
        /// JSON reference database
        #[arg(short, long)]
        reference: Option<PathBuf>,
        /// ONNX descriptor model
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Comma-separated name-only identities
        #[arg(short, long, value_delimiter = ',')]
        names: Vec<String>,
        /// Euclidean match threshold
        #[arg(short, long, default_value_t = facetag_core::matcher::DEFAULT_MATCH_THRESHOLD)]
        threshold: f32,
    },
    /// Summarize a reference database file
    Reference {
        path: PathBuf,
    },
    /// Show daemon status
    Status {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
    /// Clear the daemon's identity memory
    Reset {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fingerprint { image } => {
            let crop = load_crop(&image)?;
            let fp = FingerprintGenerator::default()
                .try_fingerprint(&crop)
                .with_context(|| format!("fingerprinting {}", image.display()))?;
            println!("{fp}");
        }
        Commands::Resolve {
            image,
            faces,
            reference,
            model,
            names,
            threshold,
        } => {
            let frame = image::open(&image)
                .with_context(|| format!("opening {}", image.display()))?
                .to_rgb8();
            let boxes: Vec<BoundingBox> = faces
                .iter()
                .map(|rel| BoundingBox::from_relative(rel, frame.width(), frame.height()))
                .collect();

            let models = Models::new(ModelPaths {
                descriptor_model: model,
                reference_db: reference,
                known_names: names,
            });
            let settings = ResolverSettings {
                match_threshold: threshold,
                ..Default::default()
            };
            let resolver = IdentityResolver::new(
                Arc::new(models),
                Arc::new(IdentityMemory::default()),
                settings,
            );
            let identities = resolver.resolve_identities(&frame, &boxes)?;
            println!("{}", serde_json::json!({ "identities": identities }));
        }
        Commands::Reference { path } => {
            let db = ReferenceDatabase::load(&path)?;
            println!(
                "{} identities, {} descriptors, dimension {}",
                db.len(),
                db.descriptor_count(),
                db.dimension().map_or_else(|| "-".to_string(), |d| d.to_string())
            );
            for identity in db.identities() {
                println!("  {:<24} {}", identity.label, identity.descriptors.len());
            }
        }
        Commands::Status { url } => {
            let body: serde_json::Value = reqwest::blocking::get(format!("{url}/api/status"))
                .context("contacting facetagd")?
                .error_for_status()?
                .json()?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Reset { url } => {
            let body: serde_json::Value = reqwest::blocking::Client::new()
                .post(format!("{url}/api/reset"))
                .send()
                .context("contacting facetagd")?
                .error_for_status()?
                .json()?;
            println!("cleared {} entries", body["cleared"]);
        }
    }

    Ok(())
}

fn load_crop(path: &Path) -> Result<FaceCrop> {
    let rgb = image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(FaceCrop::new(rgb.into_raw(), width, height, 3))
}

fn parse_relative_box(raw: &str) -> Result<RelativeBox> {
    let parts: Vec<f32> = raw
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid face box {raw:?}"))?;
    let [xmin, ymin, width, height] = parts[..] else {
        bail!("face box needs 4 values (xmin,ymin,width,height), got {}", parts.len());
    };
    Ok(RelativeBox {
        xmin,
        ymin,
        width,
        height,
    })
}
