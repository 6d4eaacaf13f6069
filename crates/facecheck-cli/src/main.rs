use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facecheck_core::overlay::{project_to_view, ViewRect};
use facecheck_core::{
    FaceDetector, FacePipeline, FaceRecognizer, Recognition, Registry, SessionSnapshot, TensorLayout,
};
use facecheck_hw::Camera;
use facecheck_store::FaceRepo;
use std::path::PathBuf;

#[zbus::proxy(
    interface = "org.facecheck.Attendance1",
    default_service = "org.facecheck.Attendance1",
    default_path = "/org/facecheck/Attendance1"
)]
trait Attendance {
    async fn register(&self, name: &str) -> zbus::Result<String>;
    async fn list_employees(&self) -> zbus::Result<String>;
    async fn remove_employee(&self, id: &str) -> zbus::Result<bool>;
    async fn clear_faces(&self) -> zbus::Result<u32>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facecheck", about = "Face attendance check-in CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the employee currently in front of the camera
    Register {
        /// Employee name
        #[arg(short, long)]
        name: String,
    },
    /// List registered employees
    List,
    /// Remove a registered employee
    Remove {
        /// Profile ID to remove
        id: String,
    },
    /// Delete all registered faces
    Clear {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },
    /// Show daemon and session status
    Status {
        /// Also project the detected face box onto a preview of this size (e.g. 1080x1920)
        #[arg(long, value_parser = parse_view_size)]
        view: Option<(f32, f32)>,
        /// Mirror the projection horizontally, as front camera previews are shown
        #[arg(long, requires = "view")]
        mirrored: bool,
    },
    /// Identify the face in an image file without the daemon
    Identify {
        /// Image to analyze (PNG, JPEG, ...)
        image: PathBuf,
        /// Directory containing the ONNX models
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Face database to match against
        #[arg(long)]
        db: Option<PathBuf>,
        /// Similarity threshold for a match
        #[arg(long, default_value_t = 0.7)]
        threshold: f32,
        /// Embedding model input layout (nhwc or nchw)
        #[arg(long, default_value = "nhwc")]
        layout: TensorLayout,
    },
    /// List V4L2 capture devices
    Devices,
    /// Capture one frame and save it, bypassing the daemon
    Test {
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        #[arg(short, long, default_value = "facecheck-test.png")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Register { name } => {
            let proxy = connect().await?;
            let id = proxy.register(&name).await.context("registration failed")?;
            println!("Registered {name} ({id})");
        }
        Commands::List => {
            let proxy = connect().await?;
            let json = proxy.list_employees().await?;
            let employees: Vec<serde_json::Value> = serde_json::from_str(&json)?;
            if employees.is_empty() {
                println!("No employees registered");
            }
            for e in &employees {
                println!(
                    "{}  {}  {}",
                    e["id"].as_str().unwrap_or("?"),
                    e["registered_at"].as_str().unwrap_or("?"),
                    e["name"].as_str().unwrap_or("?"),
                );
            }
        }
        Commands::Remove { id } => {
            let proxy = connect().await?;
            if proxy.remove_employee(&id).await? {
                println!("Removed {id}");
            } else {
                bail!("no employee with id {id}");
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to delete all faces without --yes");
            }
            let proxy = connect().await?;
            let removed = proxy.clear_faces().await?;
            println!("Removed {removed} face(s)");
        }
        Commands::Status { view, mirrored } => {
            let proxy = connect().await?;
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if let Some(view) = view {
                let snapshot: SessionSnapshot = serde_json::from_value(status["session"].clone())
                    .context("daemon returned a malformed session snapshot")?;
                match face_in_view(&snapshot, view, mirrored) {
                    Some(r) => println!(
                        "Face in view: left {:.1}, top {:.1}, right {:.1}, bottom {:.1}",
                        r.left, r.top, r.right, r.bottom
                    ),
                    None => println!("No face to project"),
                }
            }
        }
        Commands::Identify {
            image,
            model_dir,
            db,
            threshold,
            layout,
        } => identify(image, model_dir, db, threshold, layout)?,
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Test { device, output } => {
            let camera = Camera::open(&device)?;
            let frame = camera.capture_frame()?;
            frame
                .image
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Captured {}x{} frame #{} to {}",
                frame.width(),
                frame.height(),
                frame.sequence,
                output.display()
            );
        }
    }

    Ok(())
}

/// Parse `WIDTHxHEIGHT` into a positive view size.
fn parse_view_size(s: &str) -> Result<(f32, f32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let parse = |v: &str| -> Result<f32, String> {
        match v.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(n as f32),
            _ => Err(format!("invalid dimension {v:?} in {s:?}")),
        }
    };
    Ok((parse(w)?, parse(h)?))
}

fn face_in_view(snapshot: &SessionSnapshot, view: (f32, f32), mirrored: bool) -> Option<ViewRect> {
    let face = snapshot.face_box.as_ref()?;
    let (w, h) = snapshot.frame_size?;
    project_to_view(face, (w as f32, h as f32), view, mirrored)
}

async fn connect() -> Result<AttendanceProxy<'static>> {
    let conn = zbus::Connection::session().await?;
    AttendanceProxy::new(&conn)
        .await
        .context("facecheckd is not reachable on the session bus")
}

fn identify(
    image: PathBuf,
    model_dir: Option<PathBuf>,
    db: Option<PathBuf>,
    threshold: f32,
    layout: TensorLayout,
) -> Result<()> {
    let model_dir = model_dir.unwrap_or_else(facecheck_core::default_model_dir);
    let db = db.unwrap_or_else(|| facecheck_core::data_dir().join("faces.db"));

    let conn = rusqlite::Connection::open(&db).with_context(|| format!("opening {}", db.display()))?;
    FaceRepo::migrate(&conn)?;
    let registry = Registry::new(FaceRepo::load_all(&conn)?);

    let detector_path = model_dir.join(facecheck_core::DETECTOR_MODEL_FILE);
    let recognizer_path = model_dir.join(facecheck_core::RECOGNIZER_MODEL_FILE);
    let detector = FaceDetector::load(&detector_path.to_string_lossy())?;
    let recognizer = FaceRecognizer::load(&recognizer_path.to_string_lossy(), layout)?;
    let mut pipeline = FacePipeline::new(detector, recognizer).with_threshold(threshold);

    let rgb = image::open(&image)
        .with_context(|| format!("reading {}", image.display()))?
        .to_rgb8();

    match pipeline.analyze(&rgb, &registry) {
        Recognition::Match { name, score, profile_id, .. } => {
            println!("Welcome, {name}! (score {score:.3}, id {profile_id})");
        }
        Recognition::NoMatch { best_score, .. } => match best_score {
            Some(score) => println!("Face not recognized (best score {score:.3}, threshold {threshold})"),
            None if registry.is_empty() => println!("Face detected, but no employees are registered"),
            None => println!("Face detected, but no embedding could be compared"),
        },
        Recognition::Idle => println!("No face detected"),
    }
    Ok(())
}
