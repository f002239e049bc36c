//! `fiq`: talk to a running fiqd.
//!
//! Usage:
//!   fiq ping
//!   fiq assess <image> [--json]
//!   fiq shutdown

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use fiq_core::{scalar_quality, BoundingBox, Image, MeasureStatus, Pose, QualityAssessments};
use fiq_wire::{Command, ProcessImageResult, Reply, Request};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

#[derive(Parser, Debug)]
#[command(name = "fiq")]
#[command(version, about = "Face image quality client", long_about = None)]
struct Cli {
    /// Daemon endpoint
    #[arg(long, global = true, default_value = "tcp://127.0.0.1:40411")]
    endpoint: String,

    /// Seconds to wait for a reply
    #[arg(long, global = true, default_value = "60")]
    timeout_secs: u64,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Check that the daemon answers
    Ping,
    /// Ask the daemon to exit
    Shutdown,
    /// Assess the quality of a face image
    Assess {
        image: PathBuf,

        /// Identifier echoed back in the reply
        #[arg(long, default_value = "1")]
        id: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize, Debug)]
struct AssessOutput {
    image: String,
    image_id: u32,
    /// False when no face was found or preprocessing stopped early.
    assessed: bool,
    scalar_quality: Option<f64>,
    bounding_box: Option<BoundingBox>,
    detected_faces: usize,
    pose: Option<Pose>,
    measures: Vec<MeasureOutput>,
}

#[derive(Serialize, Debug, PartialEq)]
struct MeasureOutput {
    name: &'static str,
    id: i16,
    raw_score: f64,
    scalar: f64,
    status: MeasureStatus,
}

struct Client {
    socket: ReqSocket,
    timeout: Duration,
}

impl Client {
    async fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
        let mut socket = ReqSocket::new();
        socket
            .connect(endpoint)
            .await
            .with_context(|| format!("failed to connect to {endpoint}"))?;
        Ok(Self { socket, timeout })
    }

    async fn call(&mut self, request: &Request) -> Result<Reply> {
        self.socket
            .send(ZmqMessage::from(request.encode()))
            .await
            .context("failed to send request")?;
        let message = tokio::time::timeout(self.timeout, self.socket.recv())
            .await
            .map_err(|_| anyhow!("no reply within {}s", self.timeout.as_secs()))?
            .context("failed to receive reply")?;
        let bytes: Vec<u8> = message.iter().flat_map(|part| part.iter().copied()).collect();
        Reply::decode(&bytes).context("malformed reply")
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut client = Client::connect(&cli.endpoint, Duration::from_secs(cli.timeout_secs)).await?;

    match cli.action {
        Action::Ping => {
            expect_reply(client.call(&Request::Ping).await?, Command::Ping)?;
            println!("pong from {}", cli.endpoint);
        }
        Action::Shutdown => {
            expect_reply(client.call(&Request::Shutdown).await?, Command::Shutdown)?;
            println!("fiqd at {} is shutting down", cli.endpoint);
        }
        Action::Assess { image, id, json } => {
            let request_image = load_image(&image)?;
            tracing::debug!(
                width = request_image.width,
                height = request_image.height,
                "image loaded"
            );
            let reply = client
                .call(&Request::ProcessImage {
                    image_id: id,
                    image: request_image,
                })
                .await?;
            let output = assess_output(&image, id, reply)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_table(&output);
            }
        }
    }

    Ok(())
}

/// Accept only a reply to `expected`. ErrorNotify means the daemon could not
/// decode the request.
fn expect_reply(reply: Reply, expected: Command) -> Result<Reply> {
    match reply.command() {
        Command::ErrorNotify => bail!("daemon rejected the {expected:?} request as malformed"),
        got if got == expected => Ok(reply),
        got => bail!("unexpected {got:?} reply to {expected:?}"),
    }
}

fn load_image(path: &Path) -> Result<Image> {
    let rgb = image::open(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
        bail!("{width}x{height} exceeds the 65535 pixel limit per side");
    };
    Image::from_rgb(w, h, rgb.into_raw()).with_context(|| format!("unusable image {}", path.display()))
}

fn assess_output(path: &Path, expected_id: u32, reply: Reply) -> Result<AssessOutput> {
    let (image_id, result) = match expect_reply(reply, Command::ProcessImage)? {
        Reply::ProcessImage { image_id, result } => (image_id, result),
        other => bail!("unexpected {:?} reply", other.command()),
    };
    if image_id != expected_id {
        bail!("reply is for image {image_id}, expected {expected_id}");
    }

    let image = path.display().to_string();
    Ok(match result.as_deref() {
        Some(ProcessImageResult {
            bounding_box,
            assessments,
            detected_faces,
            pose,
            ..
        }) => AssessOutput {
            image,
            image_id,
            assessed: true,
            scalar_quality: Some(scalar_quality(assessments)),
            bounding_box: Some(*bounding_box),
            detected_faces: detected_faces.len(),
            pose: Some(*pose),
            measures: measure_rows(assessments),
        },
        None => AssessOutput {
            image,
            image_id,
            assessed: false,
            scalar_quality: None,
            bounding_box: None,
            detected_faces: 0,
            pose: None,
            measures: Vec::new(),
        },
    })
}

fn measure_rows(assessments: &QualityAssessments) -> Vec<MeasureOutput> {
    assessments
        .iter()
        .map(|(measure, result)| MeasureOutput {
            name: measure.name(),
            id: measure.id(),
            raw_score: result.raw_score,
            scalar: result.scalar,
            status: result.status,
        })
        .collect()
}

fn print_table(output: &AssessOutput) {
    println!("{} (id {})", output.image, output.image_id);
    if !output.assessed {
        println!("  not assessed: no usable face");
        return;
    }
    if let Some(b) = &output.bounding_box {
        println!(
            "  face: {}x{} at ({}, {}), {} detected",
            b.width, b.height, b.xleft, b.ytop, output.detected_faces
        );
    }
    if let Some(p) = &output.pose {
        println!("  pose: yaw {:.1} pitch {:.1} roll {:.1}", p.yaw, p.pitch, p.roll);
    }
    println!("  {:<28} {:>10} {:>8}  status", "measure", "raw", "scalar");
    for m in &output.measures {
        println!(
            "  {:<28} {:>10.3} {:>8.1}  {:?}",
            m.name, m.raw_score, m.scalar, m.status
        );
    }
    if let Some(q) = output.scalar_quality {
        println!("  scalar quality: {q:.1}");
    }
}
