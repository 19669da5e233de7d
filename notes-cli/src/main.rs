//! Run the clinical notes pipeline over two recorded WAV files.
//!
//! Configuration comes from the environment (see `PipelineConfig::from_env`);
//! a `.env` file in the working directory is honored.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use notes_pipeline::{AudioClip, PipelineConfig, PipelineOrchestrator, SpeakerRole};

#[derive(Parser)]
#[command(
    name = "notes-cli",
    about = "Draft a coded clinical note from patient and doctor recordings"
)]
struct Args {
    /// Patient recording (WAV)
    #[arg(long)]
    patient: PathBuf,

    /// Doctor recording (WAV)
    #[arg(long)]
    doctor: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = PipelineConfig::from_env()?;
    let orchestrator = PipelineOrchestrator::from_config(config)?;

    let patient_bytes = std::fs::read(&args.patient)
        .with_context(|| format!("reading patient recording {}", args.patient.display()))?;
    let doctor_bytes = std::fs::read(&args.doctor)
        .with_context(|| format!("reading doctor recording {}", args.doctor.display()))?;

    let patient = AudioClip::new(SpeakerRole::Patient, patient_bytes);
    let doctor = AudioClip::new(SpeakerRole::Doctor, doctor_bytes);

    let run = orchestrator.run(patient, doctor).await;

    if run.patient.transcription.is_unavailable() {
        warn!("patient transcription unavailable, note is degraded");
    }
    if run.doctor.transcription.is_unavailable() {
        warn!("doctor transcription unavailable, note is degraded");
    }
    if run.note.is_fallback() {
        warn!("note synthesis unavailable, printing transcripts and codes only");
    }

    println!("{}", run.note.render());
    Ok(())
}
