use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voiceguard::{
    list_audio_devices, parse_audio_device, AlertEvent, AudioDevice, DetectionSink, Label,
    MonitorBuilder, RetentionPolicy, Verdict,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, default_value = "default", help = "Audio device to monitor")]
    audio_device: String,

    #[clap(long, help = "List available audio devices")]
    list_audio_devices: bool,

    #[clap(long, help = "Clear the buffer fully after each dispatch instead of keeping a trailing overlap")]
    no_overlap: bool,
}

fn print_devices(devices: &[AudioDevice]) {
    println!("Available audio devices:");
    for (i, device) in devices.iter().enumerate() {
        println!("  {}. {}", i + 1, device);
    }
}

/// Prints each surfaced verdict to the terminal.
struct ConsoleSink;

impl DetectionSink for ConsoleSink {
    fn record_detection(&self, verdict: &Verdict) {
        let label = match verdict.label {
            Label::Fake => "FAKE".red().bold(),
            Label::Real => "REAL".green(),
            Label::Unknown => "UNKNOWN".yellow(),
        };
        let confidence = format!("{:.0}%", verdict.confidence * 100.0);
        println!(
            "[{}] {} {} (real {:.1}%, ai {:.1}%)",
            verdict.timestamp.format("%H:%M:%S"),
            label,
            confidence.as_str().bold(),
            verdict.real_prob * 100.0,
            verdict.fake_prob * 100.0,
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_audio_devices {
        let devices = list_audio_devices().await?;
        print_devices(&devices);
        return Ok(());
    }

    let device = parse_audio_device(&args.audio_device)?;
    let retention = if args.no_overlap {
        RetentionPolicy::Clear
    } else {
        RetentionPolicy::TrailingOverlap
    };

    let manager = MonitorBuilder::new()
        .device(device)
        .retention(retention)
        .sink(Arc::new(ConsoleSink))
        .build();

    let mut alerts = manager.subscribe_alerts();
    tokio::spawn(async move {
        while let Ok(event) = alerts.recv().await {
            match event {
                AlertEvent::Raised { verdict } => {
                    let banner = format!(
                        "🚨 AI-generated speech suspected ({:.0}%)",
                        verdict.fake_prob * 100.0
                    );
                    println!("{}", banner.as_str().red().bold());
                }
                AlertEvent::Dismissed => {
                    println!("{}", "alert cleared".dimmed());
                }
            }
        }
    });

    manager.start().await?;
    info!("monitoring, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    manager.stop().await?;

    if let Some(error) = manager.terminal_error() {
        return Err(anyhow::anyhow!(error));
    }
    Ok(())
}
