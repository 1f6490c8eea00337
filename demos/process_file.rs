//! Process a File
//!
//! Split a text file and run every fragment through the configured model,
//! then print the merged results.
//!
//! ```bash
//! CHUNKFLOW_API_KEY=sk-... cargo run --example process_file -- notes.md [settings.toml]
//! ```
//!
//! Settings default to `chunkflow.toml` in the working directory; a missing
//! file means defaults (OpenAI-compatible, gpt-4o, character windows).

use std::sync::Arc;

use chunkflow::{merge_results, ProviderRouter, RunEvent, Settings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        eprintln!("usage: process_file <input> [settings.toml]");
        std::process::exit(2);
    };
    let settings_path = args.next().unwrap_or_else(|| "chunkflow.toml".to_string());

    let mut settings = Settings::load(&settings_path)?;
    if let Ok(key) = std::env::var("CHUNKFLOW_API_KEY") {
        settings.provider.api_key = key;
    }

    let text = std::fs::read_to_string(&input)?;
    let mut dispatcher = settings.dispatcher(Arc::new(ProviderRouter::with_defaults()));
    dispatcher.load_source(text);
    println!("{input}: {} fragments", dispatcher.fragments().len());

    dispatcher.start();
    while let Some(event) = dispatcher.next_event().await {
        let progress = dispatcher.progress();
        match event {
            RunEvent::Completed { sequence_index, .. } => {
                eprintln!(
                    "[{}/{}] fragment {sequence_index} done",
                    progress.succeeded, progress.total
                );
            }
            RunEvent::Failed {
                sequence_index,
                message,
                ..
            } => {
                eprintln!("fragment {sequence_index} failed: {message}");
            }
        }
    }

    if let Some(error) = dispatcher.global_error() {
        eprintln!("run stopped: {error}");
    }

    println!("{}", merge_results(dispatcher.fragments(), &settings.merge));
    Ok(())
}
