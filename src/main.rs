use anyhow::Context;
use clap::Parser;
use s3_squeeze::cli::{Args, Commands};
use s3_squeeze::pipeline::Outcome;
use s3_squeeze::{batch, event, info, logger, pipeline, Config, NotificationEvent, S3Store};
use std::io::Read;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::set_quiet_mode(args.quiet);
    logger::set_verbose_mode(args.verbose);

    let config = Config::from_env().context("invalid configuration")?;
    let store = Arc::new(S3Store::from_env().await);

    match args.command {
        Commands::Run => {
            let summary = batch::process_all(store, &config).await?;
            if summary.failed > 0 {
                anyhow::bail!("{} objects failed to optimize", summary.failed);
            }
            info!("Finished");
        }
        Commands::Event { input } => {
            let raw = if input == "-" {
                let mut buffer = String::new();
                std::io::stdin()
                    .read_to_string(&mut buffer)
                    .context("failed to read notification from stdin")?;
                buffer
            } else {
                std::fs::read_to_string(&input)
                    .with_context(|| format!("failed to read notification file {input}"))?
            };
            let notification = NotificationEvent::from_json(&raw)?;
            event::process_event(store.as_ref(), &config, &notification).await?;
            info!("Finished");
        }
        Commands::Optimize { keys, bucket } => {
            let bucket = bucket.as_deref().unwrap_or(&config.source_bucket);
            let mut failures = 0usize;
            for key in &keys {
                match pipeline::process_one(store.as_ref(), &config, bucket, key).await {
                    Ok(Outcome::Optimized {
                        original,
                        optimized,
                    }) => info!("{key}: {original} -> {optimized} bytes"),
                    Ok(Outcome::Skipped(reason)) => info!("{key}: skipped ({reason})"),
                    Err(e) => {
                        s3_squeeze::error!("{key}: {e}");
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{failures} of {} keys failed", keys.len());
            }
        }
    }

    Ok(())
}
