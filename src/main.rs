use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod platform;
mod semantic;
mod storage;
mod taxonomy;
#[cfg(test)]
mod tests;
mod web;

use app::{AppFactory, AppPaths};
use cli::{Command, ExportFormat};
use platform::Platform;
use taxonomy::convert;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let paths = AppFactory::get_paths()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args.command, paths))
}

async fn run(command: Command, paths: AppPaths) -> anyhow::Result<()> {
    match command {
        Command::Serve { port } => {
            let (config, mapper) = AppFactory::create_mapper(&paths)?;
            let port = port.unwrap_or(config.server.port);
            web::serve(Arc::new(mapper), &config.server.host, port).await
        }

        Command::Build { platform, all } => {
            let (_, mapper) = AppFactory::create_mapper(&paths)?;

            if all {
                let mut failed = Vec::new();
                for (platform, result) in mapper.build_all().await {
                    match result {
                        Ok(count) => println!("{platform}: {count} categories indexed"),
                        Err(e) => {
                            println!("{platform}: failed: {e}");
                            failed.push(platform);
                        }
                    }
                }
                if failed.len() == Platform::ALL.len() {
                    bail!("every platform failed to build");
                }
                return Ok(());
            }

            let platform = parse_platform(platform.as_deref().unwrap_or_default())?;
            let count = mapper.build(platform).await?;
            println!("{platform}: {count} categories indexed");
            Ok(())
        }

        Command::Load { platform } => {
            let platform = parse_platform(&platform)?;
            let config = AppFactory::create_config(&paths)?;
            let registry = AppFactory::create_registry(&config);

            let index = registry
                .load(platform)
                .await
                .with_context(|| format!("Failed to load {platform} index"))?;
            println!(
                "{platform}: {} categories, {} dimensions",
                index.len(),
                index.dimensions()
            );
            Ok(())
        }

        Command::Search { platform, k, text } => {
            let platform = parse_platform(&platform)?;
            let (_, mapper) = AppFactory::create_mapper(&paths)?;

            let results = mapper.search(platform, &text, k).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }

        Command::Chain { k, text } => {
            let (_, mapper) = AppFactory::create_mapper(&paths)?;

            let entries = mapper.chain(&text, k).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }

        Command::Delete { platform } => {
            let platform = parse_platform(&platform)?;
            let config = AppFactory::create_config(&paths)?;
            let registry = AppFactory::create_registry(&config);

            registry.delete(platform).await?;
            println!("{platform}: deleted");
            Ok(())
        }

        Command::Status {} => {
            let config = AppFactory::create_config(&paths)?;
            let registry = AppFactory::create_registry(&config);

            let persisted: Vec<Platform> = Platform::ALL
                .into_iter()
                .filter(|p| registry.storage().exists(*p))
                .collect();
            let status = serde_json::json!({
                "supportedPlatforms": Platform::ALL,
                "persistedPlatforms": persisted,
                "indexDir": config.index_path(),
                "dataDir": config.data_path(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }

        Command::Convert {
            format,
            input,
            output,
        } => convert_export(format, &input, &output),
    }
}

fn parse_platform(value: &str) -> anyhow::Result<Platform> {
    Ok(Platform::parse(value)?)
}

fn convert_export(
    format: ExportFormat,
    input: &std::path::Path,
    output: &std::path::Path,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let converted = match format {
        ExportFormat::Shopify => convert::convert_shopify(&content),
        ExportFormat::Ozon => convert::convert_ozon(&content)?,
        ExportFormat::Yandex => convert::convert_yandex(&content)?,
    };

    let dir = output.parent().filter(|p| !p.as_os_str().is_empty());
    let store = storage::BackendLocal::new(dir.unwrap_or_else(|| std::path::Path::new(".")))?;
    let name = output
        .file_name()
        .context("Output path has no file name")?
        .to_string_lossy();
    storage::StorageManager::write(
        &store,
        &name,
        taxonomy::render_tsv(&converted.rows).as_bytes(),
    )?;

    log::info!(
        "wrote {} categories to {} ({} lines skipped)",
        converted.rows.len(),
        output.display(),
        converted.skipped
    );
    Ok(())
}
