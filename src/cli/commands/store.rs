//! Store command - pack matched files and upload them under the cache key

use super::{blocking, cache_key, open_store, working_dir};
use crate::archive::Packer;
use crate::cache::{match_patterns, save};
use crate::cli::args::StoreArgs;
use crate::config::Config;
use crate::error::{CacherError, CacherResult};
use console::style;
use tracing::debug;

/// Execute the store command
pub async fn execute(args: StoreArgs, config: &Config) -> CacherResult<()> {
    if args.file_patterns.iter().all(|p| p.is_empty()) {
        return Err(CacherError::MissingOption(
            "--file-patterns is required".to_string(),
        ));
    }
    args.key.validate()?;

    let cwd = working_dir()?;
    let roots = match_patterns(&args.file_patterns, &cwd)?;
    debug!("Matched {} path(s): {:?}", roots.len(), roots);

    let key = cache_key(&args.key, &cwd)?;
    println!("{}", key);

    let store = open_store(&args.target, config).await?;
    let packer = Packer::new(cwd);
    let stored_key = key.clone();
    let summary = blocking(move || save(store.as_ref(), &stored_key, &roots, &packer)).await?;

    if !summary.skipped_roots.is_empty() {
        let skipped: Vec<String> = summary
            .skipped_roots
            .iter()
            .map(|root| root.display().to_string())
            .collect();
        eprintln!(
            "{} Not archived, see warnings above: {}",
            style("!").yellow(),
            skipped.join(", ")
        );
    }
    eprintln!(
        "{} Stored {} entries ({} bytes) under {}",
        style("✓").green(),
        summary.entries,
        summary.bytes,
        style(&key).cyan()
    );

    Ok(())
}
