//! Restore command - download and unpack the archive for the cache key

use super::{blocking, cache_key, open_store, working_dir};
use crate::archive::Unpacker;
use crate::cache::{restore, write_result_marker, RestoreOutcome};
use crate::cli::args::RestoreArgs;
use crate::config::Config;
use crate::error::CacherResult;
use console::style;

/// Execute the restore command
pub async fn execute(args: RestoreArgs, config: &Config) -> CacherResult<()> {
    let cwd = working_dir()?;
    let key = cache_key(&args.key, &cwd)?;
    println!("{}", key);

    let store = open_store(&args.target, config).await?;
    let unpacker = Unpacker::new(cwd);
    let lookup_key = key.clone();
    let outcome = blocking(move || restore(store.as_ref(), &lookup_key, &unpacker)).await?;

    if let Some(path) = &args.result_file {
        write_result_marker(path, &outcome)?;
    }

    match outcome {
        RestoreOutcome::Hit(summary) => {
            if summary.failed_symlinks > 0 {
                eprintln!(
                    "{} {} symlink(s) could not be created",
                    style("!").yellow(),
                    summary.failed_symlinks
                );
            }
            eprintln!(
                "{} Restored {} file(s), {} director(ies), {} symlink(s) from {}",
                style("✓").green(),
                summary.files,
                summary.directories,
                summary.symlinks,
                style(&key).cyan()
            );
        }
        RestoreOutcome::Miss => {
            eprintln!("{} No cache entry for {}", style("!").yellow(), style(&key).cyan());
        }
    }

    Ok(())
}
