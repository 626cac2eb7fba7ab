//! Key command - print the derived cache key

use super::{cache_key, working_dir};
use crate::cli::args::KeyArgs;
use crate::error::CacherResult;

/// Execute the key command
pub async fn execute(args: KeyArgs) -> CacherResult<()> {
    let key = cache_key(&args, &working_dir()?)?;
    println!("{}", key);
    Ok(())
}
