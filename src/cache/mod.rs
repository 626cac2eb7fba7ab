//! Cache keys and the store/restore pipelines
//!
//! Keys are content-addressed: the same key files produce the same key, so
//! an archive stored under a key always reflects the inputs that named it.
//!
//! # Key format
//!
//! | `--cache-key` | `--cache-key-files` | Key |
//! |---------------|---------------------|-----|
//! | `v1`          | none                | `v1` |
//! | empty         | `go.sum`            | `<sha256>` |
//! | `v1`          | `go.sum`            | `v1-<sha256>` |

pub mod key;
pub mod ops;
pub mod pattern;

pub use key::derive_key;
pub use ops::{restore, save, write_result_marker, RestoreOutcome};
pub use pattern::match_patterns;
