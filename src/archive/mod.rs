//! Archive Manager Module
//!
//! The persisted archive is the single cross-invocation resource: one tar
//! holding the state document, the error log, and each generation's
//! compressed diff archive. Restores guard against path-escape entries;
//! publishing is a single atomic rename, so a crash at any earlier point
//! leaves the previously published archive intact.

mod manager;
mod order;

pub use manager::{
    build_generation_zip, extract_generation_zip, generation_zip_name, is_generation_zip, publish,
    restore,
};
pub use order::sort_for_publish;
