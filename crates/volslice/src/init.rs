//! Logging setup and options persistence.

use std::path::Path;

use volslice_core::Options;

use crate::Result;

/// Initializes logging from `RUST_LOG`.
///
/// Safe to call more than once; later calls do nothing.
///
/// # Example
///
/// ```no_run
/// volslice::init();
/// ```
pub fn init() {
    if env_logger::try_init().is_ok() {
        log::info!("volslice initialized");
    }
}

/// Reads [`Options`] from a JSON file. Missing fields take their defaults.
pub fn load_options(path: impl AsRef<Path>) -> Result<Options> {
    Ok(Options::load(path)?)
}

/// Writes [`Options`] to a JSON file.
pub fn save_options(options: &Options, path: impl AsRef<Path>) -> Result<()> {
    options.save(path)?;
    Ok(())
}
