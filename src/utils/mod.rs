//! Utility functions for loading images and setting up logging.

pub mod image;

pub use image::{
    decode_base64_image, decode_image_bytes, dynamic_to_rgb, load_image, strip_data_url_prefix,
};

/// Initializes the tracing subscriber for logging.
///
/// Uses `RUST_LOG` when set and `default_directive` otherwise; output goes to stderr
/// so stdout stays free for recognized LaTeX.
#[cfg(feature = "cli")]
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
