//! Typed settings for Trellis.
//!
//! Settings cover the policy knobs of the pipeline (authentication defaults,
//! error responses, default headers) plus logging and metrics. They are
//! loaded in layers:
//!
//! ```text
//! defaults / preset  ->  TOML or JSON file  ->  .env  ->  TRELLIS__SECTION__KEY
//! ```
//!
//! Unknown fields are rejected, so a typo in a file fails loudly instead of
//! silently keeping a default.
//!
//! # Example
//!
//! ```no_run
//! use trellis_config::ConfigLoader;
//! use trellis_core::Configuration;
//!
//! # fn main() -> Result<(), trellis_config::ConfigError> {
//! let settings = ConfigLoader::new()
//!     .with_production()
//!     .with_file("trellis.toml")?
//!     .with_env_prefix("TRELLIS")
//!     .load()?;
//!
//! let mut configuration = Configuration::new();
//! settings.apply_to(&mut configuration)?;
//! # Ok(())
//! # }
//! ```
//!
//! # File Format
//!
//! ```toml
//! [authentication]
//! fail_if_no_authenticators_apply = false
//! realm = "orders"
//! unauthorized_reason_phrase = "Unauthorized"
//!
//! [errors]
//! show_details = false
//! reason_phrase = "There was a problem processing your request."
//! unhandled = "respond"        # or "propagate"
//!
//! [response.default_headers]
//! x-served-by = "trellis"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//! duration_buckets = [0.005, 0.05, 0.5, 5.0]
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{AuthenticationSettings, ErrorSettings, ResponseSettings, TrellisConfig};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use trellis_telemetry::{LogConfig, LogFormat, MetricsConfig};
