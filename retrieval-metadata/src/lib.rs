//! Sensor and location metadata
//!
//! Answers the questions the queue generator asks about a sensor: in which
//! time windows was it deployed, and what did it look like (location,
//! serial number, pressure source) during a given window.
//!
//! Metadata is read from a local directory holding `sensors.json` and
//! `locations.json`. If these files are absent and a remote URL is
//! configured, the same files are downloaded instead.
//!
//! # Example
//!
//! ```no_run
//! use retrieval_core::config::MetadataConfig;
//! use retrieval_metadata::{MetadataProvider, load_metadata};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let metadata = load_metadata(&MetadataConfig::default()).await?;
//!     for sensor_id in metadata.sensor_ids() {
//!         println!("{}: {:?}", sensor_id, metadata.location_windows(&sensor_id)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod remote;
mod store;

pub use error::{MetadataError, Result};
pub use remote::MetadataClient;
pub use store::{
    LOCATIONS_FILE, MetadataStore, SENSORS_FILE, SensorRecord, SetupRecord, SetupValue,
};

use chrono::{DateTime, Utc};
use retrieval_core::config::MetadataConfig;
use retrieval_core::domain::context::{SensorDataContext, TimeWindow};
use tracing::info;

/// Read access to sensor and location metadata
pub trait MetadataProvider: Send + Sync {
    /// Every sensor with a metadata record
    fn sensor_ids(&self) -> Vec<String>;

    /// The windows during which a sensor stood at one location, sorted by start
    fn location_windows(&self, sensor_id: &str) -> Result<Vec<TimeWindow>>;

    /// The contexts of a sensor inside `[from, to)`
    ///
    /// A window containing a relocation yields one context per location.
    fn get_contexts(
        &self,
        sensor_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorDataContext>>;
}

/// Loads metadata from the local directory, falling back to the remote URL
pub async fn load_metadata(config: &MetadataConfig) -> Result<MetadataStore> {
    if let Some(store) = MetadataStore::load_local(&config.local_dir)? {
        info!("Loaded metadata from {}", config.local_dir.display());
        return Ok(store);
    }

    match &config.remote_url {
        Some(url) => {
            let store = MetadataClient::new(url.clone(), config.access_token.clone())
                .fetch()
                .await?;
            info!("Loaded metadata from {}", url);
            Ok(store)
        }
        None => Err(MetadataError::Unavailable(format!(
            "no metadata files in {} and no remote_url configured",
            config.local_dir.display()
        ))),
    }
}
