//! Decoder and remote collaborators for the VitalSync telemetry engine.
//!
//! This crate turns captured sensor broadcasts into readings and defines the
//! seams through which the engine talks to the remote system.
//!
//! # Features
//!
//! - **Broadcast decoding**: two vendor service-data layouts, never panics
//! - **Collaborator traits**: push, history fetch, credential lookup
//! - **Single-flight credentials**: concurrent lookups share one request
//! - **Observation flattening**: ordered, individually testable extraction rules
//! - **HTTP remote** (feature `http`): a `reqwest` client implementing every trait
//! - **Mocks**: failure injection and gating for tests
//!
//! # Quick Start
//!
//! ```
//! use std::collections::HashMap;
//! use vitalsync_core::advertisement::decode;
//!
//! let mut service_data = HashMap::new();
//! service_data.insert(
//!     "0000181a-0000-1000-8000-00805f9b34fb".to_string(),
//!     vec![0xA4, 0xC1, 0x38, 0x00, 0x00, 0x01, 0x00, 0xCA, 0x37],
//! );
//!
//! let decoded = decode(&service_data).unwrap();
//! assert_eq!(decoded.temperature, Some(20.2));
//! assert_eq!(decoded.humidity, Some(55.0));
//! ```

pub mod advertisement;
pub mod credentials;
pub mod error;
pub mod mock;
pub mod observation;
#[cfg(feature = "http")]
pub mod remote;
pub mod traits;

pub use vitalsync_types as types;

pub use advertisement::{DecodedReading, PayloadFormat, decode, is_recognized_sensor};
pub use credentials::CredentialResolver;
pub use error::{Error, Result};
pub use mock::{MockCredentials, MockHistory, MockSink};
pub use observation::{RemoteObservation, flatten_observations};
#[cfg(feature = "http")]
pub use remote::{HttpRemote, RemoteOptions};
pub use traits::{CredentialSource, HistorySource, StaticCredentials, TelemetrySink};
