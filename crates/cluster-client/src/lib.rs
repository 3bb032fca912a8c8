//! Kubernetes Service/Endpoints client
//!
//! A small, typed client for the Service and Endpoints calls made by the
//! headless service controller, behind a trait so the reconciler can be tested
//! against an in-memory mock.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // In-cluster identity; pass Some("kind-dev") to use a kubeconfig context
//! let client = KubeClusterClient::connect(None).await?;
//!
//! match client.get_service("default", "web-0").await {
//!     Ok(_) => println!("service exists"),
//!     Err(e) if e.is_not_found() => println!("no service yet"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Error classification**: API statuses are mapped to `NotFound`,
//!   `AlreadyExists`, `Conflict` or a generic `Api` error
//! - **Config sources**: in-cluster service account or a named kubeconfig context
//! - **`test-util`**: exposes `MockClusterClient`

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{Call, MockClusterClient, Operation};
