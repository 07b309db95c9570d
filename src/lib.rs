#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Lifecycle Bridge
//!
//! Deploys workers onto a clusterable actor-style runtime as soon as the
//! component container that builds them reports ready.
//!
//! ## Overview
//!
//! A launch registers worker types with a small container and runs its single
//! initialization cycle. The container first builds the [`RuntimeHandle`],
//! which asks a [`CoordinationManagerProvider`] once for a cluster
//! coordination manager and joins the cluster if one is supplied. It then
//! constructs every component and fires a one-shot readiness signal. Each
//! worker sits behind a [`LifecycleBridge`] that answers the signal by handing
//! the worker to the runtime.
//!
//! ## Key Features
//!
//! - **Deploy on ready**: no worker is deployed before every component is built
//! - **Pluggable coordination**: the runtime only sees the provider seam;
//!   standalone, pre-built and closure providers ship with the crate
//! - **Runtime facilities**: event bus, shared data and a context runner handed
//!   to every worker through [`WorkerContext`]
//! - **Layered configuration**: defaults, JSON files and `BRIDGE__*` environment
//!   overrides via the `config` crate
//!
//! ## Module Organization
//!
//! - [`launcher`] - Process entry point and [`LaunchHandle`]
//! - [`container`] - Component registration, readiness signal, launch state
//! - [`bridge`] - Readiness to deployment
//! - [`runtime`] - Owned execution engine, deployments, event bus, shared data
//! - [`coordination`] - Coordination manager seam and in-memory backend
//! - [`config`] - Configuration types and loader
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lifecycle_bridge::prelude::*;
//! use lifecycle_bridge::coordination::StandaloneProvider;
//!
//! struct Greeter;
//!
//! impl Component for Greeter {
//!     fn construct(_ctx: &BridgeContext) -> lifecycle_bridge::Result<Self> {
//!         Ok(Greeter)
//!     }
//! }
//!
//! #[async_trait]
//! impl Deployable for Greeter {
//!     async fn start(&mut self, ctx: WorkerContext) -> anyhow::Result<()> {
//!         tracing::info!(deployment_id = %ctx.deployment_id(), "greeter started");
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> lifecycle_bridge::Result<()> {
//! let handle = launch::<Greeter>(StandaloneProvider)?;
//! assert!(!handle.is_clustered());
//! handle.shutdown(std::time::Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod constants;
pub mod container;
pub mod coordination;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod runtime;

pub use bridge::LifecycleBridge;
pub use config::{BridgeConfig, ConfigManager, ConfigurationError};
pub use container::{
    BridgeContext, Component, Container, LaunchState, ReadyEvent, ReadyListener,
};
pub use coordination::{
    ClusterNode, CoordinationError, CoordinationManager, CoordinationManagerProvider, NodeId,
};
pub use error::{BridgeError, Result};
pub use launcher::{launch, launch_or_exit, LaunchHandle, Launcher};
pub use runtime::{
    Deployable, DeploymentId, DeploymentRecord, DeploymentStatus, RuntimeHandle, WorkerContext,
    WorkerIdentity,
};

/// Types most workers need
pub mod prelude {
    pub use crate::container::{BridgeContext, Component};
    pub use crate::launcher::{launch, LaunchHandle, Launcher};
    pub use crate::runtime::{Deployable, WorkerContext, WorkerIdentity};
}
