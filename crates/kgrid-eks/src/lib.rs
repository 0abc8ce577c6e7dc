//! kgrid-eks — EKS cluster provisioning.
//!
//! The orchestrator talks to AWS only through the [`EksApi`] trait. The
//! production implementation, [`AwsCli`], drives the `aws` command line with
//! JSON output; tests substitute in-memory fakes.
//!
//! # Components
//!
//! - **`api`** — the `EksApi` seam, credentials and response types
//! - **`cli`** — `aws` CLI backed implementation
//! - **`network`** — describe-then-create of the shared VPC, subnets, gateways and IAM role
//! - **`kubeconfig`** — kubeconfig rendering with an `aws eks get-token` exec plugin

pub mod api;
pub mod cli;
pub mod error;
pub mod kubeconfig;
pub mod network;

pub use api::{AwsContext, ClusterInfo, CredentialError, EksApi, NetworkConfig, NodeGroupInfo};
pub use cli::AwsCli;
pub use error::{EksError, EksResult};
pub use kubeconfig::render_kubeconfig;

/// Kubernetes version used when a new-cluster spec does not pin one.
pub const DEFAULT_EKS_VERSION: &str = "1.18";

/// Tag key carried by every AWS resource kgrid creates.
pub const MANAGED_TAG: &str = "kgrid/managed";
