//! kgrid-kube — talking to a provisioned cluster.
//!
//! Callers hold only a kubeconfig string; [`KubeClient`] materializes it per
//! call. [`Kubectl`] is the subprocess implementation.

pub mod client;
pub mod error;
pub mod manifests;
pub mod namespaces;
pub mod nodes;

pub use client::{KubeClient, Kubectl, kubeconfig_file};
pub use error::{KubeError, KubeResult};
pub use manifests::{aws_auth_config_map, default_storage_class, strip_role_path};
pub use namespaces::{Namespace, NamespaceList};
pub use nodes::{Node, NodeCondition, NodeList};
