//! Organization Operator - CRD-driven multi-tenancy for Kubernetes
//!
//! The operator maintains a two-level tenancy hierarchy: an `Organization` owns a
//! shared namespace holding its `Space` records, and every `Space` gets a dedicated
//! namespace with RBAC bindings derived from both levels.
//!
//! # Architecture
//!
//! Every controller is a level-triggered convergence loop:
//! - An Organization converges its spaces namespace, two scope roles and their bindings.
//!   All of them carry an owner reference, so deletion cascades natively.
//! - A Space converges its dedicated namespace and three bindings. Namespaces are
//!   cluster-scoped, so the Space cannot own them; a finalizer gates deletion instead.
//! - Objects outside the ownership graph are mapped back to their Space through
//!   back-reference labels.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Organization, Space)
//! - [`controller`] - Reconcilers, convergence primitive, finalizer protocol
//! - [`webhook`] - Mutating admission webhook that injects the Space finalizer
//! - [`naming`] - Deterministic names for derived namespaces
//! - [`labels`] - Back-reference labels and namespace label merging
//! - [`controller_runner`] - Wires reconcilers into `kube::runtime::Controller`s
//! - [`config`] - Command line / environment configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`retry`] - Backoff policy shared by startup tasks and the requeue policy
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod controller_runner;
pub mod crd;
pub mod error;
pub mod labels;
pub mod naming;
pub mod retry;
pub mod telemetry;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of the Organization and Space CRDs
pub const API_GROUP: &str = "k8s.suse.com";

/// API version of the Organization and Space CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Field manager used for server-side apply at startup
pub const FIELD_MANAGER: &str = "organization-operator";
