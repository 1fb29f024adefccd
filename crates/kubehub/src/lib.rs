//! Tron kubehub: the cluster API seam, its kube-rs implementation, and Gateway API discovery

#![forbid(unsafe_code)]

pub mod client;
pub mod cluster;
pub mod gateway;
pub mod mock;

pub use client::{ClusterConfig, KubeCluster, CLUSTER_TOKEN_ENV, CLUSTER_URL_ENV, INSECURE_TLS_ENV};
pub use cluster::{Cluster, ClusterError, ObjectTarget, ResourceType};
pub use gateway::{find_gateway_reference, gateway_api_available, gateway_api_kinds, is_route, route_types, GATEWAY_GROUP};
pub use mock::{Call, MockCluster, Verb};
