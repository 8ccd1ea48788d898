//! Gradio space discovery and proxying.
//!
//! This crate resolves hosted Gradio spaces into MCP tool surfaces and
//! mediates tool invocations against them:
//!
//! - space identifier parsing (`owner/name` lists)
//! - a two-level TTL cache (space metadata + tool schemas) with ETag
//!   revalidation
//! - parallel discovery with per-space failure isolation
//! - outward tool-name synthesis and input-schema projection
//! - per-call upstream MCP sessions with progress relay
//! - response post-processing (image stripping, URL extraction)

pub mod cache;
pub mod config;
pub mod discovery;
pub mod hub;
pub mod naming;
pub mod postprocess;
pub mod projection;
pub mod proxy;
pub mod schema;
pub mod space_id;

pub use cache::{CacheStats, MetadataCache, SchemaCache, TtlCache};
pub use config::DiscoveryConfig;
pub use discovery::{DiscoveryOptions, GradioSpace, SpaceDiscovery};
pub use hub::{HubSpaceClient, SpaceInfoFetcher, SpaceInfoResponse, SpaceMetadata, SpaceRuntime};
pub use proxy::{ProgressSink, SpaceToolUpstream};
pub use schema::{SchemaFetcher, SpaceSchemaClient, ToolDescriptor, HF_AUTH_HEADER};
pub use space_id::SpaceId;
