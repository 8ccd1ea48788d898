//! Application layer: built-in tool catalog, tool-selection strategy, user
//! settings, token validation, and the per-request server factory that
//! assembles a scoped gateway server from all of them.

pub mod auth;
pub mod bouquets;
pub mod catalog;
pub mod factory;
pub mod headers;
pub mod hub_api;
pub mod selection;
pub mod server;
pub mod settings;

pub use auth::{AuthOutcome, HubTokenValidator, TokenValidator, UserIdentity};
pub use factory::{RequestScope, ServerFactory};
pub use headers::{ClientIdentity, JobTimeout, McpHeaders};
pub use selection::{SelectionMode, SelectionResult};
pub use server::GatewayServer;
pub use settings::{ResolvedSettings, SettingsProvider, SettingsSource, UserSettings};
