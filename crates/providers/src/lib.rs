pub mod cohere;
pub mod registry;
pub mod traits;
pub(crate) mod ndjson;
pub(crate) mod util;

// Re-exports for convenience.
pub use cohere::CohereAdapter;
pub use registry::DeploymentRegistry;
pub use traits::{DeploymentInfo, GenerationAdapter};
pub use util::resolve_api_key;
