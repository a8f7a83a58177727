//! Infrastructure layer - upstream HTTP access and request pacing.

pub mod executor;
pub mod intel_client;
pub mod rate_limiter;
pub mod transport;

pub use executor::RequestExecutor;
pub use intel_client::AppIntelClient;
pub use rate_limiter::{shared_limiter, FixedIntervalLimiter};
pub use transport::{HttpTransport, ReqwestTransport, UpstreamRequest, UpstreamResponse};
