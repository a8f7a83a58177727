pub mod aggregation;
pub mod app_service;
pub mod matching;
pub mod month_window;
pub mod resolver;

pub use app_service::AppIntelService;
pub use matching::{score_name_match, MatchThresholds};
pub use month_window::resolve_month_window;
pub use resolver::{AppReference, IdentifierResolver, Purpose, ResolveMode};
