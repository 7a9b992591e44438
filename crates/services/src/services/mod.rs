pub mod analytics;
pub mod auth;
pub mod progression;
pub mod registry;
pub mod roster;
pub mod template;

pub use auth::Principal;
pub use progression::{AdvanceOutcome, ProgressionService};
pub use registry::RegistryService;
pub use roster::RosterService;
pub use template::StopTemplate;
