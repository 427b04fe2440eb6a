pub mod client;
pub mod collection;
pub mod overview;
pub mod resources;
pub mod session;
pub mod state;

pub use client::{ApiClient, Auth, AuthEvent};
pub use collection::{CollectionError, CollectionResult, RemoteCollection};
pub use overview::DashboardOverview;
pub use session::{LoginError, SessionError, SessionManager, SessionSnapshot};
pub use state::AppState;
