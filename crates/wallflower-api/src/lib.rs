pub mod conversations;
pub mod crushes;
pub mod error;
pub mod middleware;
pub mod walls;

use std::sync::Arc;

use wallflower_db::Database;
use wallflower_gateway::EventRouter;
use wallflower_match::MatchEngine;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub engine: Arc<MatchEngine>,
    pub router: EventRouter,
    pub jwt_secret: String,
}
