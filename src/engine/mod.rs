mod database;
mod view_manager;

pub use database::{Database, DatabaseConfig};
pub use view_manager::ViewManager;
