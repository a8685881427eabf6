pub mod cli;
pub mod config;
pub mod database;
pub mod listing;
pub mod models;
pub mod planner;
pub mod reminder;
pub mod rescheduler;
pub mod store;
pub mod utils;

pub use config::Config;
pub use database::Database;
pub use models::{Notification, Session, Task};
pub use planner::{ReschedulePolicy, TaskPlanner};
pub use reminder::{LogScheduler, ReminderScheduler};
pub use store::TaskStore;
pub use utils::Profile;
