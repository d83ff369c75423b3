//! Board page and dashboard API

pub mod page;
pub mod server;

pub use page::opening_post;
pub use server::{AppState, DashboardServer};
