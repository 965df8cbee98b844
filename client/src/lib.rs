pub mod clock;
pub mod config;
pub mod dashboard;
pub mod listener;
pub mod loader;
pub mod membership;
pub mod mutation;
pub mod panels;
pub mod state;
pub mod store;
pub mod view;
