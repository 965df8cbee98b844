pub mod countdown;
pub mod events;
pub mod models;

pub use countdown::*;
pub use events::*;
pub use models::*;
