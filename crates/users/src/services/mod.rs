//! Cache services in front of the user store.

pub mod user_state;
pub mod writer;

pub use user_state::UserStateCache;
pub use writer::BackgroundWriter;
