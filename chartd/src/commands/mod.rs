pub mod control;
pub mod start;
pub mod status;
pub mod version;

pub use control::{handle_reload, handle_stop};
pub use start::handle_start;
pub use status::handle_status;
pub use version::handle_version;
