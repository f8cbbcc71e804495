pub mod auction;
pub mod cookie_sync;
pub mod params;
pub mod statics;
pub mod usersync;
pub mod utils;
pub mod validate;
