#![allow(unused_imports)]

//! Database models, one file per table.
//! Re-exported at `crate::db::models` so repositories can `use crate::db::models::*;`.

pub mod crop;
pub mod device_token;
pub mod notification_log;
pub mod notification_settings;
pub mod task;
pub mod user;

pub use self::crop::*;
pub use self::device_token::*;
pub use self::notification_log::*;
pub use self::notification_settings::*;
pub use self::task::*;
pub use self::user::*;
