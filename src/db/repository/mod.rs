pub mod crop;
pub mod device_token;
pub mod notification_log;
pub mod notification_settings;
pub mod task;
pub mod user;

pub use crop::CropRepository;
pub use device_token::DeviceTokenRepository;
pub use notification_log::NotificationLogRepository;
pub use notification_settings::NotificationSettingsRepository;
pub use task::TaskRepository;
pub use user::UserRepository;
