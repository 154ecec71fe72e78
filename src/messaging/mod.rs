// Messaging between background work and the presentation layer

pub mod channels;
pub mod notification;

pub use channels::{
    NotificationConsumer, NotificationProducer, SharedNotificationProducer,
    create_notification_channel,
};
pub use notification::{Notification, NotificationCategory, NotificationLevel};
