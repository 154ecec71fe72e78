// Lock-free channels between worker threads, the document context and the UI

use crate::messaging::notification::Notification;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};
use std::sync::{Arc, Mutex};

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

/// Producer side shared by every document of a session
pub type SharedNotificationProducer = Arc<Mutex<NotificationProducer>>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Push a notification, returns false if the ring buffer is full
pub fn publish(producer: &SharedNotificationProducer, notification: Notification) -> bool {
    match producer.lock() {
        Ok(mut producer) => producer.try_push(notification).is_ok(),
        Err(_) => false,
    }
}

/// Pop everything currently queued
pub fn drain(consumer: &mut NotificationConsumer) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Some(notification) = consumer.try_pop() {
        notifications.push(notification);
    }
    notifications
}
