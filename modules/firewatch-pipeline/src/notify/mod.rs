pub mod alert;
pub mod fanout;

pub use alert::Alert;
pub use fanout::NotificationFanout;
