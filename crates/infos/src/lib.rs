//! Infos module: typed pieces of information and the notifications that carry them.

pub mod info;
pub mod info_definition;
pub mod notification;

pub use info::Info;
pub use info_definition::InfoDefinition;
pub use notification::{Notification, NotificationType};
