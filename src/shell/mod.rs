pub mod tray;
pub mod unread;
pub mod window;
