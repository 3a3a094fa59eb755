mod telegram;
mod telegraph;

pub use telegram::{Message, TelegramClient};
pub use telegraph::TelegraphClient;
