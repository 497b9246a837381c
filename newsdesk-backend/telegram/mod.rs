pub mod client;
pub mod commands;
pub mod format;
pub mod handlers;
pub mod models;

pub use client::{HttpTelegramClient, TelegramApi};
pub use handlers::BotService;
