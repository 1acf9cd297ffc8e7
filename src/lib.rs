pub mod commands;
pub mod data;
pub mod handlers;
pub mod logging;
pub mod modlog;

pub const BOT_NAME: &str = "case_ledger";
pub const COMMAND_TARGET: &str = "case_ledger::command";
pub const ERROR_TARGET: &str = "case_ledger::error";
pub const EVENT_TARGET: &str = "case_ledger::handlers";
pub const CONSOLE_TARGET: &str = "case_ledger";
pub const LEDGER_TARGET: &str = "case_ledger::ledger";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
