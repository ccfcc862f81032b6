pub mod ai;
pub mod attachments;
pub mod content;
pub mod error;
pub mod health;
pub mod providers;
pub mod publish;
pub mod schedules;
