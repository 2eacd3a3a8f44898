mod assignment;
mod common;
mod reminders;
