pub mod availability_sync;
pub mod booking;
pub mod bootstrap;
pub mod clock;
pub mod commands;
pub mod logs;
pub mod polling;
pub mod session;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_support;
