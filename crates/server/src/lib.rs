pub mod auth;
pub mod bootstrap;
pub mod commands;
pub mod dispatch;
pub mod health;
pub mod intake;
pub mod locks;
pub mod relay;
pub mod routes;
pub mod scheduling;
pub mod state;

#[cfg(test)]
mod test_support;
