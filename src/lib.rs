pub mod coach;
pub mod config;
pub mod models;
pub mod phase;
pub mod player;
pub mod rate;
pub mod score;
pub mod session;
pub mod terminal;
pub mod timer;

#[cfg(test)]
mod test_utils;

pub use config::AppConfig;
pub use session::{PhaseResult, WorkoutSession};
pub use terminal::AppError;

/// Load the plan, take over the terminal and run until the player quits
pub async fn run(config: AppConfig) -> Result<Vec<PhaseResult>, AppError> {
  terminal::run(config).await
}
