pub mod actor_controller;
pub mod genre_controller;
pub mod hall_controller;
pub mod performance_controller;
pub mod play_controller;
pub mod reservation_controller;
pub mod user_controller;

#[cfg(test)]
pub(crate) mod test_support;
