pub mod actor_model;
pub mod genre_model;
pub mod hall_model;
pub mod performance_model;
pub mod play_model;
pub mod reservation_model;
pub mod user_model;
