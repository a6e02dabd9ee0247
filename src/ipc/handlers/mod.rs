pub mod attendance;
pub mod backup;
pub mod core;
pub mod documents;
pub mod home_visits;
pub mod leaves;
pub mod locations;
pub mod users;
