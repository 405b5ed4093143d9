pub mod cameras;
pub mod health;
