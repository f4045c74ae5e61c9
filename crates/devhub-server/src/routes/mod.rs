pub mod children;
pub mod events;
pub mod projects;
