pub mod auth;
pub mod comments;
pub mod communities;
pub mod posts;
pub mod users;
