pub mod comment_service;
pub mod community_service;
pub mod post_service;
pub mod user_service;
pub mod vote_service;
