pub mod auth;
pub mod json_body;

pub use auth::RequireKeyAuth;
pub use json_body::JsonBody;
