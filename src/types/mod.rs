pub mod api;

pub use api::{
    CreateAccountRequest, DropAccountRequest, MessageResponse, RegisterRequest, TokenRequest,
    TokenResponse, UpdateRequest,
};
