pub mod auth;
pub mod cache;
pub mod debounce;
pub mod grid;
pub mod normalize;
pub mod reconciler;
pub mod remote;
pub mod remote_http;
pub mod review;
pub mod state;
pub mod template;
pub mod types;
pub mod week;
