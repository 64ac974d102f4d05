pub mod approval;
pub mod request;
pub mod session;
pub mod template;
