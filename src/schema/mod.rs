pub mod context;
pub mod dialogs;
pub mod response;
