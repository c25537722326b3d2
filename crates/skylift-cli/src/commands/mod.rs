pub mod data;
pub mod destroy;
pub mod launch;
pub mod lifecycle;
pub mod login;
