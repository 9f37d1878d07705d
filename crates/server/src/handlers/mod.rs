//! OSB request handlers.

pub mod actions;
pub mod bindings;
pub mod catalog;
pub mod health;
pub mod instances;

pub use actions::rotate_credentials;
pub use bindings::{bind, get_binding, unbind};
pub use catalog::get_catalog;
pub use health::health_check;
pub use instances::{deprovision, last_operation, provision, update};
