//! Concrete page drivers for the reservation engine.

pub mod webdriver;

pub use webdriver::{WebDriverError, WebDriverPage};
