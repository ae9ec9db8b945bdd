//! W3C WebDriver implementation of the page capability.

pub mod client;
pub mod errors;
pub mod protocol;

use serde_json::{Value, json};

pub use client::WebDriverPage;
pub use errors::WebDriverError;

/// Capabilities for a Chrome session.
pub fn chrome_capabilities(headless: bool) -> Value {
    let mut args = vec!["--window-size=1280,1024"];
    if headless {
        args.push("--headless=new");
    }
    json!({
        "browserName": "chrome",
        "pageLoadStrategy": "normal",
        "goog:chromeOptions": { "args": args },
    })
}
