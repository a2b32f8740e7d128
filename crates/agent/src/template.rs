//! Prompt rendering with Tera.
//!
//! Templates use Tera syntax (`{{ name }}`, `{{ a.b }}`, filters, loops) and
//! are rendered against any serializable object. Autoescaping is off: prompts
//! are plain text.

use agentry_core::error::{Error, Result};
use serde::Serialize;
use std::error::Error as _;
use tera::{Context, Tera};

const INLINE: &str = "inline_template";

/// Render `template` with the fields of `data`.
///
/// `data` must serialize to an object. Syntax errors and unknown variables
/// are configuration errors.
pub fn render<T: Serialize + ?Sized>(template: &str, data: &T) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template(INLINE, template).map_err(config_error)?;
    let context = Context::from_serialize(data).map_err(config_error)?;
    tera.render(INLINE, &context).map_err(config_error)
}

/// Tera keeps the useful part (which variable, which line) in the source chain.
fn config_error(err: tera::Error) -> Error {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    Error::config(message)
}
