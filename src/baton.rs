//! Session continuation token.

use std::fmt;

/// Opaque baton returned by the server, binding the next batch to the same
/// server-side stream.
///
/// A `Baton` is only produced by decoding a response that carried a non-empty
/// baton, so holding one means the stream it names has not been closed yet.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Baton(String);

impl Baton {
    pub(crate) fn from_response(value: Option<String>) -> Option<Self> {
        value.filter(|baton| !baton.is_empty()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Only a short prefix is printed.
impl fmt::Debug for Baton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "Baton({prefix}…)")
    }
}
