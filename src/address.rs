//! Sender address extraction.
//!
//! Inbound messages carry a `From` header of the form `Name <user@host>`.
//! Replies go to the bare address between the angle brackets.

use thiserror::Error;

/// The sender header did not have the `Name <address>` shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressFormatError {
    /// Zero or several `<` in the header.
    #[error("IMF parse failure: expected exactly one '<' in sender {0:?}")]
    OpeningBracket(String),

    /// Zero or several `>` after the `<`.
    #[error("IMF parse failure: expected exactly one '>' in sender {0:?}")]
    ClosingBracket(String),
}

/// Extract the bare address from a `Name <user@host>` sender header.
///
/// Splitting on `<` must give exactly two segments, and splitting the
/// second one on `>` must again give exactly two. Anything before the `<`
/// and after the `>` is ignored.
pub fn extract_address(sender: &str) -> Result<&str, AddressFormatError> {
    let mut fields = sender.split('<');
    let (Some(_), Some(rest), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(AddressFormatError::OpeningBracket(sender.to_string()));
    };

    let mut parts = rest.split('>');
    let (Some(address), Some(_), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AddressFormatError::ClosingBracket(sender.to_string()));
    };

    Ok(address)
}
