use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::engine::CoreError;

/// Position in the visible list. `generation` ties the cursor to one filter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Cursor {
  pub index: u64,
  pub generation: u64,
}

pub(crate) fn encode_cursor(c: Cursor) -> String {
  let json = serde_json::to_vec(&c).unwrap_or_default();
  base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
}

/// `None` or an empty token means the top of the list.
pub(crate) fn decode_cursor(token: Option<&str>) -> Result<Option<Cursor>, CoreError> {
  match token {
    None => Ok(None),
    Some(t) if t.is_empty() => Ok(None),
    Some(t) => {
      let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(t)
        .map_err(|e| CoreError::BadCursor(e.to_string()))?;
      let c: Cursor =
        serde_json::from_slice(&bytes).map_err(|e| CoreError::BadCursor(e.to_string()))?;
      Ok(Some(c))
    }
  }
}
