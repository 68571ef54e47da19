//! CBOR helpers shared by every serialized structure in the workspace.

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    errors::{ProtocolError, Result},
    messages::MAX_MESSAGE_SIZE,
};

/// Serialize `value` to a CBOR byte vector.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a CBOR value, rejecting inputs above [`MAX_MESSAGE_SIZE`]
/// before the parser runs.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: bytes.len(), max: MAX_MESSAGE_SIZE });
    }

    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
