use georef::GeoRefError;
use std::error::Error;

/// Maps a fjall error onto the index error type, logging it first.
pub(crate) fn to_georef_error(error: impl Error) -> GeoRefError {
    let error_msg = error.to_string();
    log::error!("Fjall error: {}", error_msg);
    if error_msg.contains("closed") || error_msg.contains("poisoned") {
        GeoRefError::Closed
    } else {
        GeoRefError::Store(format!("Fjall Error: {}", error_msg))
    }
}
