//! Routes and field names of the analysis service.

use crate::types::ResultId;

pub const ANALYZE_PATH: &str = "/analyze";
pub const ANALYZE_REALTIME_PATH: &str = "/analyze_realtime";
pub const SAVE_RESULT_PATH: &str = "/save_result";
pub const LOGIN_PATH: &str = "/login";

/// Multipart field carrying the image on both analyze routes.
pub const IMAGE_FIELD: &str = "image";
/// File name attached to captured frames.
pub const FRAME_FILE_NAME: &str = "frame.jpg";

pub fn delete_result_path(id: ResultId) -> String {
    format!("/delete_result/{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_path_embeds_id() {
        assert_eq!(delete_result_path(ResultId(17)), "/delete_result/17");
    }
}
