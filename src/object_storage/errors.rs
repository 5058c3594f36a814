use thiserror::Error;

#[derive(Clone, Error, Debug, PartialEq)]
pub enum ObjectStorageError {
    #[error("Invalid object-store link path `{path}`: {raw_error_message}.")]
    InvalidLinkPath { path: String, raw_error_message: String },

    #[error("Cannot head object `{key}` in bucket `{bucket_name}`: {raw_error_message}.")]
    CannotHeadObject {
        bucket_name: String,
        key: String,
        raw_error_message: String,
    },

    #[error("Object `{key}` not found in bucket `{bucket_name}`.")]
    ObjectNotFound { bucket_name: String, key: String },

    #[error("Cannot get object `{key}` error in `{bucket_name}`: {raw_error_message}.")]
    CannotGetObjectFile {
        bucket_name: String,
        key: String,
        raw_error_message: String,
    },

    #[error("Cannot upload object `{key}` error in `{bucket_name}`: {raw_error_message}.")]
    CannotUploadFile {
        bucket_name: String,
        key: String,
        raw_error_message: String,
    },

    #[error("Cannot delete object `{key}` error in `{bucket_name}`: {raw_error_message}.")]
    CannotDeleteFile {
        bucket_name: String,
        key: String,
        raw_error_message: String,
    },

    #[error("Cannot copy object `{src_key}` in `{src_bucket}` to `{dst_key}` in `{dst_bucket}`: {raw_error_message}.")]
    CannotCopyFile {
        src_bucket: String,
        src_key: String,
        dst_bucket: String,
        dst_key: String,
        raw_error_message: String,
    },

    #[error("Cannot presign URL for object `{key}` in `{bucket_name}`: {raw_error_message}.")]
    CannotPresignUrl {
        bucket_name: String,
        key: String,
        raw_error_message: String,
    },
}
