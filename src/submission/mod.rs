//! Submission events mirrored into the legacy `upload` / `submission`
//! tables.
//!
//! | topic                                 | effect                                   |
//! | ------------------------------------- | ---------------------------------------- |
//! | `submission.notification.create`      | insert upload + submission, retire older |
//! | `submission.notification.delete`      | mark submission and upload deleted       |
//! | `submission.notification.url-update`  | rewrite the upload URL                   |

mod handlers;
mod schema;

pub use handlers::{
    create_submission, delete_submission, service, update_submission_url, NewSubmission,
    SubmissionRef, SubmissionStore, CREATE_TOPIC, DELETE_TOPIC, URL_UPDATE_TOPIC,
};
pub use schema::{
    bootstrap, create_schema, submission_type_id, SUBMISSION_STATUS_ACTIVE,
    SUBMISSION_STATUS_DELETED, UPLOAD_STATUS_ACTIVE, UPLOAD_STATUS_DELETED,
    UPLOAD_TYPE_FINAL_FIX, UPLOAD_TYPE_SUBMISSION,
};
