//! Handlers that mirror submission events into the legacy tables.

use serde::Deserialize;
use tracing::{debug, info};

use super::schema::{
    submission_type_id, SUBMISSION_STATUS_ACTIVE, SUBMISSION_STATUS_DELETED,
    UPLOAD_STATUS_ACTIVE, UPLOAD_STATUS_DELETED, UPLOAD_TYPE_FINAL_FIX, UPLOAD_TYPE_SUBMISSION,
};
use crate::idgen::IdGenerators;
use crate::service::{EventEnvelope, EventService, HandlerError};
use crate::sql::Params;
use crate::store::{ConnectionPool, TxContext};

pub const CREATE_TOPIC: &str = "submission.notification.create";
pub const DELETE_TOPIC: &str = "submission.notification.delete";
pub const URL_UPDATE_TOPIC: &str = "submission.notification.url-update";

const INSERT_UPLOAD: &str = "insert into upload (upload_id, project_id, project_phase_id, \
    resource_id, upload_type_id, upload_status_id, parameter, url, create_user, create_date, \
    modify_user, modify_date) values (@uploadId@, @challengeId@, @phaseId@, @resourceId@, \
    @uploadType@, @uploadStatusId@, @parameter@, @url@, @createUser@, @createDate@, \
    @modifyUser@, @modifyDate@)";

const INSERT_SUBMISSION: &str = "insert into submission (submission_id, upload_id, \
    submission_status_id, submission_type_id, create_user, create_date, modify_user, \
    modify_date) values (@submissionId@, @uploadId@, @submissionStatusId@, \
    @submissionTypeId@, @createUser@, @createDate@, @modifyUser@, @modifyDate@)";

const INSERT_RESOURCE_SUBMISSION: &str = "insert into resource_submission (resource_id, \
    submission_id, create_user, create_date, modify_user, modify_date) values (@resourceId@, \
    @submissionId@, @createUser@, @createDate@, @modifyUser@, @modifyDate@)";

const DELETE_EARLIER_UPLOADS: &str = "update upload set upload_status_id = @deleted@ \
    where project_id = @challengeId@ and resource_id = @resourceId@ and upload_id <> @uploadId@";

const DELETE_EARLIER_SUBMISSIONS: &str = "update submission set submission_status_id = @deleted@ \
    where upload_id in (select upload_id from upload where project_id = @challengeId@ \
    and resource_id = @resourceId@ and upload_status_id = @uploadDeleted@)";

const SELECT_SUBMISSION_UPLOAD: &str =
    "select upload_id from submission where submission_id = @submissionId@";

const DELETE_UPLOAD_BY_ID: &str =
    "update upload set upload_status_id = @deleted@ where upload_id = @uploadId@";

const DELETE_SUBMISSION_BY_ID: &str =
    "update submission set submission_status_id = @deleted@ where submission_id = @submissionId@";

const UPDATE_UPLOAD_URL: &str =
    "update upload set url = @url@, modify_date = @modifyDate@ where upload_id = @uploadId@";

/// Shared resources of the submission handlers.
pub struct SubmissionStore {
    pool: ConnectionPool,
    ids: IdGenerators,
    upload_sequence: String,
    submission_sequence: String,
}

impl SubmissionStore {
    pub fn new(
        pool: ConnectionPool,
        upload_sequence: impl Into<String>,
        submission_sequence: impl Into<String>,
    ) -> Self {
        Self {
            ids: IdGenerators::new(pool.clone()),
            pool,
            upload_sequence: upload_sequence.into(),
            submission_sequence: submission_sequence.into(),
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn ids(&self) -> &IdGenerators {
        &self.ids
    }
}

/// Build the event service with every submission handler registered.
pub fn service(store: SubmissionStore) -> EventService<SubmissionStore> {
    EventService::new(store)
        .on(CREATE_TOPIC, create_submission)
        .on(DELETE_TOPIC, delete_submission)
        .on(URL_UPDATE_TOPIC, update_submission_url)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    /// Id assigned by the submission API.
    pub id: String,
    pub challenge_id: i64,
    pub member_id: i64,
    pub resource_id: i64,
    pub submission_phase_id: i64,
    pub url: String,
    #[serde(rename = "type")]
    pub submission_type: String,
    /// Creation time, stored verbatim in the audit columns.
    pub created: String,
    #[serde(default)]
    pub final_fix: bool,
    #[serde(default)]
    pub allow_multiple: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRef {
    pub legacy_submission_id: i64,
    #[serde(default)]
    pub url: Option<String>,
}

/// Insert the upload (and, unless it is a final fix, the submission) for a
/// new submission.
///
/// Ids are drawn before the write transaction opens: a block refill runs
/// its own transaction, and the store admits one writer at a time.
pub fn create_submission(
    store: &SubmissionStore,
    envelope: &EventEnvelope,
) -> Result<(), HandlerError> {
    let payload: NewSubmission = envelope.payload()?;
    let submission_type = submission_type_id(&payload.submission_type).ok_or_else(|| {
        HandlerError::Rejected(format!("unknown submission type {}", payload.submission_type))
    })?;

    let upload_id = store.ids.next_id(&store.upload_sequence)?;
    let submission_id = if payload.final_fix {
        None
    } else {
        Some(store.ids.next_id(&store.submission_sequence)?)
    };

    info!(
        submission = %payload.id,
        challenge_id = payload.challenge_id,
        resource_id = payload.resource_id,
        upload_id,
        submission_id = ?submission_id,
        "adding legacy submission"
    );

    store.pool.transaction(|ctx| {
        let audit = |params: Params| {
            params
                .bind("createUser", payload.member_id.to_string())
                .bind("createDate", payload.created.as_str())
                .bind("modifyUser", payload.member_id.to_string())
                .bind("modifyDate", payload.created.as_str())
        };

        let upload_type = match submission_id {
            Some(_) => UPLOAD_TYPE_SUBMISSION,
            None => UPLOAD_TYPE_FINAL_FIX,
        };
        ctx.query(
            INSERT_UPLOAD,
            Some(&audit(
                Params::new()
                    .bind("uploadId", upload_id)
                    .bind("challengeId", payload.challenge_id)
                    .bind("phaseId", payload.submission_phase_id)
                    .bind("resourceId", payload.resource_id)
                    .bind("uploadType", upload_type)
                    .bind("uploadStatusId", UPLOAD_STATUS_ACTIVE)
                    .bind("parameter", "N/A")
                    .bind("url", payload.url.as_str()),
            )),
        )?;

        let Some(submission_id) = submission_id else {
            debug!(upload_id, "final fix, upload only");
            return Ok(());
        };

        ctx.query(
            INSERT_SUBMISSION,
            Some(&audit(
                Params::new()
                    .bind("submissionId", submission_id)
                    .bind("uploadId", upload_id)
                    .bind("submissionStatusId", SUBMISSION_STATUS_ACTIVE)
                    .bind("submissionTypeId", submission_type),
            )),
        )?;
        ctx.query(
            INSERT_RESOURCE_SUBMISSION,
            Some(&audit(
                Params::new()
                    .bind("resourceId", payload.resource_id)
                    .bind("submissionId", submission_id),
            )),
        )?;

        if !payload.allow_multiple {
            retire_earlier(ctx, &payload, upload_id)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn retire_earlier(ctx: &mut TxContext, payload: &NewSubmission, upload_id: i64) -> crate::Result<()> {
    debug!(
        challenge_id = payload.challenge_id,
        resource_id = payload.resource_id,
        upload_id,
        "deleting earlier submissions"
    );
    let scope = Params::new()
        .bind("challengeId", payload.challenge_id)
        .bind("resourceId", payload.resource_id);
    ctx.query(
        DELETE_EARLIER_UPLOADS,
        Some(
            &scope
                .clone()
                .bind("uploadId", upload_id)
                .inline("deleted", UPLOAD_STATUS_DELETED.to_string()),
        ),
    )?;
    ctx.query(
        DELETE_EARLIER_SUBMISSIONS,
        Some(
            &scope
                .inline("deleted", SUBMISSION_STATUS_DELETED.to_string())
                .inline("uploadDeleted", UPLOAD_STATUS_DELETED.to_string()),
        ),
    )?;
    Ok(())
}

fn upload_of(ctx: &mut TxContext, submission_id: i64) -> crate::Result<Option<i64>> {
    let rows = ctx.query(
        SELECT_SUBMISSION_UPLOAD,
        Some(&Params::new().bind("submissionId", submission_id)),
    )?;
    Ok(rows
        .first()
        .and_then(|row| row.first())
        .and_then(|value| value.as_i64()))
}

/// Mark a legacy submission and its upload deleted.
pub fn delete_submission(
    store: &SubmissionStore,
    envelope: &EventEnvelope,
) -> Result<(), HandlerError> {
    let payload: SubmissionRef = envelope.payload()?;
    let submission_id = payload.legacy_submission_id;

    let found = store.pool.transaction(|ctx| {
        let Some(upload_id) = upload_of(ctx, submission_id)? else {
            return Ok(false);
        };
        ctx.query(
            DELETE_UPLOAD_BY_ID,
            Some(
                &Params::new()
                    .bind("uploadId", upload_id)
                    .inline("deleted", UPLOAD_STATUS_DELETED.to_string()),
            ),
        )?;
        ctx.query(
            DELETE_SUBMISSION_BY_ID,
            Some(
                &Params::new()
                    .bind("submissionId", submission_id)
                    .inline("deleted", SUBMISSION_STATUS_DELETED.to_string()),
            ),
        )?;
        Ok(true)
    })?;

    if !found {
        return Err(HandlerError::NotFound(format!("submission {}", submission_id)));
    }
    info!(submission_id, "legacy submission deleted");
    Ok(())
}

/// Point the upload behind a legacy submission at a new URL.
pub fn update_submission_url(
    store: &SubmissionStore,
    envelope: &EventEnvelope,
) -> Result<(), HandlerError> {
    let payload: SubmissionRef = envelope.payload()?;
    let submission_id = payload.legacy_submission_id;
    let url = payload
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| HandlerError::Rejected("url is required".into()))?;

    let found = store.pool.transaction(|ctx| {
        let Some(upload_id) = upload_of(ctx, submission_id)? else {
            return Ok(false);
        };
        ctx.query(
            UPDATE_UPLOAD_URL,
            Some(
                &Params::new()
                    .bind("url", url.as_str())
                    .bind("modifyDate", envelope.timestamp.as_str())
                    .bind("uploadId", upload_id),
            ),
        )?;
        Ok(true)
    })?;

    if !found {
        return Err(HandlerError::NotFound(format!("submission {}", submission_id)));
    }
    info!(submission_id, "legacy upload url updated");
    Ok(())
}
