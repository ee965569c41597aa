//! The pre-step: uploading the packaged tags parameters file.

use stagehand_core::{Answers, SubTask, TagsList, TaskUnit};
use stagehand_storage::{payload_from_bytes, ObjectStore};
use std::sync::Arc;
use tracing::debug;

/// Title of the tags pre-step in the task tree.
pub const TAGS_PRE_STEP_TITLE: &str = "Packaging tags parameters";

/// Object key of the tags file under a prefix.
pub fn tags_key(prefix: &str) -> String {
    match prefix.trim_matches('/') {
        "" => "parameters/tags.json".to_string(),
        prefix => format!("{prefix}/parameters/tags.json"),
    }
}

/// Build the pre-step uploading the answers' custom tags.
///
/// Parsing happens when the step runs, so malformed tags fail the pre-step
/// rather than the caller.
pub fn tags_upload_step(store: Arc<dyn ObjectStore>, answers: &Answers, prefix: &str) -> TaskUnit {
    let raw = answers.custom_tags.clone().unwrap_or_default();
    let bucket = answers.s3.bucket.clone();
    let key = tags_key(prefix);

    let step = SubTask::new(format!("Uploading {key}"), async move {
        let tags = TagsList::parse(&raw)?;
        let body = serde_json::to_vec(&tags.as_json_file())?;
        store.upload_stream(&bucket, &key, payload_from_bytes(body)).await?;
        debug!("Uploaded {} tags to {}/{}", tags.tags().len(), bucket, key);
        Ok(())
    });

    TaskUnit::new(TAGS_PRE_STEP_TITLE, vec![step])
}
