use super::error::ScoreError;
use super::types::ScoreSubmission;

pub fn validate_submission(submission: &ScoreSubmission) -> Result<(), ScoreError> {
    if submission.username.is_empty() {
        return Err(ScoreError::invalid("username must not be empty"));
    }
    if submission.delta == 0 {
        return Err(ScoreError::invalid("delta must be nonzero"));
    }
    if submission.source.is_empty() {
        return Err(ScoreError::invalid("source must not be empty"));
    }
    Ok(())
}
