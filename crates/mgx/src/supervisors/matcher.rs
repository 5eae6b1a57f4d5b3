//! 🎯 PatternMatcher: "restore every database whose name starts with `alpha`, latest of each."
//!
//! Everything that can be rejected without I/O is rejected without I/O. Then: stat the bucket,
//! list the database "directories", regex each name, locate + restore each match.
//!
//! The regex is a search, not a full match: `alpha` matches `alphatest`. Anchor it if you mean it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backends::ObjectStore;
use crate::common::{BackupPath, child_directories};
use crate::errors::VaultError;
use crate::supervisors::locator::locate_latest;
use crate::supervisors::restorer::{RestoreOrchestrator, RestoreReport};

// -- `bucket` or `bucket/uploadPath`; databases sit one level below
const MAX_MATCH_PATH_DEPTH: usize = 2;

/// 🚦 What to do when one matched database fails to restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop at the first failure.
    #[default]
    AbortOnFirstError,
    /// Try every match, then report the first failure.
    ContinueOnError,
}

/// 🧾 Which databases matched and what got restored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub matched: Vec<String>,
    pub restored: Vec<RestoreReport>,
}

#[derive(Debug)]
pub(crate) struct PatternMatcher<'r, 's, St: ObjectStore> {
    restorer: &'r RestoreOrchestrator<'s, St>,
    policy: ErrorPolicy,
}

impl<'r, 's, St: ObjectStore> PatternMatcher<'r, 's, St> {
    pub(crate) fn new(restorer: &'r RestoreOrchestrator<'s, St>, policy: ErrorPolicy) -> Self {
        Self { restorer, policy }
    }

    /// 🚀 Restore the latest backup of every database under `path` whose name matches `pattern`.
    pub(crate) async fn restore_matching(
        &self,
        path: &BackupPath,
        pattern: &str,
        latest: bool,
    ) -> Result<MatchSummary, VaultError> {
        let regex = validate(path, pattern, latest)?;
        let store = self.restorer.store();

        store
            .stat_bucket(&path.bucket)
            .await
            .map_err(|err| VaultError::StoreListing {
                bucket: path.bucket.clone(),
                prefix: String::new(),
                source: err.into(),
            })?;

        let keys = store
            .list_keys(&path.bucket, &path.key_prefix)
            .await
            .map_err(|err| VaultError::StoreListing {
                bucket: path.bucket.clone(),
                prefix: path.key_prefix.clone(),
                source: err.into(),
            })?;

        let matched: Vec<String> = child_directories(&keys, &path.key_prefix)
            .into_iter()
            .filter(|database| regex.is_match(database))
            .collect();
        if matched.is_empty() {
            warn!("🤷 nothing under {path} matches '{pattern}'");
        }

        let mut summary = MatchSummary {
            matched: matched.clone(),
            restored: Vec::new(),
        };
        let mut first_failure = None;

        for database in matched {
            let database_path = path.child(&database);
            info!("🎯 matching database: {database_path}");
            let attempt = match locate_latest(store, &database_path).await {
                Ok(instance) => self.restorer.restore(&instance).await,
                Err(err) => Err(err),
            };
            match attempt {
                Ok(report) => summary.restored.push(report),
                Err(err) => match self.policy {
                    ErrorPolicy::AbortOnFirstError => return Err(err),
                    ErrorPolicy::ContinueOnError => {
                        warn!("💀 restore of '{database}' failed, moving on: {err}");
                        first_failure.get_or_insert(err);
                    }
                },
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }
}

/// 🙅 Every check that needs no network.
fn validate(path: &BackupPath, pattern: &str, latest: bool) -> Result<Regex, VaultError> {
    if !latest {
        return Err(VaultError::Usage(
            "--match only works together with --latest".to_string(),
        ));
    }
    if pattern.contains('/') {
        return Err(VaultError::Usage(format!(
            "match pattern '{pattern}' must not contain '/'; it is matched against database names"
        )));
    }
    if path.depth() > MAX_MATCH_PATH_DEPTH {
        return Err(VaultError::Usage(format!(
            "'{path}' is too deep for --match; expected bucket or bucket/uploadPath"
        )));
    }
    Regex::new(pattern)
        .map_err(|err| VaultError::Usage(format!("match pattern '{pattern}' is not a valid regex: {err}")))
}
