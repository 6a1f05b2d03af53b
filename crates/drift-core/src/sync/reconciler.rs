//! Three-way reconciliation
//!
//! Pure decision logic over `(local observation, remote observation,
//! baseline)`. The baseline is the last recorded `(local_hash, remote_hash)`
//! pair; it defines what "changed since last sync" means for each side.

use crate::models::{FileState, SyncDirection};
use crate::remote::RemoteObject;

/// What the scanner or watcher observed on disk for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalObservation {
    pub hash: String,
    pub size: i64,
    /// Unix ms
    pub mtime: i64,
}

/// The action reconciliation settles on for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Nothing to transfer; the baseline may still need updating
    None,
    Upload,
    Download,
    DeleteRemote,
    DeleteLocal,
    Conflict,
}

/// Decide the action for one path, before direction policy.
pub fn decide(
    local: Option<&LocalObservation>,
    remote: Option<&RemoteObject>,
    baseline: Option<&FileState>,
) -> SyncAction {
    match (local, remote) {
        (None, None) => SyncAction::None,

        (Some(local), None) => {
            // Present only locally. Only a baseline that saw the object on
            // the remote side can mean "remote deleted it"; a pending row
            // from an unfinished upload is still just a new file.
            match baseline {
                Some(b)
                    if b.remote_hash.is_some()
                        && b.local_hash.as_deref() == Some(local.hash.as_str()) =>
                {
                    SyncAction::DeleteLocal
                }
                _ => SyncAction::Upload,
            }
        }

        (None, Some(remote)) => match baseline {
            // Never seen before, or never present locally (an unfinished
            // download): fetch it.
            None => SyncAction::Download,
            Some(b) if b.local_hash.is_none() => SyncAction::Download,
            Some(b) => {
                if b.remote_hash.as_deref() == Some(remote.etag.as_str()) {
                    // Local deletion of a file the remote hasn't touched.
                    SyncAction::DeleteRemote
                } else {
                    // Deleted here, modified there.
                    SyncAction::Conflict
                }
            }
        },

        (Some(local), Some(remote)) => {
            if local.hash == remote.etag {
                return SyncAction::None;
            }
            let local_changed =
                baseline.and_then(|b| b.local_hash.as_deref()) != Some(local.hash.as_str());
            let remote_changed =
                baseline.and_then(|b| b.remote_hash.as_deref()) != Some(remote.etag.as_str());
            match (local_changed, remote_changed) {
                (true, false) => SyncAction::Upload,
                (false, true) => SyncAction::Download,
                // Both diverged, or a previously recorded divergence that
                // never converged: either way the sides disagree.
                _ => SyncAction::Conflict,
            }
        }
    }
}

/// Filter an action through the folder's direction policy.
///
/// `upload_only` never touches the local tree and `download_only` never
/// touches the remote; actions that would are replaced by the transfer that
/// reasserts the authoritative side.
pub fn apply_direction(action: SyncAction, direction: SyncDirection) -> SyncAction {
    match direction {
        SyncDirection::Bidirectional => action,
        SyncDirection::UploadOnly => match action {
            SyncAction::Download => SyncAction::None,
            SyncAction::DeleteLocal => SyncAction::Upload,
            SyncAction::Conflict => SyncAction::Upload,
            other => other,
        },
        SyncDirection::DownloadOnly => match action {
            SyncAction::Upload => SyncAction::None,
            SyncAction::DeleteRemote => SyncAction::Download,
            SyncAction::Conflict => SyncAction::Download,
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(hash: &str) -> LocalObservation {
        LocalObservation {
            hash: hash.to_string(),
            size: 1,
            mtime: 1_000,
        }
    }

    fn remote(etag: &str) -> RemoteObject {
        RemoteObject {
            key: "x.txt".to_string(),
            size: 1,
            etag: etag.to_string(),
            mtime: Some(1_000),
        }
    }

    fn baseline(local_hash: Option<&str>, remote_hash: Option<&str>) -> FileState {
        let mut state = FileState::pending(1, "x.txt");
        state.local_hash = local_hash.map(str::to_string);
        state.remote_hash = remote_hash.map(str::to_string);
        state
    }

    #[test]
    fn new_local_file_uploads() {
        assert_eq!(decide(Some(&local("h1")), None, None), SyncAction::Upload);
    }

    #[test]
    fn new_remote_object_downloads() {
        assert_eq!(decide(None, Some(&remote("h1")), None), SyncAction::Download);
    }

    #[test]
    fn equal_hashes_need_nothing() {
        assert_eq!(
            decide(Some(&local("h1")), Some(&remote("h1")), None),
            SyncAction::None
        );
    }

    #[test]
    fn local_change_uploads() {
        let b = baseline(Some("h0"), Some("h0"));
        assert_eq!(
            decide(Some(&local("h1")), Some(&remote("h0")), Some(&b)),
            SyncAction::Upload
        );
    }

    #[test]
    fn remote_change_downloads() {
        let b = baseline(Some("h0"), Some("h0"));
        assert_eq!(
            decide(Some(&local("h0")), Some(&remote("h2")), Some(&b)),
            SyncAction::Download
        );
    }

    #[test]
    fn divergent_changes_conflict() {
        let b = baseline(Some("h0"), Some("h0"));
        assert_eq!(
            decide(Some(&local("h1")), Some(&remote("h2")), Some(&b)),
            SyncAction::Conflict
        );
    }

    #[test]
    fn both_present_without_baseline_conflict() {
        assert_eq!(
            decide(Some(&local("h1")), Some(&remote("h2")), None),
            SyncAction::Conflict
        );
    }

    #[test]
    fn local_deletion_propagates() {
        let b = baseline(Some("h0"), Some("h0"));
        assert_eq!(
            decide(None, Some(&remote("h0")), Some(&b)),
            SyncAction::DeleteRemote
        );
    }

    #[test]
    fn deleted_here_modified_there_conflicts() {
        let b = baseline(Some("h0"), Some("h0"));
        assert_eq!(
            decide(None, Some(&remote("h2")), Some(&b)),
            SyncAction::Conflict
        );
    }

    #[test]
    fn remote_deletion_propagates() {
        let b = baseline(Some("h0"), Some("h0"));
        assert_eq!(
            decide(Some(&local("h0")), None, Some(&b)),
            SyncAction::DeleteLocal
        );
    }

    #[test]
    fn remote_deletion_of_changed_local_reuploads() {
        let b = baseline(Some("h0"), Some("h0"));
        assert_eq!(
            decide(Some(&local("h1")), None, Some(&b)),
            SyncAction::Upload
        );
    }

    #[test]
    fn pending_upload_baseline_does_not_delete_local() {
        // A scan recorded the new file but the upload hasn't run yet; the
        // baseline matches the local hash with no remote side.
        let b = baseline(Some("h1"), None);
        assert_eq!(
            decide(Some(&local("h1")), None, Some(&b)),
            SyncAction::Upload
        );
    }

    #[test]
    fn pending_download_baseline_does_not_delete_remote() {
        let b = baseline(None, Some("h1"));
        assert_eq!(
            decide(None, Some(&remote("h1")), Some(&b)),
            SyncAction::Download
        );
    }

    #[test]
    fn gone_on_both_sides_clears() {
        let b = baseline(Some("h0"), Some("h0"));
        assert_eq!(decide(None, None, Some(&b)), SyncAction::None);
    }

    #[test]
    fn upload_only_never_mutates_local() {
        assert_eq!(
            apply_direction(SyncAction::Download, SyncDirection::UploadOnly),
            SyncAction::None
        );
        assert_eq!(
            apply_direction(SyncAction::DeleteLocal, SyncDirection::UploadOnly),
            SyncAction::Upload
        );
        assert_eq!(
            apply_direction(SyncAction::Conflict, SyncDirection::UploadOnly),
            SyncAction::Upload
        );
        assert_eq!(
            apply_direction(SyncAction::DeleteRemote, SyncDirection::UploadOnly),
            SyncAction::DeleteRemote
        );
    }

    #[test]
    fn download_only_never_mutates_remote() {
        assert_eq!(
            apply_direction(SyncAction::Upload, SyncDirection::DownloadOnly),
            SyncAction::None
        );
        assert_eq!(
            apply_direction(SyncAction::DeleteRemote, SyncDirection::DownloadOnly),
            SyncAction::Download
        );
        assert_eq!(
            apply_direction(SyncAction::Conflict, SyncDirection::DownloadOnly),
            SyncAction::Download
        );
    }

    #[test]
    fn bidirectional_passes_through() {
        for action in [
            SyncAction::Upload,
            SyncAction::Download,
            SyncAction::DeleteRemote,
            SyncAction::DeleteLocal,
            SyncAction::Conflict,
        ] {
            assert_eq!(apply_direction(action, SyncDirection::Bidirectional), action);
        }
    }
}
