use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use common::{data::Phase, hash_file};
use log::{error, info, warn};

use super::{
    frames::analyze_frames, metadata::extract_metadata, preview::extract_preview, VideoBackend,
};
use crate::store::ProgressWriter;

/// Runs every stage for one upload, in order, on the calling thread.
///
/// Metadata and preview failures only degrade their own result. Hash and
/// frame failures stop the pipeline and leave the record in the error state,
/// keeping whatever results were already written.
pub fn run_analysis(backend: &dyn VideoBackend, path: &Path, mut writer: ProgressWriter) {
    let id = writer.id().to_string();
    info!("analysis {id} started for {}", path.display());

    writer.set_phase(Phase::ExtractingMetadata);
    let metadata = extract_metadata(backend, path);
    writer.finish_metadata(metadata);

    writer.set_phase(Phase::Hashing);
    match hash_file(path, |p| writer.set_hash_progress(p)) {
        Ok(hash) => writer.finish_hash(hash),
        Err(e) => {
            error!("analysis {id} failed while hashing: {e}");
            writer.fail(e.to_string());
            return;
        }
    }

    writer.set_phase(Phase::SamplingFrames);
    match analyze_frames(backend, path, |p| writer.set_frame_progress(p)) {
        Ok(frames) => writer.finish_frames(frames),
        Err(e) => {
            error!("analysis {id} failed while sampling frames: {e}");
            writer.fail(e.to_string());
            return;
        }
    }

    writer.set_phase(Phase::ExtractingPreview);
    writer.finish_preview(extract_preview(backend, path));

    writer.complete();
    info!("analysis {id} complete");
}

/// Hands the analysis to the blocking pool and returns straight away. There is
/// no handle to join or cancel.
pub fn spawn_analysis(
    backend: Arc<dyn VideoBackend>,
    path: PathBuf,
    writer: ProgressWriter,
    delete_after: bool,
) {
    tokio::task::spawn_blocking(move || {
        run_analysis(backend.as_ref(), &path, writer);
        if delete_after {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("could not remove analysed upload {}: {e}", path.display());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use common::data::{MetadataResult, Status};

    use super::*;
    use crate::{
        analysis::testing::FakeBackend,
        store::{new_submission_id, ProgressStore},
    };

    fn video_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        f.write_all(content).unwrap();
        f
    }

    #[test]
    fn full_run_completes_with_every_result() {
        let file = video_file(b"not really a video");
        let backend = FakeBackend::with_levels(vec![10, 128, 250]);
        let store = ProgressStore::new();
        let writer = store.create(new_submission_id());
        let id = writer.id().to_string();

        run_analysis(&backend, file.path(), writer);

        let rec = store.snapshot(&id).unwrap();
        assert_eq!(rec.status, Status::Complete);
        assert!(rec.metadata_done);
        assert_eq!(rec.hash_progress, 100.0);
        assert_eq!(rec.frame_progress, 100.0);
        assert!(matches!(rec.results.metadata, Some(MetadataResult::Extracted(_))));
        assert_eq!(rec.results.hash.unwrap().file_size, 18);
        let frames = rec.results.frames.unwrap();
        assert_eq!(frames.summary.dark_count, 1);
        assert_eq!(frames.summary.normal_count, 0);
        assert!(rec.results.preview_frame.is_some());
    }

    #[test]
    fn metadata_failure_does_not_fail_the_analysis() {
        let file = video_file(b"x");
        let mut backend = FakeBackend::with_levels(vec![100]);
        backend.probe = Err(common::AnalysisError::Decode("bad header".to_string()));
        let store = ProgressStore::new();
        let writer = store.create(new_submission_id());
        let id = writer.id().to_string();

        run_analysis(&backend, file.path(), writer);

        let rec = store.snapshot(&id).unwrap();
        assert_eq!(rec.status, Status::Complete);
        assert!(matches!(rec.results.metadata, Some(MetadataResult::Failed { .. })));
    }

    #[test]
    fn frame_failure_stops_the_pipeline_but_keeps_earlier_results() {
        let file = video_file(b"abc");
        let mut backend = FakeBackend::with_levels(vec![100]);
        backend.fail_open = true;
        let store = ProgressStore::new();
        let writer = store.create(new_submission_id());
        let id = writer.id().to_string();

        run_analysis(&backend, file.path(), writer);

        let rec = store.snapshot(&id).unwrap();
        let Status::Error { message } = &rec.status else {
            panic!("expected error, got {:?}", rec.status);
        };
        assert!(message.contains("could not open video"));
        assert!(rec.results.metadata.is_some());
        assert!(rec.results.hash.is_some());
        assert!(rec.results.frames.is_none());
        assert!(rec.results.preview_frame.is_none());
        assert_eq!(rec.frame_progress, 0.0);
    }

    #[test]
    fn unreadable_file_fails_at_the_hash_stage() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::with_levels(vec![100]);
        let store = ProgressStore::new();
        let writer = store.create(new_submission_id());
        let id = writer.id().to_string();

        run_analysis(&backend, &dir.path().join("gone.mp4"), writer);

        let rec = store.snapshot(&id).unwrap();
        assert!(matches!(rec.status, Status::Error { .. }));
        assert!(rec.metadata_done);
        assert!(rec.results.hash.is_none());
        assert!(backend.reads().is_empty());
    }

    #[test]
    fn missing_preview_still_completes() {
        let file = video_file(b"abc");
        let mut backend = FakeBackend::with_levels(vec![]);
        backend.reported_frames = Some(50);
        let store = ProgressStore::new();
        let writer = store.create(new_submission_id());
        let id = writer.id().to_string();

        run_analysis(&backend, file.path(), writer);

        let rec = store.snapshot(&id).unwrap();
        assert_eq!(rec.status, Status::Complete);
        assert!(rec.results.preview_frame.is_none());
        assert_eq!(rec.results.frames.unwrap().total_frames, 50);
    }
}
