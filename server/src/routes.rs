use std::{path::PathBuf, sync::Arc};

use actix_multipart::Multipart;
use actix_web::{get, http::StatusCode, post, web, HttpResponse, Responder};
use futures_util::StreamExt as _;
use log::{info, warn};

use crate::{
    analysis::{orchestrator::spawn_analysis, VideoBackend},
    files::{allowed_file, save_stream, stored_name, UploadError},
    payloads::*,
    store::{new_submission_id, ProgressStore},
};

pub struct SharedCtx {
    pub store: Arc<ProgressStore>,
    pub backend: Arc<dyn VideoBackend>,
    pub storage_root: PathBuf,
    pub max_upload_bytes: u64,
    pub delete_after_analysis: bool,
}

#[get("/")]
async fn slash() -> impl Responder {
    HttpResponse::Ok().body("framescope: POST a video to /upload, then poll /progress/{id}")
}

type NewUploadResp = ErrorablePayload<NewUploadResponse>;

#[post("/upload")]
async fn new_upload(ctx: web::Data<SharedCtx>, payload: Multipart) -> impl Responder {
    match accept_upload(&ctx, payload).await {
        Ok(upload) => NewUploadResp::Ok(upload),
        Err(e) => {
            warn!("upload rejected: {e}");
            NewUploadResp::from(e)
        }
    }
    .to_response(StatusCode::CREATED)
}

/// Stores the `file` field and starts its analysis. The record is only
/// created once the file is safely on disk, so a rejected upload leaves no
/// trace in the store.
async fn accept_upload(
    ctx: &SharedCtx,
    mut payload: Multipart,
) -> Result<UploadInformation, UploadError> {
    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| UploadError::Malformed(e.to_string()))?;
        if field.name() != Some("file") {
            while field.next().await.is_some() {}
            continue;
        }
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();
        if filename.is_empty() {
            return Err(UploadError::NoFilename);
        }
        if !allowed_file(&filename) {
            return Err(UploadError::InvalidType);
        }

        let id = new_submission_id();
        let path = ctx.storage_root.join(stored_name(&id, &filename));
        let size = save_stream(&path, &mut field, ctx.max_upload_bytes).await?;
        info!("stored {filename} as {} ({size} bytes)", path.display());

        let writer = ctx.store.create(id.clone());
        spawn_analysis(
            Arc::clone(&ctx.backend),
            path,
            writer,
            ctx.delete_after_analysis,
        );
        return Ok(UploadInformation {
            success: true,
            file_id: id,
            filename,
        });
    }
    Err(UploadError::NoFile)
}

type ProgressResp = ErrorablePayload<ProgressResponse>;

#[get("/progress/{file_id}")]
async fn get_progress(ctx: web::Data<SharedCtx>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match ctx.store.snapshot(&id) {
        Some(record) => ProgressResp::Ok(record),
        None => ProgressResp::NotFound,
    }
    .to_response(StatusCode::OK)
}

type ResultsResp = ErrorablePayload<ResultsResponse>;

#[get("/results/{file_id}")]
async fn get_results(ctx: web::Data<SharedCtx>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match ctx.store.results(&id) {
        Some(results) => ResultsResp::Ok(results),
        None => ResultsResp::NotFound,
    }
    .to_response(StatusCode::OK)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(slash)
        .service(new_upload)
        .service(get_progress)
        .service(get_results);
}
