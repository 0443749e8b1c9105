use anyhow::{anyhow, bail, Result};
use clap::Parser;
use common::{
    allowed_file,
    data::{AnalysisResults, HashResult, MetadataResult, ProgressRecord, Reading, Status},
    hash_file,
    payloads::*,
    ALLOWED_EXTENSIONS,
};
use kdam::{
    term::{self, Colorizer},
    tqdm, BarExt, Column, RichProgress, Spinner,
};
use reqwest::{
    multipart::{Form, Part},
    Body, Client,
};
use serde::de::DeserializeOwned;
use std::{
    error::Error,
    fmt,
    io::{stderr, IsTerminal},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{select, spawn, sync::watch, task::spawn_blocking, time::sleep};
use tokio_util::{io::ReaderStream, sync::CancellationToken};
use url::Url;

#[derive(Clone, Debug)]
enum ClientError {
    ReqwestError(String),
    BadStatusCode(u16),
    JsonDecodeError(String),
    /// The server refused the request. Retrying will not help.
    Rejected(u16, String),
    NotFound,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReqwestError(s) => write!(f, "reqwest error: {s}"),
            Self::BadStatusCode(s) => write!(f, "bad status code {s}"),
            Self::JsonDecodeError(s) => write!(f, "json decode error: {s}"),
            Self::Rejected(code, s) => write!(f, "rejected by server ({code}): {s}"),
            Self::NotFound => write!(f, "the server does not know this file"),
        }
    }
}

impl Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::ReqwestError(format!("{}", value))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonDecodeError(value.to_string())
    }
}

fn is_permanent(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<ClientError>(),
        Some(ClientError::Rejected(..) | ClientError::NotFound)
    )
}

/// Runs a function returning Result in a loop with exponentional backoff.
/// Returns a successful response. Permanent failures are returned as-is,
/// anything else bail!s once the tries run out.
macro_rules! try_something {
    ($a:expr) => {
        const MAX_TRIES: u8 = 7;
        for i in 0..MAX_TRIES {
            match $a {
                Ok(resp) => return Ok(resp),
                Err(e) if is_permanent(&e) => return Err(e),
                Err(e) => {
                    let to_sleep = 1 << i;
                    eprintln!("try {i} failed, sleeping {to_sleep}s: {e:?}");
                    sleep(Duration::from_secs(to_sleep)).await;
                }
            }
        }
        eprintln!("max tries reached; returning error");
        bail!("max tries reached");
    };
}

/// Appends path segments to `base`, whether or not it ends in a slash.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("{base} cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[derive(Debug)]
struct Analysis {
    base_url: Url,
    id: String,
}

impl Analysis {
    /// Processes a response from the server.
    /// This involves checking the status code, decoding the body, etc.
    async fn process_response<Resp: DeserializeOwned + fmt::Debug>(
        input: reqwest::Result<reqwest::Response>,
        expected_status: u16,
    ) -> Result<Resp> {
        let res = input.map_err(ClientError::from)?;
        let status_code = res.status().as_u16();
        let text = res.text().await.map_err(ClientError::from)?;
        if status_code != expected_status {
            let message = match serde_json::from_str::<ErrorablePayload<serde_json::Value>>(&text) {
                Ok(ErrorablePayload::NotFound) => bail!(ClientError::NotFound),
                Ok(ErrorablePayload::Invalid(e) | ErrorablePayload::Err(e)) => e,
                _ => text,
            };
            if (400..500).contains(&status_code) {
                bail!(ClientError::Rejected(status_code, message));
            }
            eprintln!("server said: {message}");
            bail!(ClientError::BadStatusCode(status_code));
        }
        let response: ErrorablePayload<Resp> =
            serde_json::from_str(&text).map_err(ClientError::from)?;
        match response {
            ErrorablePayload::Ok(response_payload) => Ok(response_payload),
            ErrorablePayload::NotFound => Err(anyhow!(ClientError::NotFound)),
            ErrorablePayload::Invalid(e) | ErrorablePayload::Err(e) => {
                Err(anyhow!(ClientError::Rejected(status_code, e)))
            }
        }
    }

    async fn get<Resp: DeserializeOwned + fmt::Debug>(
        client: &Client,
        url: &Url,
        expected_status: u16,
    ) -> Result<Resp> {
        let res = client.get(url.clone()).send().await;
        Self::process_response(res, expected_status).await
    }

    async fn try_get<Resp: DeserializeOwned + fmt::Debug>(
        client: &Client,
        url: Url,
        expected_status: u16,
    ) -> Result<Resp> {
        try_something!(Self::get(client, &url, expected_status).await);
    }

    /// The body is a stream, so every attempt opens the file again.
    async fn upload_form(path: &Path, filename: &str) -> Result<Form> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let body = Body::wrap_stream(ReaderStream::new(file));
        Ok(Form::new().part(
            "file",
            Part::stream_with_length(body, len).file_name(filename.to_string()),
        ))
    }

    async fn post_file<Resp: DeserializeOwned + fmt::Debug>(
        client: &Client,
        url: &Url,
        path: &Path,
        filename: &str,
        expected_status: u16,
    ) -> Result<Resp> {
        let form = Self::upload_form(path, filename).await?;
        let res = client.post(url.clone()).multipart(form).send().await;
        Self::process_response(res, expected_status).await
    }

    async fn try_post_file<Resp: DeserializeOwned + fmt::Debug>(
        client: &Client,
        url: Url,
        path: &Path,
        filename: &str,
        expected_status: u16,
    ) -> Result<Resp> {
        try_something!(Self::post_file(client, &url, path, filename, expected_status).await);
    }

    pub async fn new(client: &Client, base_url: Url, path: &Path, filename: &str) -> Result<Self> {
        let url = endpoint(&base_url, &["upload"])?;
        let response: NewUploadResponse =
            Self::try_post_file(client, url, path, filename, 201).await?;
        if !response.success {
            bail!("server did not accept {}", response.filename);
        }
        Ok(Self {
            base_url,
            id: response.file_id,
        })
    }

    pub async fn progress(&self, client: &Client) -> Result<ProgressResponse> {
        let url = endpoint(&self.base_url, &["progress", &self.id])?;
        Self::try_get(client, url, 200).await
    }

    pub async fn results(&self, client: &Client) -> Result<AnalysisResults> {
        let url = endpoint(&self.base_url, &["results", &self.id])?;
        match Self::try_get(client, url, 200).await? {
            ResultsResponse::Ready(results) => Ok(results),
            ResultsResponse::Pending { .. } => bail!("results are not ready yet"),
        }
    }
}

type StageBars = (RichProgress, RichProgress);

fn stage_bar(label: &str, position: u16) -> RichProgress {
    RichProgress::new(
        tqdm!(total = 100, position = position, unit = "%"),
        vec![
            Column::Spinner(Spinner::new(
                &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"],
                80.0,
                1.0,
            )),
            Column::Text(format!("[bold blue]{label}")),
            Column::Animation,
            Column::Percentage(1),
            Column::Text("•".to_owned()),
        ],
    )
}

fn render(bars: &mut Option<StageBars>, record: &ProgressRecord, prev: &mut String) {
    let status = record.status.to_string();
    if let Some((hash, frames)) = bars.as_mut() {
        for (bar, pct) in [(hash, record.hash_progress), (frames, record.frame_progress)] {
            bar.columns.truncate(5);
            bar.columns.push(Column::Text(status.clone().colorize("green")));
            let _ = bar.update_to(pct.clamp(0.0, 100.0).round() as usize);
        }
    } else if status != *prev {
        eprintln!(
            "Analysis entered status {status} (hash {:.0}%, frames {:.0}%).",
            record.hash_progress, record.frame_progress
        );
        *prev = status;
    }
}

async fn refresh_bars(
    mut bars: Option<StageBars>,
    token: CancellationToken,
    status: watch::Receiver<Option<ProgressRecord>>,
) -> Option<StageBars> {
    let mut timer = tokio::time::interval(Duration::from_millis(100));
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut prev = String::new();
    loop {
        select! {
            _ = timer.tick() => {
                if let Some(record) = status.borrow().as_ref() {
                    render(&mut bars, record, &mut prev);
                }
            }
            _ = token.cancelled() => {
                if let Some(record) = status.borrow().as_ref() {
                    render(&mut bars, record, &mut prev);
                }
                return bars;
            }
        }
    }
}

/// Polls until the analysis reaches a terminal status and returns that record.
async fn watch_progress(
    client: &Client,
    analysis: &Analysis,
    poll_interval: Duration,
    tty: bool,
) -> Result<ProgressRecord> {
    let token = CancellationToken::new();
    let (sender, receiver) = watch::channel(None);
    let bars = tty.then(|| (stage_bar("Hashing", 0), stage_bar("Frames", 1)));
    let f = spawn(refresh_bars(bars, token.clone(), receiver));

    let mut timer = tokio::time::interval(poll_interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let outcome = loop {
        timer.tick().await;
        match analysis.progress(client).await {
            Ok(record) => {
                let done = record.is_terminal();
                sender.send_replace(Some(record.clone()));
                if done {
                    break Ok(record);
                }
            }
            Err(e) => break Err(e),
        }
    };

    token.cancel();
    if let Some((mut hash, mut frames)) = f.await? {
        let _ = hash.clear();
        let _ = frames.clear();
    }
    outcome
}

fn dimensions(width: &Reading<u32>, height: &Reading<u32>) -> String {
    match (width.value(), height.value()) {
        (Some(w), Some(h)) => format!("{w}x{h}"),
        _ => "N/A".to_string(),
    }
}

fn print_summary(id: &str, results: &AnalysisResults, local: &HashResult) {
    println!("File ID:  {id}");
    match &results.metadata {
        Some(MetadataResult::Extracted(meta)) => {
            match &meta.video {
                Some(v) => println!(
                    "Video:    {} {} @ {} fps, {} ms, {} bps, color space {}, {}",
                    v.codec,
                    dimensions(&v.width_px, &v.height_px),
                    v.frame_rate_fps,
                    v.duration_ms,
                    v.bit_rate_bps,
                    v.color_space,
                    v.scan_type
                ),
                None => println!("Video:    no video track"),
            }
            match &meta.audio {
                Some(a) => println!(
                    "Audio:    {} {} Hz, {} channels, {} bps",
                    a.codec, a.sample_rate_hz, a.channels, a.bit_rate_bps
                ),
                None => println!("Audio:    no audio track"),
            }
        }
        Some(MetadataResult::Failed { error }) => println!("Metadata: {error}"),
        None => println!("Metadata: N/A"),
    }
    if let Some(hash) = &results.hash {
        println!("{}:  {}", hash.algorithm, hash.hash);
        println!("Size:     {}", hash.file_size_display);
        let verdict = if hash.hash == local.hash {
            "matches the local file".colorize("green")
        } else {
            format!("does not match the local file ({})", local.hash).colorize("bold red")
        };
        println!("Check:    {verdict}");
    }
    if let Some(frames) = &results.frames {
        let s = &frames.summary;
        println!(
            "Frames:   {} total @ {:.2} fps, {:.2} s",
            frames.total_frames, frames.frame_rate, frames.duration_seconds
        );
        println!(
            "Sampled:  {} of the first {} ({} dark, {} bright, {} normal)",
            s.dark_count + s.bright_count + s.normal_count,
            frames.analysis_limit,
            s.dark_count,
            s.bright_count,
            s.normal_count
        );
        for sample in &frames.dark_frames {
            println!("  dark   frame {:>7}  brightness {:.1}", sample.frame, sample.brightness);
        }
        for sample in &frames.bright_frames {
            println!("  bright frame {:>7}  brightness {:.1}", sample.frame, sample.brightness);
        }
    }
    match &results.preview_frame {
        Some(p) => println!(
            "Preview:  {}x{} {} ({} bytes base64)",
            p.width,
            p.height,
            p.mime_type,
            p.data.len()
        ),
        None => println!("Preview:  none"),
    }
}

async fn analyse_file(client: &Client, args: Args, tty: bool) -> Result<()> {
    let path = PathBuf::from(&args.file);
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?
        .to_string();
    if !allowed_file(&filename) {
        bail!(
            "{filename} is not a supported video (expected one of: {})",
            ALLOWED_EXTENSIONS.join(", ")
        );
    }
    let base_url = Url::parse(&args.base_url)?;

    // The local digest is only needed at the end; compute it while the server works.
    let local_path = path.clone();
    let local_hash = spawn_blocking(move || hash_file(&local_path, |_| {}));

    eprintln!("Uploading {filename}.");
    let analysis = Analysis::new(client, base_url, &path, &filename).await?;
    eprintln!("File ID: {}", &analysis.id);

    let record = watch_progress(
        client,
        &analysis,
        Duration::from_millis(args.poll_interval_ms),
        tty,
    )
    .await?;
    if let Status::Error { message } = &record.status {
        bail!("analysis failed: {message}");
    }

    let results = analysis.results(client).await?;
    let local_hash = local_hash.await??;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_summary(&analysis.id, &results, &local_hash);
    }
    match &results.hash {
        Some(remote) if remote.hash != local_hash.hash => {
            bail!("hash mismatch: server {} != local {}", remote.hash, local_hash.hash)
        }
        _ => Ok(()),
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
struct Args {
    /// Video to upload and analyse.
    pub file: String,

    #[arg(short, long, default_value = "http://127.0.0.1:5001")]
    pub base_url: String,

    /// How often to ask the server for progress.
    #[arg(long, default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// Print the raw results JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let is_tty = stderr().is_terminal();
    term::init(is_tty);
    let args = Args::parse();

    let client = Client::builder()
        .user_agent("framescope-client/0.1")
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .build()?;

    analyse_file(&client, args, is_tty).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_ignore_trailing_slashes() {
        let base = Url::parse("http://localhost:5001").unwrap();
        assert_eq!(
            endpoint(&base, &["progress", "abc"]).unwrap().as_str(),
            "http://localhost:5001/progress/abc"
        );
        let nested = Url::parse("http://localhost/framescope/").unwrap();
        assert_eq!(
            endpoint(&nested, &["upload"]).unwrap().as_str(),
            "http://localhost/framescope/upload"
        );
    }

    #[test]
    fn only_refusals_are_permanent() {
        assert!(is_permanent(&anyhow!(ClientError::NotFound)));
        assert!(is_permanent(&anyhow!(ClientError::Rejected(
            400,
            "Invalid file type".to_string()
        ))));
        assert!(!is_permanent(&anyhow!(ClientError::BadStatusCode(500))));
        assert!(!is_permanent(&anyhow!("connection reset")));
    }

    #[test]
    fn args() {
        use clap::CommandFactory;
        Args::command().debug_assert();
        let args = Args::parse_from(["framescope-client", "clip.mp4", "--json"]);
        assert_eq!(args.base_url, "http://127.0.0.1:5001");
        assert_eq!(args.poll_interval_ms, 500);
        assert!(args.json);
    }
}
