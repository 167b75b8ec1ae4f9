//! `tinyrepo pull`: download an artifact from a running server.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION};
use tokio::io::AsyncWriteExt;
use tracing::info;

use tinyrepo_common::ArtifactVersionSpec;

#[derive(Args, Debug)]
pub struct PullArgs {
    /// `namespace/name/version`; the version may be `latest` or omitted.
    pub artifact: ArtifactVersionSpec,
    /// Base URL of the server, e.g. `http://localhost:8080`.
    #[arg(long, env = "TINYREPO_ADDRESS")]
    pub address: String,
    #[arg(long, env = "TINYREPO_TOKEN", hide_env_values = true)]
    pub token: String,
    /// Destination file. Defaults to the filename the server suggests.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub async fn run(args: PullArgs) -> anyhow::Result<()> {
    let url = artifact_url(&args.address, &args.artifact);
    let resp = reqwest::Client::new()
        .get(&url)
        .header(AUTHORIZATION, format!("Bearer {}", args.token))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("Download of {} failed ({}): {}", args.artifact, status, body);
    }

    let output = match args.output {
        Some(path) => path,
        None => {
            let suggested = resp
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(disposition_filename);
            PathBuf::from(suggested.unwrap_or_else(|| args.artifact.artifact.name.clone()))
        }
    };

    let written = save_stream(&output, resp.bytes_stream()).await?;

    info!(artifact = %args.artifact, path = %output.display(), bytes = written, "Pulled artifact");
    Ok(())
}

/// Write `stream` to a temporary file beside `output` and move it into place
/// once the whole body has arrived. A failed transfer leaves `output` as it was.
async fn save_stream<S, B, E>(output: &Path, stream: S) -> anyhow::Result<u64>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let (file, temp_path) = tempfile::Builder::new()
        .prefix(".tinyrepo-pull-")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?
        .into_parts();

    let mut file = tokio::fs::File::from_std(file);
    let mut stream = std::pin::pin!(stream);
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed while reading response body")?;
        file.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    temp_path
        .persist(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(written)
}

fn artifact_url(address: &str, spec: &ArtifactVersionSpec) -> String {
    let base = address.trim_end_matches('/');
    if base.contains("://") {
        format!("{}/{}", base, spec)
    } else {
        format!("http://{}/{}", base, spec)
    }
}

/// The `filename` parameter of a Content-Disposition header, reduced to its
/// final path component.
fn disposition_filename(header: &str) -> Option<String> {
    let value = header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?;

    let value = match value.strip_prefix('"') {
        Some(quoted) => quoted.strip_suffix('"').unwrap_or(quoted).replace("\\\"", "\""),
        None => value.to_string(),
    };

    Path::new(&value)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}
