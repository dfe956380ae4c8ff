//! Command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::container::AppContainer;
use crate::app::download_interactor::Media;
use crate::app::{DownloadOptions, DownloadResult, ProbeInteractor};
use crate::cli::args::{FetchArgs, FormatsArgs, ProbeArgs};
use crate::domain::model::FormatCatalog;
use crate::streams::ByteSource;

/// Execute the fetch command
pub async fn fetch(container: &dyn AppContainer, args: FetchArgs, cancel: CancellationToken) -> Result<()> {
    info!("Fetching {}", args.url);

    let mut options = DownloadOptions::new(args.url)
        .with_codecs(args.codecs)
        .with_retranscode(args.retranscode)
        .with_cancel(cancel);
    if let Some(format) = args.format {
        options = options.with_format(format);
    }

    let DownloadResult { media, gate } = container
        .download_interactor()
        .download(options)
        .await
        .context("Download failed")?;
    let Media {
        filename,
        mime_type,
        reader,
    } = media;

    let target = args.output.unwrap_or_else(|| PathBuf::from(&filename));
    let to_stdout = target == Path::new("-");
    info!("Writing {} ({}) to {}", filename, mime_type, target.display());

    let written = if to_stdout {
        write_stdout(reader).await
    } else {
        write_file(reader, &target).await
    };
    let finished = gate.wait().await;

    if (finished.is_err() || written.is_err()) && !to_stdout {
        if let Err(e) = tokio::fs::remove_file(&target).await {
            warn!("Could not remove partial output {}: {}", target.display(), e);
        }
    }
    finished.context("Download failed")?;
    let bytes = written?;

    info!("Wrote {} bytes to {}", bytes, target.display());
    Ok(())
}

async fn write_stdout(mut reader: ByteSource) -> Result<u64> {
    let mut stdout = tokio::io::stdout();
    let bytes = tokio::io::copy(&mut reader, &mut stdout)
        .await
        .context("Failed to write to stdout")?;
    stdout.flush().await?;
    Ok(bytes)
}

async fn write_file(mut reader: ByteSource, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    let bytes = tokio::io::copy(&mut reader, &mut file)
        .await
        .with_context(|| format!("Failed to write output file {}", path.display()))?;
    file.flush().await?;
    Ok(bytes)
}

/// Execute the formats command
pub fn formats(container: &dyn AppContainer, args: FormatsArgs) -> Result<()> {
    let catalog = container.catalog();
    println!("{}", render_formats(&catalog, args.json)?);
    Ok(())
}

/// Catalog listing, one format per line or as JSON
pub fn render_formats(catalog: &FormatCatalog, as_json: bool) -> Result<String> {
    if as_json {
        let formats: Vec<_> = catalog
            .formats()
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "ext": f.ext,
                    "mime_type": f.mime_type,
                    "containers": f.formats.iter().collect::<Vec<_>>(),
                    "streams": f.streams.iter().map(|s| json!({
                        "media": s.media,
                        "optional": s.optional,
                        "codecs": s.codecs.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&formats)?);
    }

    let lines: Vec<String> = catalog
        .formats()
        .iter()
        .map(|f| {
            let streams: Vec<String> = f
                .streams
                .iter()
                .map(|s| {
                    let codecs: Vec<&str> = s.codecs.iter().map(|c| c.name.as_str()).collect();
                    let optional = if s.optional { "?" } else { "" };
                    format!("{}{}={}", s.media, optional, codecs.join("|"))
                })
                .collect();
            format!("{:<6} .{:<5} {:<18} {}", f.name, f.ext, f.mime_type, streams.join(" "))
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Execute the probe command
pub async fn probe(container: &dyn AppContainer, args: ProbeArgs, cancel: CancellationToken) -> Result<()> {
    let info = container
        .probe_interactor()
        .probe(&args.input, &cancel)
        .await
        .with_context(|| format!("Failed to probe {}", args.input))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", ProbeInteractor::summary(&info));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::default_catalog;

    #[test]
    fn test_render_formats() {
        let catalog = default_catalog().unwrap();

        let text = render_formats(&catalog, false).unwrap();
        let mp3 = text.lines().find(|l| l.starts_with("mp3")).unwrap();
        assert!(mp3.contains("audio/mpeg"));
        assert!(mp3.contains("audio=mp3"));

        let parsed: serde_json::Value = serde_json::from_str(&render_formats(&catalog, true).unwrap()).unwrap();
        assert_eq!(parsed[0]["name"], "mp3");
        assert_eq!(parsed[0]["streams"][0]["media"], "audio");
    }
}
