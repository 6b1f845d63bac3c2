//! Zip step: stream every raw object into one archive uploaded in a single
//! pass.
//!
//! The archive is written on a blocking thread into one end of an in-memory
//! pipe while the storage backend drains the other end as a multipart upload,
//! so memory use is bounded by the pipe capacity rather than the archive size.

use std::collections::HashSet;
use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use anyhow::{anyhow, Context, Result};
use futures::TryStreamExt;
use propmedia_core::models::{JobAsset, ZipInput, ZipOutput};
use propmedia_core::Clock;
use propmedia_storage::keys::{archive_entry_name, strip_date_segments, zip_object_key};
use propmedia_storage::Storage;
use tokio::io::{AsyncRead, DuplexStream, ReadBuf};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::io::{StreamReader, SyncIoBridge};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const PIPE_CAPACITY: usize = 256 * 1024;
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// One object to place in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ArchiveEntry {
    key: String,
    name: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct ArchiveStats {
    entries: i64,
    unzipped_bytes: i64,
}

/// Entry name for a thumbnail derivative: `thumbnails/{media}/{orientation}/{resolution}/{file}`.
fn thumbnail_entry_name(key: &str) -> String {
    let relative = match key.split_once("processed/") {
        Some((_, rest)) => rest,
        None => key,
    };
    format!(
        "{}/{}",
        THUMBNAILS_DIR,
        strip_date_segments(relative).trim_start_matches('/')
    )
}

/// Empty keys and repeated entry names are dropped; the zip format rejects
/// duplicate names.
fn plan_entries(assets: &[JobAsset], thumbnails: &[JobAsset]) -> Vec<ArchiveEntry> {
    let raw = assets
        .iter()
        .map(|a| (a.key.trim(), archive_entry_name(a.key.trim())));
    let thumbs = thumbnails
        .iter()
        .map(|a| (a.key.trim(), thumbnail_entry_name(a.key.trim())));

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (key, name) in raw.chain(thumbs) {
        if key.is_empty() {
            continue;
        }
        if !seen.insert(name.clone()) {
            tracing::warn!(key, entry = %name, "Skipping duplicate archive entry");
            continue;
        }
        entries.push(ArchiveEntry {
            key: key.to_string(),
            name,
        });
    }
    entries
}

/// Reader half of the pipe. End of stream is only reported once the archive
/// writer has finished cleanly; if it failed, the upload sees its error
/// instead of a truncated archive.
struct ArchiveReader {
    inner: DuplexStream,
    outcome: Option<oneshot::Receiver<String>>,
}

impl AsyncRead for ArchiveReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if buf.filled().len() == before && buf.remaining() > 0 => {}
            other => return other,
        }

        let Some(outcome) = self.outcome.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        match Pin::new(outcome).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(error)) => {
                self.outcome = None;
                Poll::Ready(Err(io::Error::other(error)))
            }
            // Sender dropped without reporting: the archive is complete.
            Poll::Ready(Err(_)) => {
                self.outcome = None;
                Poll::Ready(Ok(()))
            }
        }
    }
}

/// Writes every entry into a streaming archive on `sink`. Runs on a blocking
/// thread; object downloads are driven through `handle`.
fn write_archive<W: Write>(
    handle: &Handle,
    storage: &dyn Storage,
    entries: &[ArchiveEntry],
    sink: W,
) -> Result<ArchiveStats> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new_stream(sink);
    let mut stats = ArchiveStats::default();

    for entry in entries {
        let stream = handle
            .block_on(storage.download_stream(&entry.key))
            .with_context(|| format!("Failed to download {}", entry.key))?;
        let reader = StreamReader::new(stream.map_err(io::Error::other));
        let mut reader = SyncIoBridge::new_with_handle(reader, handle.clone());

        zip.start_file(entry.name.clone(), options)
            .with_context(|| format!("Failed to start entry {}", entry.name))?;
        let copied = io::copy(&mut reader, &mut zip)
            .with_context(|| format!("Failed to archive {}", entry.key))?;

        stats.entries += 1;
        stats.unzipped_bytes += copied as i64;
        tracing::debug!(key = %entry.key, entry = %entry.name, bytes = copied, "Entry archived");
    }

    zip.finish().context("Failed to finish archive")?;
    Ok(stats)
}

pub struct ZipWorker {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl ZipWorker {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Builds `{listing}/zip/complete_{batch}_{ts}.zip` from the raw assets
    /// plus any thumbnails. Without assets nothing is uploaded.
    #[tracing::instrument(skip(self, input), fields(job_id = input.job_id, listing_identity_id = input.listing_identity_id))]
    pub async fn run(&self, input: &ZipInput) -> Result<ZipOutput> {
        let entries = plan_entries(&input.assets, &input.thumbnails);
        if entries.is_empty() {
            tracing::warn!("No assets to archive");
            return Ok(ZipOutput::default());
        }

        let bundle_id = input.batch_id.unwrap_or(input.job_id);
        let zip_key = zip_object_key(
            input.listing_identity_id,
            bundle_id,
            self.clock.now().timestamp(),
        );

        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (report, outcome) = oneshot::channel::<String>();
        let storage = self.storage.clone();
        let handle = Handle::current();
        let producer = tokio::task::spawn_blocking(move || {
            let sink = SyncIoBridge::new_with_handle(writer, handle.clone());
            let result = write_archive(&handle, storage.as_ref(), &entries, sink);
            // The pipe is closed here; the reader holds back EOF until this outcome arrives.
            if let Err(e) = &result {
                let _ = report.send(format!("{:#}", e));
            }
            result
        });

        let reader = ArchiveReader {
            inner: reader,
            outcome: Some(outcome),
        };
        let uploaded = self
            .storage
            .upload_stream(&zip_key, "application/zip", Box::pin(reader))
            .await;

        let produced = producer
            .await
            .map_err(|e| anyhow!("Archive task panicked: {}", e))?;
        let (stats, zip_size) = match (produced, uploaded) {
            (Err(e), _) => return Err(e.context("Failed to build archive")),
            (Ok(_), Err(e)) => {
                return Err(anyhow::Error::new(e).context(format!("Failed to upload {}", zip_key)))
            }
            (Ok(stats), Ok(written)) => (stats, written as i64),
        };

        tracing::info!(
            zip_key = %zip_key,
            assets_zipped = stats.entries,
            zip_size_bytes = zip_size,
            unzipped_size_bytes = stats.unzipped_bytes,
            "Archive uploaded"
        );

        Ok(ZipOutput {
            zip_key: zip_key.clone(),
            assets_zipped: stats.entries,
            zip_bundles: vec![zip_key],
            zip_size_bytes: zip_size,
            unzipped_size_bytes: stats.unzipped_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;
    use propmedia_core::FixedClock;
    use propmedia_storage::ObjectStoreStorage;
    use std::io::{Cursor, Read};

    fn worker(storage: Arc<ObjectStoreStorage>) -> ZipWorker {
        let clock = FixedClock::new(chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        ZipWorker::new(storage, Arc::new(clock))
    }

    #[test]
    fn test_plan_entries() {
        let entries = plan_entries(
            &[
                JobAsset::new("12/raw/photo/vertical/2024-01-02/a.jpg", "PHOTO_VERTICAL"),
                JobAsset::new(" ", "PHOTO_VERTICAL"),
                JobAsset::new("12/raw/photo/vertical/a.jpg", "PHOTO_VERTICAL"),
            ],
            &[JobAsset::new("12/processed/photo/vertical/thumbnail/a.jpg", "THUMBNAIL")],
        );
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["photo/vertical/a.jpg", "thumbnails/photo/vertical/thumbnail/a.jpg"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_archive_is_streamed_and_uploaded() {
        let storage = Arc::new(ObjectStoreStorage::memory());
        let a = "12/raw/photo/vertical/2024-01-02/a.jpg";
        let b = "12/raw/photo/vertical/2024-01-02/b.jpg";
        let large: Vec<u8> = (0..600_000u32).map(|i| (i % 251) as u8).collect();
        storage.upload(a, Bytes::from(large.clone()), "image/jpeg").await.unwrap();
        storage.upload(b, Bytes::from_static(b"bbbb"), "image/jpeg").await.unwrap();
        let thumb = "12/processed/photo/vertical/thumbnail/a.jpg";
        storage.upload(thumb, Bytes::from_static(b"tt"), "image/jpeg").await.unwrap();

        let input = ZipInput {
            job_id: 40,
            listing_identity_id: 12,
            batch_id: Some(6),
            assets: vec![JobAsset::new(a, "PHOTO_VERTICAL"), JobAsset::new(b, "PHOTO_VERTICAL")],
            thumbnails: vec![JobAsset::new(thumb, "THUMBNAIL")],
        };
        let out = worker(storage.clone()).run(&input).await.unwrap();

        let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().timestamp();
        assert_eq!(out.zip_key, format!("12/zip/complete_6_{}.zip", ts));
        assert_eq!(out.zip_bundles, vec![out.zip_key.clone()]);
        assert_eq!(out.assets_zipped, 3);
        assert_eq!(out.unzipped_size_bytes, 600_000 + 4 + 2);

        let data = storage.download(&out.zip_key).await.unwrap();
        assert_eq!(out.zip_size_bytes, data.len() as i64);

        let mut archive = zip::ZipArchive::new(Cursor::new(data.to_vec())).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "photo/vertical/a.jpg",
                "photo/vertical/b.jpg",
                "thumbnails/photo/vertical/thumbnail/a.jpg",
            ]
        );
        let mut content = Vec::new();
        archive
            .by_name("photo/vertical/a.jpg")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, large);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missing_object_fails_without_uploading() {
        let storage = Arc::new(ObjectStoreStorage::memory());
        let present = "3/raw/photo/vertical/a.jpg";
        storage.upload(present, Bytes::from_static(b"aaaa"), "image/jpeg").await.unwrap();

        let input = ZipInput {
            job_id: 8,
            listing_identity_id: 3,
            assets: vec![
                JobAsset::new(present, "PHOTO_VERTICAL"),
                JobAsset::new("3/raw/photo/vertical/missing.jpg", "PHOTO_VERTICAL"),
            ],
            ..Default::default()
        };
        let err = worker(storage.clone()).run(&input).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to download 3/raw/photo/vertical/missing.jpg"));

        let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().timestamp();
        assert!(storage.head(&format!("3/zip/complete_8_{}.zip", ts)).await.is_err());
    }

    #[tokio::test]
    async fn test_no_assets_uploads_nothing() {
        let storage = Arc::new(ObjectStoreStorage::memory());
        let out = worker(storage).run(&ZipInput::default()).await.unwrap();
        assert!(out.zip_key.is_empty());
        assert!(out.zip_bundles.is_empty());
        assert_eq!(out.assets_zipped, 0);
    }
}
