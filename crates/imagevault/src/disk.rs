//! Disk-backed image store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;

use crate::table;
use crate::{CallContext, ImageMeta, ImageSink, ImageStore, StoreError};

/// Read-buffer size for the send path. A transport tuning knob, not a
/// protocol guarantee.
const CHUNK_SIZE: usize = 64 * 1024;

/// One indexed image.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// Logical image name (the index key).
    pub name: String,
    /// Filename extension, e.g. `.jpeg`.
    pub ext: String,
    /// Location of the latest persisted content.
    pub path: PathBuf,
    /// Timestamp of the first accepted upload for this name.
    pub created_at: SystemTime,
    /// Timestamp from the most recent accepted upload.
    pub updated_at: SystemTime,
}

/// Stores image files under a single folder, with an in-memory index keyed
/// by logical name.
///
/// The index is not persisted: restarting the process empties it even
/// though the files remain on disk. Nothing deletes entries; re-uploading a
/// name rewrites its file and refreshes `updated_at`, and an upload that
/// changes the extension leaves the old file orphaned.
#[derive(Debug)]
pub struct DiskImageStore {
    image_folder: PathBuf,
    index: RwLock<HashMap<String, ImageRecord>>,
}

impl DiskImageStore {
    /// Store rooted at `image_folder`, which must exist and be writable.
    pub fn new(image_folder: impl Into<PathBuf>) -> Self {
        Self {
            image_folder: image_folder.into(),
            index: RwLock::new(HashMap::new()),
        }
    }

    fn image_path(&self, name: &str, ext: &str) -> PathBuf {
        self.image_folder.join(format!("{name}{ext}"))
    }

    #[cfg(test)]
    async fn record(&self, name: &str) -> Option<ImageRecord> {
        self.index.read().await.get(name).cloned()
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn save(
        &self,
        name: &str,
        ext: &str,
        data: Vec<u8>,
        updated_at: SystemTime,
    ) -> Result<String, StoreError> {
        let path = self.image_path(name, ext);

        // Exclusive for the whole of create + write + upsert: readers never
        // observe an index entry whose file is still being written.
        let mut index = self.index.write().await;

        tracing::debug!(name, path = %path.display(), size = data.len(), "saving image");

        let mut file = File::create(&path).await.map_err(|source| StoreError::Create {
            path: path.clone(),
            source,
        })?;
        file.write_all(&data).await.map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        file.flush().await.map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;

        // Only now is the entry allowed to become visible.
        let created_at = index.get(name).map_or(updated_at, |prev| prev.created_at);
        index.insert(
            name.to_string(),
            ImageRecord {
                name: name.to_string(),
                ext: ext.to_string(),
                path,
                created_at,
                updated_at,
            },
        );

        Ok(name.to_string())
    }

    async fn send(
        &self,
        name: &str,
        sink: &mut dyn ImageSink,
        ctx: &CallContext,
    ) -> Result<(), StoreError> {
        // Shared for the whole send: the record, the file and the header
        // the client sees stay consistent until the last chunk, and
        // concurrent downloads of one image do not serialize.
        let index = self.index.read().await;

        ctx.check()?;

        let record = index.get(name).ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })?;

        sink.info(&ImageMeta {
            name: record.name.clone(),
            ext: record.ext.clone(),
            updated_at: record.updated_at,
        })
        .await?;

        let file = File::open(&record.path).await.map_err(|source| StoreError::Open {
            path: record.path.clone(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            ctx.check()?;

            let n = reader
                .read(&mut buffer)
                .await
                .map_err(|source| StoreError::Read { source })?;
            if n == 0 {
                break;
            }

            ctx.check()?;
            sink.chunk(&buffer[..n]).await?;
        }

        Ok(())
    }

    async fn list(&self, limit: u32) -> String {
        let index = self.index.read().await;

        let limit = if limit == 0 { index.len() } else { limit as usize };
        let rows: Vec<_> = index
            .values()
            .take(limit)
            .map(|record| {
                (
                    format!("{}{}", record.name, record.ext),
                    record.created_at,
                    record.updated_at,
                )
            })
            .collect();

        table::render(&rows)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant, UNIX_EPOCH};

    use super::*;

    /// Sink that collects the header and all chunk bytes.
    #[derive(Default)]
    struct CollectSink {
        meta: Option<ImageMeta>,
        data: Vec<u8>,
    }

    #[async_trait]
    impl ImageSink for CollectSink {
        async fn info(&mut self, meta: &ImageMeta) -> Result<(), StoreError> {
            self.meta = Some(meta.clone());
            Ok(())
        }

        async fn chunk(&mut self, data: &[u8]) -> Result<(), StoreError> {
            self.data.extend_from_slice(data);
            Ok(())
        }
    }

    /// Sink whose receiver disappeared after the first chunk.
    #[derive(Default)]
    struct ClosingSink {
        chunks_taken: usize,
    }

    #[async_trait]
    impl ImageSink for ClosingSink {
        async fn info(&mut self, _meta: &ImageMeta) -> Result<(), StoreError> {
            Ok(())
        }

        async fn chunk(&mut self, _data: &[u8]) -> Result<(), StoreError> {
            if self.chunks_taken >= 1 {
                return Err(StoreError::SinkClosed);
            }
            self.chunks_taken += 1;
            Ok(())
        }
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[tokio::test]
    async fn save_writes_file_and_indexes_it() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());

        let name = store
            .save("laptop", ".jpeg", vec![7u8; 1024], at(1_000))
            .await
            .unwrap();

        assert_eq!(name, "laptop");
        let on_disk = std::fs::read(folder.path().join("laptop.jpeg")).unwrap();
        assert_eq!(on_disk, vec![7u8; 1024]);

        let record = store.record("laptop").await.unwrap();
        assert_eq!(record.ext, ".jpeg");
        assert_eq!(record.created_at, at(1_000));
        assert_eq!(record.updated_at, at(1_000));
    }

    #[tokio::test]
    async fn resave_preserves_created_at_and_refreshes_updated_at() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());

        store.save("laptop", ".jpeg", b"one".to_vec(), at(1_000)).await.unwrap();
        store.save("laptop", ".jpeg", b"two".to_vec(), at(2_000)).await.unwrap();

        let record = store.record("laptop").await.unwrap();
        assert_eq!(record.created_at, at(1_000));
        assert_eq!(record.updated_at, at(2_000));

        let on_disk = std::fs::read(folder.path().join("laptop.jpeg")).unwrap();
        assert_eq!(on_disk, b"two");
    }

    #[tokio::test]
    async fn resave_with_new_extension_orphans_the_old_file() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());

        store.save("laptop", ".jpeg", b"jpeg bytes".to_vec(), at(1_000)).await.unwrap();
        store.save("laptop", ".png", b"png bytes".to_vec(), at(2_000)).await.unwrap();

        let record = store.record("laptop").await.unwrap();
        assert_eq!(record.ext, ".png");
        assert_eq!(record.path, folder.path().join("laptop.png"));

        // The new extension wins; the old file stays behind, orphaned.
        assert!(folder.path().join("laptop.jpeg").exists());

        let mut sink = CollectSink::default();
        store.send("laptop", &mut sink, &CallContext::new()).await.unwrap();
        assert_eq!(sink.data, b"png bytes");
    }

    #[tokio::test]
    async fn save_into_missing_folder_is_a_create_error() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path().join("missing"));

        let err = store
            .save("laptop", ".jpeg", b"data".to_vec(), at(1_000))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Create { .. }));
        assert!(store.record("laptop").await.is_none());
    }

    #[tokio::test]
    async fn send_emits_header_then_exact_bytes() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());

        // Spans multiple read-buffer fills.
        let data: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();
        store.save("laptop", ".jpeg", data.clone(), at(5_000)).await.unwrap();

        let mut sink = CollectSink::default();
        store.send("laptop", &mut sink, &CallContext::new()).await.unwrap();

        let meta = sink.meta.unwrap();
        assert_eq!(meta.name, "laptop");
        assert_eq!(meta.ext, ".jpeg");
        assert_eq!(meta.updated_at, at(5_000));
        assert_eq!(sink.data, data);
    }

    #[tokio::test]
    async fn send_of_unknown_name_is_not_found() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());

        let mut sink = CollectSink::default();
        let err = store
            .send("absent", &mut sink, &CallContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound { ref name } if name == "absent"));
        assert!(sink.meta.is_none());
        assert!(sink.data.is_empty());
    }

    #[tokio::test]
    async fn send_stops_on_cancelled_context() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());
        store.save("laptop", ".jpeg", b"data".to_vec(), at(1_000)).await.unwrap();

        let ctx = CallContext::new();
        ctx.cancel();

        let mut sink = CollectSink::default();
        let err = store.send("laptop", &mut sink, &ctx).await.unwrap_err();

        assert!(matches!(err, StoreError::Canceled));
        // Cancelled before the header: nothing was emitted.
        assert!(sink.meta.is_none());
    }

    #[tokio::test]
    async fn send_stops_on_expired_deadline() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());
        store.save("laptop", ".jpeg", b"data".to_vec(), at(1_000)).await.unwrap();

        let ctx = CallContext::with_deadline(Instant::now() - Duration::from_secs(1));

        let mut sink = CollectSink::default();
        let err = store.send("laptop", &mut sink, &ctx).await.unwrap_err();

        assert!(matches!(err, StoreError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn send_propagates_a_closed_sink() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());

        // Two read-buffer fills, so the second chunk hits the closed sink.
        store
            .save("laptop", ".jpeg", vec![1u8; CHUNK_SIZE + 16], at(1_000))
            .await
            .unwrap();

        let mut sink = ClosingSink::default();
        let err = store
            .send("laptop", &mut sink, &CallContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::SinkClosed));
    }

    #[tokio::test]
    async fn list_renders_all_entries_without_a_limit() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());
        store.save("laptop", ".jpeg", b"a".to_vec(), at(1_000)).await.unwrap();
        store.save("macbook", ".png", b"b".to_vec(), at(2_000)).await.unwrap();

        let table = store.list(0).await;
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Имя файла"));
        assert!(lines.iter().any(|l| l.starts_with("laptop.jpeg")));
        assert!(lines.iter().any(|l| l.starts_with("macbook.png")));
    }

    #[tokio::test]
    async fn list_limit_bounds_the_rows() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());
        for name in ["a", "b", "c"] {
            store.save(name, ".png", b"x".to_vec(), at(1_000)).await.unwrap();
        }

        assert_eq!(store.list(2).await.lines().count(), 3); // header + 2
        assert_eq!(store.list(0).await, store.list(3).await);
        assert_eq!(store.list(0).await, store.list(100).await);
    }

    #[tokio::test]
    async fn list_on_empty_store_is_the_bare_header() {
        let folder = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(folder.path());

        assert_eq!(
            store.list(0).await,
            "Имя файла | Дата создания       | Дата обновления\n"
        );
    }
}
