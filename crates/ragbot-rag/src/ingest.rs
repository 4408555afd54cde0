//! One-shot ingestion: parse, chunk, embed and index a set of files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;

use ragbot_hooks::{HookRegistry, RagEvent};
use ragbot_providers::{DocumentParser, EmbeddingProvider, ProviderError, collect_documents};

use crate::chunking::Chunker;
use crate::error::RagError;
use crate::index::VectorIndex;

/// What an ingestion run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub documents: usize,
    pub segments: usize,
    /// Embedding dimensionality of the index.
    pub dimensions: usize,
}

/// Build a fresh index from `paths` (files or directories).
///
/// Any parse or embedding failure aborts the run. A run that yields no
/// segment at all fails with [`RagError::EmptyCorpus`].
pub async fn ingest(
    paths: &[PathBuf],
    parser: &dyn DocumentParser,
    embedder: &dyn EmbeddingProvider,
    chunker: &Chunker,
    batch_size: usize,
    hooks: &HookRegistry,
) -> Result<(VectorIndex, IngestSummary), RagError> {
    let mut files = Vec::new();
    let mut labels = HashSet::new();
    for root in paths {
        for file in collect_documents(root).map_err(RagError::Parse)? {
            let mut label = source_label(root, &file);
            if !labels.insert(label.clone()) {
                label = file.display().to_string();
                labels.insert(label.clone());
            }
            files.push((file, label));
        }
    }

    let ingested_at = Utc::now().to_rfc3339();
    let mut index = VectorIndex::new();
    let mut documents = 0;

    for (file, label) in &files {
        let mut document = parser.parse(file).await.map_err(RagError::Parse)?;
        document.source_id = label.clone();
        let path = document
            .metadata
            .get("path")
            .cloned()
            .unwrap_or_else(|| file.display().to_string());

        let segments: Vec<_> = chunker
            .split(&document)
            .into_iter()
            .map(|s| {
                s.with_metadata("path", path.clone())
                    .with_metadata("ingested_at", ingested_at.clone())
            })
            .collect();
        documents += 1;
        if segments.is_empty() {
            continue;
        }

        for batch in segments.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
            let embeddings = embedder
                .embed_batch(&texts)
                .await
                .map_err(RagError::Embedding)?;
            if embeddings.len() != texts.len() {
                return Err(RagError::Embedding(ProviderError::InvalidResponse(format!(
                    "{} returned {} embeddings for {} texts",
                    embedder.id(),
                    embeddings.len(),
                    texts.len()
                ))));
            }
            index.add_all(batch.to_vec(), embeddings)?;
        }

        hooks.emit(RagEvent::Ingested {
            source_id: document.source_id.clone(),
            segments: segments.len(),
        });
    }

    if index.is_empty() {
        let names = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(RagError::EmptyCorpus(names));
    }

    let summary = IngestSummary {
        documents,
        segments: index.len(),
        dimensions: index.dimensions().unwrap_or_default(),
    };
    Ok((index, summary))
}

/// Source id for `file`: its path below `root`, or its file name when `root`
/// is the file itself.
fn source_label(root: &Path, file: &Path) -> String {
    let relative = file
        .strip_prefix(root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty());
    match relative {
        Some(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.display().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KeywordEmbedder;
    use ragbot_providers::PlainTextParser;
    use std::sync::atomic::Ordering;

    fn chunker() -> Chunker {
        Chunker::new(300, 30)
    }

    #[tokio::test]
    async fn test_ingest_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cats.txt"), "Cats are mammals").unwrap();
        std::fs::write(dir.path().join("dogs.md"), "# Dogs\n\nDogs bark").unwrap();
        std::fs::write(dir.path().join("notes.csv"), "skipped").unwrap();

        let embedder = KeywordEmbedder::new(&["cat", "dog"]);
        let (index, summary) = ingest(
            &[dir.path().to_path_buf()],
            &PlainTextParser::new(),
            &embedder,
            &chunker(),
            32,
            &HookRegistry::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.documents, 2);
        assert_eq!(summary.segments, 2);
        assert_eq!(summary.dimensions, 2);

        let results = index.search(&[1.0, 0.0], 1, 0.5).unwrap();
        assert_eq!(results[0].segment.text, "Cats are mammals");
        assert_eq!(results[0].segment.source_id, "cats.txt");
        assert!(results[0].segment.metadata.contains_key("ingested_at"));
        assert!(
            results[0].segment.metadata["path"].ends_with("cats.txt"),
            "unexpected path metadata"
        );
    }

    #[tokio::test]
    async fn test_same_file_name_in_two_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cats")).unwrap();
        std::fs::create_dir_all(dir.path().join("dogs")).unwrap();
        std::fs::write(dir.path().join("cats/notes.md"), "Cats are mammals").unwrap();
        std::fs::write(dir.path().join("dogs/notes.md"), "Dogs bark loudly").unwrap();

        let (index, summary) = ingest(
            &[dir.path().to_path_buf()],
            &PlainTextParser::new(),
            &KeywordEmbedder::new(&["cat", "dog"]),
            &chunker(),
            32,
            &HookRegistry::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.segments, 2);
        let mut ids: Vec<&str> = index.entries().iter().map(|e| e.segment.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["cats/notes.md::0", "dogs/notes.md::0"]);
    }

    #[test]
    fn test_source_label() {
        let root = Path::new("/data/docs");
        assert_eq!(source_label(root, Path::new("/data/docs/a/b.md")), "a/b.md");
        assert_eq!(source_label(Path::new("/data/x.txt"), Path::new("/data/x.txt")), "x.txt");
    }

    #[tokio::test]
    async fn test_empty_corpus_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "  \n\n ").unwrap();

        let embedder = KeywordEmbedder::new(&["cat"]);
        let err = ingest(
            &[path],
            &PlainTextParser::new(),
            &embedder,
            &chunker(),
            32,
            &HookRegistry::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RagError::EmptyCorpus(_)));
        assert!(err.is_fatal());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let err = ingest(
            &[path],
            &PlainTextParser::new(),
            &KeywordEmbedder::new(&["cat"]),
            &chunker(),
            32,
            &HookRegistry::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RagError::Parse(ProviderError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cats.txt"), "Cats are mammals").unwrap();

        let err = ingest(
            &[dir.path().to_path_buf()],
            &PlainTextParser::new(),
            &KeywordEmbedder::new(&["cat"]).failing_on("mammals"),
            &chunker(),
            32,
            &HookRegistry::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_embeds_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let text = (1..=5)
            .map(|i| format!("Paragraph {i} talks about cats."))
            .collect::<Vec<_>>()
            .join("\n\n");
        std::fs::write(dir.path().join("cats.md"), text).unwrap();

        let embedder = KeywordEmbedder::new(&["cat", "paragraph"]);
        let events = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = events.clone();
        let hooks = HookRegistry::new();
        hooks.on(
            "ingested",
            std::sync::Arc::new(move |_: &RagEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let (_, summary) = ingest(
            &[dir.path().to_path_buf()],
            &PlainTextParser::new(),
            &embedder,
            &Chunker::new(40, 0),
            2,
            &hooks,
        )
        .await
        .unwrap();

        assert_eq!(summary.segments, 5);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }
}
