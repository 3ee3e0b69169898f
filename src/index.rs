//! Flat inner-product vector index and its on-disk snapshot.
//!
//! A snapshot is two co-located files, written together and only valid
//! together (little-endian throughout):
//!
//! `vectors.bin`:
//!   Magic: "TRVX" (4 bytes)
//!   Version: u16
//!   Dimension: u32
//!   Count: u32
//!   Count × Dimension f32 values, row-major
//!
//! `ids.bin`:
//!   Magic: "TRID" (4 bytes)
//!   Version: u16
//!   Count: u32
//!   Count i64 document ids, position-parallel to the vector rows
//!
//! If either file is missing the snapshot is absent (callers rebuild); a
//! header, size, or cross-file count problem is corruption and fails loud.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

pub const VECTORS_FILE: &str = "vectors.bin";
pub const IDS_FILE: &str = "ids.bin";

const VECTORS_MAGIC: [u8; 4] = *b"TRVX";
const IDS_MAGIC: [u8; 4] = *b"TRID";
const FORMAT_VERSION: u16 = 1;

const VECTORS_HEADER_LEN: usize = 14;
const IDS_HEADER_LEN: usize = 10;

/// One ranked hit: an offset into the snapshot's ids array plus the raw
/// inner-product score. Callers translate `row` to a document id via
/// `Snapshot::ids`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    pub score: f32,
}

/// Ranking strategy over a built vector set.
///
/// [`FlatIpIndex`] is the exact scan; an approximate structure can slot in
/// behind the same interface without the retrieval engine changing.
pub trait SimilaritySearch: Send + Sync {
    fn dim(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Top-k hits by score descending, ties broken by ascending row.
    /// Fails when the query dimension differs from the built dimension.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// Exact inner-product scan over a row-major N×D matrix.
#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dim: usize,
    vectors: Vec<f32>,
}

impl FlatIpIndex {
    /// Flattens per-document embeddings into the matrix. Every vector must
    /// share the dimension of the first; the set must be non-empty.
    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let Some(first) = vectors.first() else {
            bail!("cannot build an index from zero vectors");
        };
        let dim = first.len();
        if dim == 0 {
            bail!("embedding dimension must be non-zero");
        }

        let mut flat = Vec::with_capacity(vectors.len() * dim);
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != dim {
                bail!(
                    "vector {} has dimension {}, expected {}",
                    i,
                    vector.len(),
                    dim
                );
            }
            flat.extend_from_slice(vector);
        }

        Ok(Self { dim, vectors: flat })
    }

    fn row_vector(&self, row: usize) -> &[f32] {
        &self.vectors[row * self.dim..(row + 1) * self.dim]
    }
}

impl SimilaritySearch for FlatIpIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.vectors.len() / self.dim
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dim {
            bail!(
                "query dimension mismatch: expected {}, got {}",
                self.dim,
                query.len()
            );
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for row in 0..self.len() {
            let score = dot_product(self.row_vector(row), query);
            heap.push(Reverse(ScoredRow { score, row }));
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut hits: Vec<SearchHit> = heap
            .into_iter()
            .map(|Reverse(entry)| SearchHit {
                row: entry.row,
                score: entry.score,
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.row.cmp(&b.row)));
        Ok(hits)
    }
}

#[derive(Debug, Clone, Copy)]
struct ScoredRow {
    score: f32,
    row: usize,
}

impl PartialEq for ScoredRow {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredRow {}

impl PartialOrd for ScoredRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredRow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.row.cmp(&other.row))
    }
}

#[inline]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// One fully-built index state: the vector matrix plus the parallel document
/// id array. `ids[i]` is the document whose embedding is row `i`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub ids: Vec<i64>,
    pub index: FlatIpIndex,
}

impl Snapshot {
    /// Assembles a snapshot from store rows and their embeddings. Both slices
    /// are position-parallel and must be the same length.
    pub fn from_parts(ids: Vec<i64>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if ids.len() != vectors.len() {
            bail!(
                "ids/vectors length mismatch: {} ids, {} vectors",
                ids.len(),
                vectors.len()
            );
        }
        let index = FlatIpIndex::from_vectors(vectors)?;
        Ok(Self { ids, index })
    }

    /// Persists both artifacts into `dir`, each written to a temp file,
    /// fsynced, and renamed into place.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create index directory {}", dir.display()))?;

        write_atomic(&dir.join(VECTORS_FILE), &self.encode_vectors()?)?;
        write_atomic(&dir.join(IDS_FILE), &self.encode_ids()?)?;
        Ok(())
    }

    /// Loads a snapshot from `dir`. Absence of either file is not an error;
    /// anything else wrong with the files is.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let vectors_path = dir.join(VECTORS_FILE);
        let ids_path = dir.join(IDS_FILE);

        let vectors_bytes = match std::fs::read(&vectors_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", vectors_path.display()));
            }
        };
        let ids_bytes = match std::fs::read(&ids_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read {}", ids_path.display())),
        };

        let (dim, vectors) = decode_vectors(&vectors_bytes)
            .with_context(|| format!("parse {}", vectors_path.display()))?;
        let ids =
            decode_ids(&ids_bytes).with_context(|| format!("parse {}", ids_path.display()))?;

        let count = vectors.len() / dim;
        if count != ids.len() {
            bail!(
                "snapshot mismatch: {} vectors but {} ids",
                count,
                ids.len()
            );
        }

        Ok(Some(Self {
            ids,
            index: FlatIpIndex { dim, vectors },
        }))
    }

    fn encode_vectors(&self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.ids.len()).context("vector count out of range")?;
        let dim = u32::try_from(self.index.dim).context("dimension out of range")?;

        let mut buf = Vec::with_capacity(VECTORS_HEADER_LEN + self.index.vectors.len() * 4);
        buf.extend_from_slice(&VECTORS_MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&dim.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        for value in &self.index.vectors {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        Ok(buf)
    }

    fn encode_ids(&self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.ids.len()).context("id count out of range")?;

        let mut buf = Vec::with_capacity(IDS_HEADER_LEN + self.ids.len() * 8);
        buf.extend_from_slice(&IDS_MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        for id in &self.ids {
            buf.extend_from_slice(&id.to_le_bytes());
        }
        Ok(buf)
    }
}

fn decode_vectors(bytes: &[u8]) -> Result<(usize, Vec<f32>)> {
    if bytes.len() < VECTORS_HEADER_LEN {
        bail!("truncated header");
    }
    if bytes[0..4] != VECTORS_MAGIC {
        bail!("invalid magic: {:?}", &bytes[0..4]);
    }
    let version = u16::from_le_bytes(bytes[4..6].try_into()?);
    if version != FORMAT_VERSION {
        bail!("unsupported format version: {}", version);
    }
    let dim = u32::from_le_bytes(bytes[6..10].try_into()?) as usize;
    let count = u32::from_le_bytes(bytes[10..14].try_into()?) as usize;
    if dim == 0 || count == 0 {
        bail!("snapshot contains no vectors");
    }

    let payload = &bytes[VECTORS_HEADER_LEN..];
    let expected = count
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .context("vector payload size overflow")?;
    if payload.len() != expected {
        bail!(
            "vector payload size mismatch: expected {} bytes, got {}",
            expected,
            payload.len()
        );
    }

    let vectors = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    Ok((dim, vectors))
}

fn decode_ids(bytes: &[u8]) -> Result<Vec<i64>> {
    if bytes.len() < IDS_HEADER_LEN {
        bail!("truncated header");
    }
    if bytes[0..4] != IDS_MAGIC {
        bail!("invalid magic: {:?}", &bytes[0..4]);
    }
    let version = u16::from_le_bytes(bytes[4..6].try_into()?);
    if version != FORMAT_VERSION {
        bail!("unsupported format version: {}", version);
    }
    let count = u32::from_le_bytes(bytes[6..10].try_into()?) as usize;

    let payload = &bytes[IDS_HEADER_LEN..];
    let expected = count.checked_mul(8).context("id payload size overflow")?;
    if payload.len() != expected {
        bail!(
            "id payload size mismatch: expected {} bytes, got {}",
            expected,
            payload.len()
        );
    }

    Ok(payload
        .chunks_exact(8)
        .map(|chunk| i64::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)
        .with_context(|| format!("create temp file {}", temp_path.display()))?;
    file.write_all(bytes)?;
    file.sync_all()
        .with_context(|| format!("fsync {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("rename {} into place", temp_path.display()))?;
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_snapshot() -> Snapshot {
        Snapshot::from_parts(
            vec![10, 20, 30],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn search_ranks_by_inner_product() {
        let snapshot = sample_snapshot();
        let hits = snapshot.index.search(&[0.9, 0.1, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].row, 0);
        assert_eq!(hits[1].row, 1);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn search_returns_at_most_len_hits() {
        let snapshot = sample_snapshot();
        let hits = snapshot.index.search(&[0.5, 0.3, 0.1], 10).unwrap();
        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn search_k_zero_is_empty() {
        let snapshot = sample_snapshot();
        let hits = snapshot.index.search(&[1.0, 0.0, 0.0], 0).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn search_rejects_query_dimension_mismatch() {
        let snapshot = sample_snapshot();
        let err = snapshot.index.search(&[1.0, 0.0], 3).unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[test]
    fn equal_scores_keep_row_order() {
        let snapshot = Snapshot::from_parts(
            vec![1, 2],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .unwrap();
        let hits = snapshot.index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].row, 0);
        assert_eq!(hits[1].row, 1);
    }

    #[test]
    fn from_vectors_rejects_ragged_input() {
        let err = FlatIpIndex::from_vectors(vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]).unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn from_vectors_rejects_empty_input() {
        assert!(FlatIpIndex::from_vectors(Vec::new()).is_err());
    }

    #[test]
    fn snapshot_roundtrip_save_load() {
        let snapshot = sample_snapshot();
        let dir = tempdir().unwrap();
        snapshot.save(dir.path()).unwrap();

        let loaded = Snapshot::load(dir.path()).unwrap().expect("snapshot present");
        assert_eq!(loaded.ids, snapshot.ids);
        assert_eq!(loaded.index.dim(), snapshot.index.dim());

        let query = [0.7, 0.2, 0.1];
        let before = snapshot.index.search(&query, 3).unwrap();
        let after = loaded.index.search(&query, 3).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn load_missing_dir_is_absent() {
        let dir = tempdir().unwrap();
        let result = Snapshot::load(&dir.path().join("nowhere")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn load_with_one_artifact_missing_is_absent() {
        let snapshot = sample_snapshot();
        let dir = tempdir().unwrap();
        snapshot.save(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(IDS_FILE)).unwrap();

        let result = Snapshot::load(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn load_rejects_count_disagreement() {
        let snapshot = sample_snapshot();
        let dir = tempdir().unwrap();
        snapshot.save(dir.path()).unwrap();

        // Overwrite the id file with one belonging to a smaller snapshot.
        let smaller = Snapshot::from_parts(vec![10], vec![vec![1.0, 0.0, 0.0]]).unwrap();
        std::fs::write(dir.path().join(IDS_FILE), smaller.encode_ids().unwrap()).unwrap();

        let err = Snapshot::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn load_rejects_truncated_payload() {
        let snapshot = sample_snapshot();
        let dir = tempdir().unwrap();
        snapshot.save(dir.path()).unwrap();

        let path = dir.path().join(VECTORS_FILE);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        assert!(Snapshot::load(dir.path()).is_err());
    }

    #[test]
    fn load_rejects_bad_magic() {
        let snapshot = sample_snapshot();
        let dir = tempdir().unwrap();
        snapshot.save(dir.path()).unwrap();

        let path = dir.path().join(VECTORS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = b'X';
        std::fs::write(&path, &bytes).unwrap();

        assert!(Snapshot::load(dir.path()).is_err());
    }
}
