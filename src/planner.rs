//! Splits a resource into the byte ranges fetched by the workers.
use crate::error::PlanningError;
use crate::state::{ByteRange, ChunkSpec};
use std::path::{Path, PathBuf};

/// Path of the part file holding chunk `index` of `base`.
pub fn part_path(base: &Path, index: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".part{index}"));
    PathBuf::from(name)
}

/// Divides `file_size` bytes into `chunk_count` contiguous chunks.
///
/// Every chunk gets `file_size / chunk_count` bytes except the last, which is
/// left open-ended and so picks up the remainder.
pub fn plan_chunks(
    file_size: u64,
    chunk_count: u32,
    base_path: &Path,
    url: &str,
) -> Result<Vec<ChunkSpec>, PlanningError> {
    if chunk_count == 0 {
        return Err(PlanningError::ZeroChunkCount);
    }

    let chunk_size = file_size / chunk_count as u64;
    let last = chunk_count as usize - 1;

    let chunks = (0..chunk_count as usize)
        .map(|index| {
            let start = index as u64 * chunk_size;
            let range = if index == last {
                ByteRange::open(start)
            } else {
                ByteRange::bounded(start, chunk_size)
            };

            ChunkSpec {
                index,
                url: url.to_string(),
                part_path: part_path(base_path, index),
                range,
            }
        })
        .collect();

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    const URL: &str = "http://example.com/file.bin";

    #[test]
    fn test_plan_even_split() {
        let chunks = plan_chunks(100, 10, Path::new("/tmp/file.bin"), URL).unwrap();
        assert_eq!(chunks.len(), 10);

        for (i, chunk) in chunks.iter().take(9).enumerate() {
            assert_eq!(chunk.range.header(), format!("bytes={}-{}", i * 10, i * 10 + 9));
        }
        assert_eq!(chunks[9].range.header(), "bytes=90-");
        assert_eq!(chunks[9].part_path, PathBuf::from("/tmp/file.bin.part9"));
    }

    #[test]
    fn test_plan_remainder_goes_to_open_last_chunk() {
        // 100 bytes, 3 chunks -> 33, 33, open from 66
        let chunks = plan_chunks(100, 3, Path::new("out"), URL).unwrap();
        assert_eq!(chunks[0].range.header(), "bytes=0-32");
        assert_eq!(chunks[1].range.header(), "bytes=33-65");
        assert_eq!(chunks[2].range.header(), "bytes=66-");
    }

    #[test]
    fn test_plan_single_chunk_is_open() {
        let chunks = plan_chunks(42, 1, Path::new("out"), URL).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].range.header(), "bytes=0-");
        assert_eq!(chunks[0].part_path, PathBuf::from("out.part0"));
    }

    #[test]
    fn test_plan_smaller_than_chunk_count() {
        let chunks = plan_chunks(3, 5, Path::new("out"), URL).unwrap();
        assert_eq!(chunks.len(), 5);
        assert!(chunks[..4].iter().all(|c| c.range.is_empty()));
        assert_eq!(chunks[4].range.header(), "bytes=0-");
    }

    #[test]
    fn test_plan_zero_chunks_is_rejected() {
        assert_matches!(
            plan_chunks(100, 0, Path::new("out"), URL),
            Err(PlanningError::ZeroChunkCount)
        );
    }

    proptest! {
        #[test]
        fn ranges_cover_resource_exactly_once(file_size in 0u64..1_000_000, chunk_count in 1u32..64) {
            let chunks = plan_chunks(file_size, chunk_count, Path::new("out"), URL).unwrap();
            prop_assert_eq!(chunks.len(), chunk_count as usize);

            let mut next = 0u64;
            for chunk in &chunks {
                prop_assert_eq!(chunk.range.start, next);
                match chunk.range.len() {
                    Some(len) => next += len,
                    None => next = file_size,
                }
            }
            prop_assert_eq!(next, file_size);
            prop_assert!(chunks.last().unwrap().range.end.is_none());
        }
    }
}
