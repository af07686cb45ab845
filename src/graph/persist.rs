//! Binary persistence for a finalized `Graph`: a fixed magic/version header
//! followed by a `bincode`-style length-prefixed payload, read back with
//! `memmap2` so loading a multi-gigabyte donor graph does not require
//! copying it into the heap up front.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{MatchError, Result};
use crate::graph::Graph;

const MAGIC: &[u8; 8] = b"HLADNRG1";
const VERSION: u32 = 1;

pub fn save(graph: &Graph, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|source| MatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC).map_err(|source| io_err(path, source))?;
    writer
        .write_all(&VERSION.to_le_bytes())
        .map_err(|source| io_err(path, source))?;

    let payload = serde_json::to_vec(graph).map_err(|e| MatchError::Structural {
        file: path.to_path_buf(),
        line: 0,
        reason: format!("failed to serialize graph: {e}"),
    })?;
    writer
        .write_all(&(payload.len() as u64).to_le_bytes())
        .map_err(|source| io_err(path, source))?;
    writer.write_all(&payload).map_err(|source| io_err(path, source))?;
    writer.flush().map_err(|source| io_err(path, source))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Graph> {
    let file = File::open(path).map_err(|source| MatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| io_err(path, source))?;

    if mmap.len() < 20 {
        return Err(MatchError::Structural {
            file: path.to_path_buf(),
            line: 0,
            reason: "file too short to contain a graph header".to_string(),
        });
    }

    let (magic, rest) = mmap.split_at(8);
    if magic != MAGIC {
        return Err(MatchError::Version {
            path: path.to_path_buf(),
            found: String::from_utf8_lossy(magic).into_owned(),
            expected: String::from_utf8_lossy(MAGIC).into_owned(),
        });
    }

    let (version_bytes, rest) = rest.split_at(4);
    let version = u32::from_le_bytes(version_bytes.try_into().unwrap());
    if version != VERSION {
        return Err(MatchError::Version {
            path: path.to_path_buf(),
            found: version.to_string(),
            expected: VERSION.to_string(),
        });
    }

    let (len_bytes, rest) = rest.split_at(8);
    let payload_len = u64::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    if rest.len() < payload_len {
        return Err(MatchError::Structural {
            file: path.to_path_buf(),
            line: 0,
            reason: "declared payload length exceeds file size".to_string(),
        });
    }

    let mut graph: Graph = serde_json::from_slice(&rest[..payload_len]).map_err(|e| MatchError::Structural {
        file: path.to_path_buf(),
        line: 0,
        reason: format!("failed to deserialize graph: {e}"),
    })?;
    graph.rebuild_index();
    Ok(graph)
}

fn io_err(path: &Path, source: std::io::Error) -> MatchError {
    MatchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, NodeKey};

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("donors.graph");

        let mut builder = GraphBuilder::new();
        let g = [101u32, 201, 702, 801, 701, 702, 201, 301, 301, 701];
        builder.add_edge(NodeKey::Genotype(g), NodeKey::Donor(1), 1.0);
        builder.add_edge(NodeKey::Donor(1), NodeKey::Genotype(g), 1.0);
        let graph = builder.build();

        save(&graph, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.num_nodes(), graph.num_nodes());
        assert_eq!(loaded.num_edges(), graph.num_edges());
        assert!(loaded.contains(&NodeKey::Donor(1)));
    }

    /// Regression test: `key_to_id` maps a non-primitive `NodeKey` enum and
    /// is skipped rather than serialized, so a loaded graph must rebuild it
    /// before any lookup (`get_compact_id`, `class_neighbors`,
    /// `neighbors_2nd`) can work.
    #[test]
    fn save_then_load_preserves_class_and_subclass_lookups() {
        use crate::encoding::{encode_class, subclass_variants};
        use crate::types::{class_i, class_ii, ClassNum};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("donors.graph");

        let g = [101u32, 201, 702, 801, 701, 702, 201, 301, 301, 701];
        let c1 = class_i(&g);
        let c2 = class_ii(&g);
        let c1_key = encode_class(&c1);
        let c2_key = encode_class(&c2);

        let mut builder = GraphBuilder::new();
        builder.add_edge(NodeKey::Genotype(g), NodeKey::Donor(1), 1.0);
        builder.add_edge(NodeKey::Donor(1), NodeKey::Genotype(g), 1.0);
        builder.add_edge(NodeKey::Class(c1_key), NodeKey::Genotype(g), 0.0);
        builder.add_edge(NodeKey::Class(c2_key), NodeKey::Genotype(g), 0.0);
        for sub in subclass_variants(&c1, ClassNum::I) {
            builder.add_edge(NodeKey::Subclass(sub.key), NodeKey::Class(c1_key), 0.0);
        }
        let graph = builder.build();

        save(&graph, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert!(loaded.get_compact_id(&NodeKey::Donor(1)).is_some());
        let block = loaded.class_neighbors(c1_key).unwrap();
        assert_eq!(block.values, vec![g]);
        let (ids, _) = loaded.neighbors_2nd(subclass_variants(&c1, ClassNum::I)[0].key);
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.graph");
        std::fs::write(&path, b"NOTAMAGIC_AND_MORE_PADDING_BYTES").unwrap();
        assert!(load(&path).is_err());
    }
}
