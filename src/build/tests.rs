use super::*;

use crate::support;

//-----------------------------------------------------------------------------

fn example_paths() -> Vec<Vec<usize>> {
    vec![
        vec![3, 5, 7],
        vec![3, 6, 7],
        vec![4, 5, 7],
        vec![3, 5, 8],
        vec![4, 6, 8],
    ]
}

fn concatenate(paths: &[Vec<usize>]) -> Vec<usize> {
    let mut result = Vec::new();
    for path in paths.iter() {
        result.extend_from_slice(path);
        result.push(ENDMARKER);
    }
    result
}

fn direct_index(paths: &[Vec<usize>]) -> DynamicGBWT {
    let mut index = DynamicGBWT::new();
    index.insert(&concatenate(paths));
    index
}

fn extract(index: &DynamicGBWT, id: usize) -> Vec<usize> {
    index.sequence(id).collect()
}

//-----------------------------------------------------------------------------

#[test]
fn builder_small_buffers() {
    let paths = example_paths();
    let truth = direct_index(&paths);

    // Every buffer size forces different flush boundaries, including sizes where
    // each batch holds a single sequence.
    for buffer_size in [4, 5, 8, 13, 64] {
        let mut builder = GBWTBuilder::new(buffer_size);
        for path in paths.iter() {
            builder.insert(path, false);
        }
        let index = builder.finish();
        assert_eq!(index, truth, "Buffer size {} changed the index", buffer_size);
    }
}

#[test]
fn builder_sequence_counter() {
    let paths = example_paths();
    let mut builder = GBWTBuilder::new(8);
    for path in paths.iter() {
        builder.insert(path, false);
    }
    assert!(builder.sequences() > 0, "No sequences were flushed with a small buffer");
    builder.flush();
    builder.flush();
    assert_eq!(builder.sequences(), paths.len(), "Invalid sequence count after flushing");
    let index = builder.finish();
    assert_eq!(index.sequences(), paths.len(), "Invalid number of sequences in the index");
}

#[test]
fn builder_skips_oversized() {
    let mut builder = GBWTBuilder::new(4);
    builder.insert(&[3, 5, 7, 9], false); // Needs 5 slots.
    builder.insert(&[3, 5], true); // Needs 6 slots.
    builder.insert(&[3, 5, 7], false); // Fits exactly.
    let index = builder.finish();
    assert_eq!(index.sequences(), 1, "Oversized sequences were not skipped");
    assert_eq!(extract(&index, 0), vec![3, 5, 7], "Invalid surviving sequence");
}

#[test]
fn builder_both_orientations() {
    let paths = example_paths();
    let mut builder = GBWTBuilder::new(1024);
    for path in paths.iter() {
        builder.insert(path, true);
    }
    let index = builder.finish();
    assert_eq!(index.sequences(), 2 * paths.len(), "Invalid number of sequences");
    assert!(index.is_bidirectional(), "The index is not bidirectional");

    for (id, path) in paths.iter().enumerate() {
        let forward = extract(&index, support::encode_path(id, false));
        assert_eq!(forward, *path, "Invalid forward path {}", id);
        let reverse = extract(&index, support::encode_path(id, true));
        let expected: Vec<usize> = path.iter().rev().map(|&node| support::flip_node(node)).collect();
        assert_eq!(reverse, expected, "Invalid reverse path {}", id);
    }
}

#[test]
fn insert_in_batches_matches_insert() {
    let paths = example_paths();
    let truth = direct_index(&paths);
    let text = concatenate(&paths);

    for batch_size in [4, 8, 100] {
        let mut index = DynamicGBWT::new();
        index.insert_in_batches(&text, batch_size, false);
        assert_eq!(index, truth, "Batch size {} changed the index", batch_size);
    }
}

#[test]
fn insert_in_batches_continues_an_index() {
    let paths = example_paths();
    let truth = direct_index(&paths);

    let mut index = DynamicGBWT::new();
    index.insert(&concatenate(&paths[0..2]));
    index.insert_in_batches(&concatenate(&paths[2..]), 8, false);
    assert_eq!(index, truth, "Mixing insertion interfaces changed the index");
}

//-----------------------------------------------------------------------------

#[test]
fn merge_static() {
    let mut truth = DynamicGBWT::new();
    truth.insert(&[3, 5, 0, 3, 6, 0]);

    let mut first = DynamicGBWT::new();
    first.insert(&[3, 5, 0]);
    let mut second = DynamicGBWT::new();
    second.insert(&[3, 6, 0]);
    let second = GBWT::from(&second);

    first.merge(&second, 0);
    assert_eq!(first, truth, "Merging a static index differs from direct insertion");
}

#[test]
fn merge_dynamic() {
    let mut truth = DynamicGBWT::new();
    truth.insert(&[3, 5, 0, 3, 6, 0]);

    let mut first = DynamicGBWT::new();
    first.insert(&[3, 5, 0]);
    let mut second = DynamicGBWT::new();
    second.insert(&[3, 6, 0]);

    first.merge_dynamic(&second, 0);
    assert_eq!(first, truth, "Merging a dynamic index differs from direct insertion");
}

#[test]
fn merge_into_empty() {
    let paths = example_paths();
    let truth = direct_index(&paths);
    let source = GBWT::from(&truth);

    let mut index = DynamicGBWT::new();
    index.merge(&source, 0);
    assert_eq!(index, truth, "Merging into an empty index differs from the source");
}

#[test]
fn merge_in_batches() {
    let paths = example_paths();
    let truth = direct_index(&paths);
    let source = GBWT::from(&truth);

    for batch_size in [1, 2, 3] {
        let mut index = DynamicGBWT::new();
        index.merge(&source, batch_size);
        assert_eq!(index, truth, "Merge batch size {} changed the index", batch_size);
    }
}

#[test]
fn merge_disjoint_alphabets() {
    let mut truth = DynamicGBWT::new();
    truth.insert(&[8, 9, 0]);
    truth.insert(&[3, 4, 0]);

    let mut first = DynamicGBWT::new();
    first.insert(&[8, 9, 0]);
    let mut second = DynamicGBWT::new();
    second.insert(&[3, 4, 0]);

    first.merge_dynamic(&second, 0);
    assert_eq!(first, truth, "Merging an index with a disjoint alphabet differs from direct insertion");
}

#[test]
fn merge_interleaves_sequences() {
    // Sequences from both sources pass through the shared middle node.
    let mut first = DynamicGBWT::new();
    first.insert(&[3, 5, 7, 0, 4, 5, 8, 0]);
    let mut second = DynamicGBWT::new();
    second.insert(&[3, 5, 8, 0]);

    first.merge_dynamic(&second, 0);
    assert_eq!(first.sequences(), 3, "Invalid number of sequences after merging");
    assert_eq!(extract(&first, 0), vec![3, 5, 7], "Invalid sequence 0");
    assert_eq!(extract(&first, 1), vec![4, 5, 8], "Invalid sequence 1");
    assert_eq!(extract(&first, 2), vec![3, 5, 8], "Invalid sequence 2");
    assert_eq!(first.count(5), 3, "Invalid count for the shared node");
}

//-----------------------------------------------------------------------------
