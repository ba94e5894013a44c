use super::*;

use simple_sds::serialize;

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

fn build_index(paths: &[Vec<usize>]) -> DynamicGBWT {
    let mut index = DynamicGBWT::new();
    index.insert(&concatenate(paths));
    index
}

fn extract(index: &DynamicGBWT, id: usize) -> Vec<usize> {
    index.sequence(id).collect()
}

// Check the structural invariants maintained by construction.
fn verify_index(index: &DynamicGBWT, name: &str) {
    let offset = index.alphabet_offset();
    let effective = index.effective_size();
    assert_eq!(effective, index.bwt.len(), "[{}]: Invalid number of records", name);

    let mut total_size = 0;
    let mut total_runs = 0;
    let mut total_samples = 0;
    for comp in 0..effective {
        let record = &index.bwt[comp];

        // Body accounting.
        let body_size: usize = record.body.iter().map(|run| run.1).sum();
        assert_eq!(body_size, record.len(), "[{}]: Invalid body size in record {}", name, comp);
        for run in record.body.iter() {
            assert!(run.0 < record.outdegree(), "[{}]: Invalid rank in record {}", name, comp);
            assert!(run.1 > 0, "[{}]: Empty run in record {}", name, comp);
        }
        total_size += body_size;
        total_runs += record.runs();
        total_samples += record.samples();

        // Sample order.
        for pair in record.ids.windows(2) {
            assert!(pair[0].0 < pair[1].0, "[{}]: Samples out of order in record {}", name, comp);
        }
        if let Some(last) = record.ids.last() {
            assert!(last.0 < record.len(), "[{}]: Sample offset past the end in record {}", name, comp);
        }
    }
    assert_eq!(total_size, index.len(), "[{}]: Invalid total length", name);
    assert_eq!(total_runs, index.runs(), "[{}]: Invalid total number of runs", name);
    assert_eq!(total_samples, index.samples(), "[{}]: Invalid total number of samples", name);

    // No incoming edges to the endmarker.
    if effective > 0 {
        assert!(index.bwt[0].incoming.is_empty(), "[{}]: The endmarker record has incoming edges", name);
    }

    // Each record's contributions match the incoming edges of its successors, and
    // the stored edge offsets are the cumulative counts over the incoming edges.
    for comp in 0..effective {
        let node = if comp == 0 { ENDMARKER } else { comp + offset };
        let record = &index.bwt[comp];
        let mut counts: Vec<usize> = vec![0; record.outdegree()];
        for &(rank, len) in record.body.iter() {
            counts[rank] += len;
        }
        for outrank in 0..record.outdegree() {
            let successor = record.successor(outrank);
            if successor == ENDMARKER {
                continue;
            }
            let succ_record = index.record(successor);
            let inrank = succ_record.incoming.iter().position(|edge| edge.0 == node);
            assert!(inrank.is_some(), "[{}]: Missing incoming edge from {} to {}", name, node, successor);
            assert_eq!(succ_record.incoming[inrank.unwrap()].1, counts[outrank],
                "[{}]: Invalid incoming count from {} to {}", name, node, successor);
        }
    }
    for comp in 1..effective {
        let node = comp + offset;
        let record = &index.bwt[comp];
        let incoming_total: usize = record.incoming.iter().map(|edge| edge.1).sum();
        assert_eq!(incoming_total, record.len(), "[{}]: Incoming counts do not cover record {}", name, node);
        let mut cumulative = 0;
        for &(predecessor, count) in record.incoming.iter() {
            let pred_record = index.record(predecessor);
            let outrank = pred_record.edge_to(node).unwrap();
            assert_eq!(pred_record.offset(outrank), cumulative,
                "[{}]: Invalid edge offset from {} to {}", name, predecessor, node);
            cumulative += count;
        }
    }

    // LF to a successor is consistent with LF within the record.
    for comp in 0..effective {
        let node = if comp == 0 { ENDMARKER } else { comp + offset };
        for i in 0..index.bwt[comp].len() {
            if let Some((successor, succ_offset)) = index.lf(node, i) {
                assert_eq!(index.lf_to(node, i, successor), Some(succ_offset),
                    "[{}]: Inconsistent LF at offset {} of node {}", name, i, node);
            }
        }
    }
}

//-----------------------------------------------------------------------------

#[test]
fn empty_index() {
    let index = DynamicGBWT::new();
    assert_eq!(index.len(), 0, "Invalid total length");
    assert!(index.is_empty(), "Invalid emptiness");
    assert_eq!(index.sequences(), 0, "Invalid number of sequences");
    assert_eq!(index.alphabet_size(), 0, "Invalid alphabet size");
    assert_eq!(index.effective_size(), 0, "Invalid effective alphabet size");
    assert_eq!(index.runs(), 0, "Invalid number of runs");
    assert_eq!(index.samples(), 0, "Invalid number of samples");
    assert_eq!(index.count(0), 0, "Invalid count for the endmarker");
    assert_eq!(index.lf(1, 0), None, "Got an LF result from an empty index");
    assert_eq!(index.try_locate(1, 0), None, "Got a sample from an empty index");
    verify_index(&index, "empty");
    serialize::test(&index, "empty-dynamic-gbwt", None, true);
}

#[test]
fn empty_insert() {
    let mut index = DynamicGBWT::new();
    index.insert(&[]);
    assert!(index.is_empty(), "Inserting an empty text changed the index");
}

#[test]
#[should_panic]
fn missing_endmarker() {
    let mut index = DynamicGBWT::new();
    index.insert(&[3, 5]);
}

#[test]
fn single_sequence() {
    let mut index = DynamicGBWT::new();
    index.insert(&[3, 5, 0]);

    assert_eq!(index.sequences(), 1, "Invalid number of sequences");
    assert_eq!(index.len(), 3, "Invalid total length");
    assert_eq!(index.alphabet_size(), 6, "Invalid alphabet size");
    assert_eq!(index.alphabet_offset(), 2, "Invalid alphabet offset");
    assert_eq!(index.effective_size(), 4, "Invalid effective alphabet size");

    assert_eq!(index.record(ENDMARKER).outgoing, vec![(3, 0)], "Invalid endmarker record");
    assert_eq!(index.record(3).outgoing, vec![(5, 0)], "Invalid record for node 3");
    assert_eq!(index.record(5).outgoing, vec![(0, 0)], "Invalid record for node 5");
    assert!(index.record(4).is_empty(), "Node 4 has a non-empty record");
    assert_eq!(index.count(3), 1, "Invalid count for node 3");
    assert_eq!(index.count(4), 0, "Invalid count for node 4");

    // The endmarker position of the sequence is sampled.
    assert_eq!(index.try_locate(5, 0), Some(0), "Invalid sample at the end of the sequence");
    assert_eq!(index.try_locate(3, 0), None, "Found a sample at an unsampled position");

    assert_eq!(extract(&index, 0), vec![3, 5], "Invalid extracted sequence");
    verify_index(&index, "single");
    serialize::test(&index, "single-dynamic-gbwt", None, true);
}

#[test]
fn empty_sequence() {
    let mut index = DynamicGBWT::new();
    index.insert(&[0]);
    assert_eq!(index.sequences(), 1, "Invalid number of sequences");
    assert_eq!(index.len(), 1, "Invalid total length");
    assert_eq!(index.effective_size(), 1, "Invalid effective alphabet size");
    assert_eq!(index.try_locate(ENDMARKER, 0), Some(0), "The empty sequence is not sampled");
    assert_eq!(index.start(0), None, "Got a start position for an empty sequence");
    assert!(extract(&index, 0).is_empty(), "Extracted a non-empty path for an empty sequence");
}

#[test]
fn branching_sequences() {
    let mut index = DynamicGBWT::new();
    index.insert(&[3, 5, 7, 0, 3, 6, 7, 0]);

    assert_eq!(index.sequences(), 2, "Invalid number of sequences");
    assert_eq!(index.len(), 8, "Invalid total length");
    assert_eq!(index.alphabet_size(), 8, "Invalid alphabet size");
    assert_eq!(index.alphabet_offset(), 2, "Invalid alphabet offset");

    // Node 3 continues to both 5 and 6.
    assert_eq!(index.record(3).outgoing, vec![(5, 0), (6, 0)], "Invalid edges from node 3");
    assert_eq!(index.record(3).body, vec![(0, 1), (1, 1)], "Invalid body for node 3");

    // Node 7 is reached from both 5 and 6.
    assert_eq!(index.record(7).incoming, vec![(5, 1), (6, 1)], "Invalid incoming edges for node 7");
    assert_eq!(index.record(7).body, vec![(0, 2)], "Invalid body for node 7");

    assert_eq!(extract(&index, 0), vec![3, 5, 7], "Invalid sequence 0");
    assert_eq!(extract(&index, 1), vec![3, 6, 7], "Invalid sequence 1");
    verify_index(&index, "branching");
    serialize::test(&index, "branching-dynamic-gbwt", None, true);
}

#[test]
fn repeated_sequences() {
    let mut text: Vec<usize> = Vec::new();
    for _ in 0..1000 {
        text.extend_from_slice(&[4, 4, 4, 0]);
    }
    let mut index = DynamicGBWT::new();
    index.insert(&text);

    assert_eq!(index.sequences(), 1000, "Invalid number of sequences");
    assert_eq!(index.len(), 4000, "Invalid total length");
    assert_eq!(index.count(4), 3000, "Invalid count for node 4");

    // All occurrences of node 4 with the same successor coalesce into single runs.
    assert_eq!(index.record(ENDMARKER).body, vec![(0, 1000)], "Invalid endmarker record body");
    assert_eq!(index.record(4).runs(), 2, "Invalid number of runs for node 4");
    assert_eq!(index.runs(), 3, "Invalid total number of runs");
    assert_eq!(index.record(4).incoming, vec![(0, 1000), (4, 2000)], "Invalid incoming edges for node 4");

    // One endmarker sample per sequence.
    assert_eq!(index.samples(), 1000, "Invalid number of samples");
    for id in 0..100 {
        assert_eq!(extract(&index, id), vec![4, 4, 4], "Invalid sequence {}", id);
    }
    verify_index(&index, "repeated");
}

#[test]
fn lf_round_trip() {
    let paths = example_paths();
    let index = build_index(&paths);
    assert_eq!(index.sequences(), paths.len(), "Invalid number of sequences");
    for id in 0..paths.len() {
        assert_eq!(extract(&index, id), paths[id], "Invalid sequence {}", id);
    }
    verify_index(&index, "round-trip");
}

#[test]
fn locate_finds_all_sequences() {
    let paths = example_paths();
    let index = build_index(&paths);

    for node in index.first_node()..index.alphabet_size() {
        let mut expected: Vec<usize> = (0..paths.len())
            .filter(|&id| paths[id].contains(&node))
            .collect();
        expected.sort_unstable();

        // The full range locates every sequence passing through the node.
        let state = SearchState { node, range: 0..index.count(node) };
        assert_eq!(index.locate(&state), expected, "Invalid locate() result for node {}", node);

        // Single positions locate the same sequences one at a time.
        let mut found: Vec<usize> = Vec::new();
        for offset in 0..index.count(node) {
            let result = index.locate(&SearchState { node, range: offset..offset + 1 });
            assert_eq!(result.len(), 1, "Invalid number of sequences at offset {} of node {}", offset, node);
            found.push(result[0]);
        }
        found.sort_unstable();
        assert_eq!(found, expected, "Single positions did not locate all sequences for node {}", node);
    }

    // Invalid queries.
    let state = SearchState { node: 2, range: 0..1 };
    assert!(index.locate(&state).is_empty(), "Got a locate() result for a node outside the alphabet");
    let state = SearchState { node: 5, range: 0..0 };
    assert!(index.locate(&state).is_empty(), "Got a locate() result for an empty range");
}

#[test]
fn sample_interval() {
    // Sequences shorter than the sample interval are sampled only at the endmarker.
    let mut index = DynamicGBWT::new();
    let mut text: Vec<usize> = Vec::new();
    for _ in 0..16 {
        text.extend_from_slice(&[3, 4, 5, 6, 7, 0]);
    }
    index.insert(&text);
    assert_eq!(index.samples(), 16, "Invalid number of samples for short sequences");

    // A long sequence gains a sample at every multiple of the interval.
    let mut index = DynamicGBWT::new();
    let mut text: Vec<usize> = Vec::new();
    for i in 0..2000 {
        text.push(if i % 2 == 0 { 3 } else { 4 });
    }
    text.push(ENDMARKER);
    index.insert(&text);
    assert!(index.len() > DynamicGBWT::SAMPLE_INTERVAL, "The test sequence is too short");
    assert_eq!(index.samples(), 2, "Invalid number of samples for a long sequence");

    // Locating still works far from the samples.
    let state = SearchState { node: 3, range: 0..1 };
    assert_eq!(index.locate(&state), vec![0], "Invalid locate() result for a long sequence");
    verify_index(&index, "sample-interval");
}

#[test]
fn insertion_is_batch_invariant() {
    let paths = example_paths();

    let mut in_batches = DynamicGBWT::new();
    in_batches.insert(&concatenate(&paths[0..2]));
    in_batches.insert(&concatenate(&paths[2..3]));
    in_batches.insert(&concatenate(&paths[3..5]));

    let at_once = build_index(&paths);
    assert_eq!(in_batches, at_once, "Batched insertion differs from single-batch insertion");
    verify_index(&in_batches, "batched");
}

#[test]
fn alphabet_resizing() {
    let mut index = DynamicGBWT::new();
    index.insert(&[5, 6, 0]);
    assert_eq!(index.alphabet_offset(), 4, "Invalid alphabet offset after the first batch");
    assert_eq!(index.alphabet_size(), 7, "Invalid alphabet size after the first batch");

    // Decreasing the offset shifts the old records.
    index.insert(&[3, 0]);
    assert_eq!(index.alphabet_offset(), 2, "Invalid alphabet offset after the second batch");
    assert_eq!(index.alphabet_size(), 7, "The alphabet size shrank");
    assert_eq!(index.count(5), 1, "Lost a record when the offset changed");

    // A batch with larger node identifiers cannot shrink the index.
    index.insert(&[9, 0]);
    assert_eq!(index.alphabet_offset(), 2, "The alphabet offset grew");
    assert_eq!(index.alphabet_size(), 10, "Invalid alphabet size after the third batch");

    assert_eq!(extract(&index, 0), vec![5, 6], "Invalid sequence 0");
    assert_eq!(extract(&index, 1), vec![3], "Invalid sequence 1");
    assert_eq!(extract(&index, 2), vec![9], "Invalid sequence 2");
    verify_index(&index, "resize");
}

#[test]
fn serialize_non_trivial() {
    let index = build_index(&example_paths());
    serialize::test(&index, "dynamic-gbwt", None, true);
}

//-----------------------------------------------------------------------------
