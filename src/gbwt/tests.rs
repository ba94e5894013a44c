use super::*;

use simple_sds::serialize;

use std::fs;

//-----------------------------------------------------------------------------

fn example_paths() -> Vec<Vec<usize>> {
    vec![
        vec![3, 5, 7],
        vec![3, 6, 7],
        vec![4, 5, 7],
        vec![3, 5, 8],
    ]
}

fn build_dynamic(paths: &[Vec<usize>]) -> DynamicGBWT {
    let mut text: Vec<usize> = Vec::new();
    for path in paths.iter() {
        text.extend_from_slice(path);
        text.push(crate::ENDMARKER);
    }
    let mut index = DynamicGBWT::new();
    index.insert(&text);
    index
}

fn check_statistics(index: &GBWT, dynamic: &DynamicGBWT, name: &str) {
    assert_eq!(index.len(), dynamic.len(), "[{}]: Invalid total length", name);
    assert_eq!(index.is_empty(), dynamic.is_empty(), "[{}]: Invalid emptiness", name);
    assert_eq!(index.sequences(), dynamic.sequences(), "[{}]: Invalid number of sequences", name);
    assert_eq!(index.alphabet_size(), dynamic.alphabet_size(), "[{}]: Invalid alphabet size", name);
    assert_eq!(index.alphabet_offset(), dynamic.alphabet_offset(), "[{}]: Invalid alphabet offset", name);
    assert_eq!(index.effective_size(), dynamic.effective_size(), "[{}]: Invalid effective alphabet size", name);
    assert_eq!(index.samples(), dynamic.samples(), "[{}]: Invalid number of samples", name);
}

//-----------------------------------------------------------------------------

#[test]
fn empty_gbwt() {
    let dynamic = DynamicGBWT::new();
    let index = GBWT::from(&dynamic);
    check_statistics(&index, &dynamic, "empty");
    assert_eq!(index.start(0), None, "Got a start position from an empty index");
    serialize::test(&index, "empty-gbwt", None, true);
}

#[test]
fn from_dynamic() {
    let paths = example_paths();
    let dynamic = build_dynamic(&paths);
    let index = GBWT::from(&dynamic);
    check_statistics(&index, &dynamic, "from-dynamic");

    for id in 0..paths.len() {
        let path: Vec<usize> = index.sequence(id).collect();
        assert_eq!(path, paths[id], "Invalid sequence {}", id);
    }
    assert!(index.sequence(paths.len()).next().is_none(), "Got a sequence past the end");

    // Record access.
    assert!(index.record(ENDMARKER).is_some(), "No endmarker record");
    assert!(index.record(3).is_some(), "No record for node 3");
    assert!(index.record(2).is_none(), "Got a record for a node outside the alphabet");
    assert!(index.record(index.alphabet_size()).is_none(), "Got a record past the alphabet");

    assert!(index.has_node(3), "Node 3 is missing");
    assert!(!index.has_node(ENDMARKER), "The endmarker is a node");
    assert_eq!(index.first_node(), 3, "Invalid first node");

    serialize::test(&index, "gbwt", None, true);
}

#[test]
fn forward_matches_dynamic() {
    let paths = example_paths();
    let dynamic = build_dynamic(&paths);
    let index = GBWT::from(&dynamic);

    for id in 0..paths.len() {
        assert_eq!(index.start(id), dynamic.start(id), "Invalid start position for sequence {}", id);
        let mut pos = index.start(id);
        while let Some(p) = pos {
            assert_eq!(index.forward(p), dynamic.forward(p), "Inconsistent forward({:?})", p);
            pos = index.forward(p);
        }
    }
}

#[test]
fn cross_format_loading() {
    let paths = example_paths();
    let dynamic = build_dynamic(&paths);
    let index = GBWT::from(&dynamic);

    // The static index can load a file written by the dynamic index.
    let filename = serialize::temp_file_name("dynamic-as-static");
    serialize::serialize_to(&dynamic, &filename).unwrap();
    let loaded: GBWT = serialize::load_from(&filename).unwrap();
    assert_eq!(loaded, index, "Loading a dynamic index as a static one changed it");
    fs::remove_file(&filename).unwrap();

    // The dynamic index can load a file written by the static index.
    let filename = serialize::temp_file_name("static-as-dynamic");
    serialize::serialize_to(&index, &filename).unwrap();
    let loaded: DynamicGBWT = serialize::load_from(&filename).unwrap();
    assert_eq!(loaded, dynamic, "Loading a static index as a dynamic one changed it");
    fs::remove_file(&filename).unwrap();
}

//-----------------------------------------------------------------------------
