use crate::backend::AutoBackend;
use crate::preprocessor::{BOS, EOS, PAD, Preprocessor, UNK};
use std::io::Write;
use tempfile::NamedTempFile;

type B = AutoBackend;

#[test]
fn test_specials_are_inserted_first() {
    let p = Preprocessor::new(&["hello", "world"]);
    assert_eq!(p.words()[..4], [PAD, UNK, BOS, EOS]);
    assert_eq!(p.pad_id(), 0);
    assert_eq!(p.vocab_size(), 6);
}

#[test]
fn test_existing_specials_keep_their_ids() {
    let p = Preprocessor::new(&["<pad>", "<unk>", "<bos>", "<eos>", "a", "a"]);
    assert_eq!(
        (p.pad_id(), p.unk_id(), p.bos_id(), p.eos_id()),
        (0, 1, 2, 3)
    );
    assert_eq!(p.vocab_size(), 5, "duplicates are dropped");
}

#[test]
fn test_unknown_words_map_to_unk() {
    let p = Preprocessor::new(&["open", "door"]);
    let ids = p.words_to_ids(&p.tokenize("Open the DOOR"));
    assert_eq!(
        ids,
        vec![
            p.word_to_id()["open"] as i64,
            p.unk_id() as i64,
            p.word_to_id()["door"] as i64
        ]
    );
}

#[test]
fn test_preprocess_pads_and_masks() {
    let device = Default::default();
    let p = Preprocessor::new(&["a", "b", "c"]);
    let (ids, mask) = p.preprocess::<B, _>(&["a b c", "b"], &device);
    assert_eq!(ids.dims(), [2, 3]);

    let ids = ids.to_data().to_vec::<i64>().unwrap();
    let mask = mask.to_data().to_vec::<f32>().unwrap();
    let pad = p.pad_id() as i64;
    assert_eq!(ids[3..], [p.word_to_id()["b"] as i64, pad, pad]);
    assert_eq!(mask, vec![1., 1., 1., 1., 0., 0.]);
}

#[test]
fn test_decode_stops_at_eos_and_skips_bos() {
    let p = Preprocessor::new(&["go", "north"]);
    let go = p.word_to_id()["go"] as i64;
    let north = p.word_to_id()["north"] as i64;
    let rows = vec![
        vec![p.bos_id() as i64, go, north, p.eos_id() as i64, go],
        vec![go, p.pad_id() as i64, north],
    ];
    assert_eq!(p.decode(&rows), vec!["go north".to_string(), "go".to_string()]);
}

#[test]
fn test_from_vocab_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "<pad>\nkitchen\n\nfridge").unwrap();
    let p = Preprocessor::from_vocab_file(file.path()).unwrap();
    // missing specials go in front of the listed words
    assert_eq!(p.words()[..3], [UNK, BOS, EOS]);
    assert_eq!(p.pad_id(), 3);
    assert!(p.word_to_id().contains_key("kitchen"));
    assert!(p.word_to_id().contains_key("fridge"));
    assert_eq!(p.vocab_size(), 6);
}

#[test]
fn test_vocab_file_words_are_lowercased() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Kitchen\nFRIDGE").unwrap();
    let p = Preprocessor::from_vocab_file(file.path()).unwrap();
    let ids = p.words_to_ids(&p.tokenize("Kitchen fridge"));
    assert!(ids.iter().all(|&id| id != p.unk_id() as i64), "{:?}", ids);
}

#[test]
fn test_missing_vocab_file_is_an_error() {
    assert!(Preprocessor::from_vocab_file("/nonexistent/vocab.txt").is_err());
}
