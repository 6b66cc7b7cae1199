//! Saving and loading model checkpoint files

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use wharton::{AdamW, GPTModel, ModelConfig};

fn config() -> ModelConfig {
    ModelConfig {
        vocab_size: 300,
        context_length: 10,
        emb_dim: 16,
        n_heads: 4,
        n_layers: 2,
        drop_rate: 0.1,
        qkv_bias: true,
    }
}

fn expect_load_err(path: &std::path::Path) -> wharton::Error {
    match GPTModel::load(path) {
        Ok(_) => panic!("expected load to fail"),
        Err(e) => e,
    }
}

#[test]
fn test_round_trip_preserves_logits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");

    let mut rng = StdRng::seed_from_u64(42);
    let mut model = GPTModel::new(&config(), &mut rng);

    // Take a few optimizer steps so the weights differ from a fresh init
    let mut optimizer = AdamW::new(&model, 1e-2, 0.1);
    let inputs = vec![vec![1, 5, 9, 200, 3]];
    let targets = vec![vec![5, 9, 200, 3, 7]];
    for _ in 0..3 {
        let (_, grads) = model.loss_and_gradients(&inputs, &targets, Some(&mut rng));
        optimizer.step(&mut model, &grads);
    }

    model.save(&path).unwrap();
    let loaded = GPTModel::load(&path).unwrap();

    assert_eq!(loaded.config, model.config);
    assert_eq!(loaded.num_parameters(), model.num_parameters());
    let ids = [1, 2, 3, 299];
    assert_eq!(loaded.logits(&ids), model.logits(&ids));
}

#[test]
fn test_bad_magic_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    fs::write(&path, b"NOTACKPT\x01rest").unwrap();

    let err = expect_load_err(&path);
    assert!(matches!(err, wharton::Error::Checkpoint(_)), "{}", err);
}

#[test]
fn test_truncated_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    GPTModel::new(&config(), &mut StdRng::seed_from_u64(0))
        .save(&path)
        .unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    assert!(GPTModel::load(&path).is_err());
}

#[test]
fn test_unsupported_version_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    GPTModel::new(&config(), &mut StdRng::seed_from_u64(0))
        .save(&path)
        .unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[8] = 99;
    fs::write(&path, &bytes).unwrap();

    let err = expect_load_err(&path);
    assert!(err.to_string().contains("version"), "{}", err);
}

/// Byte offset of the first tensor header in a saved file
fn first_tensor_offset(bytes: &[u8]) -> usize {
    let config_len = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]) as usize;
    13 + config_len + 4
}

fn u32_header(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Replace the first tensor's `rank, dims, len` header with `header`
fn rewrite_first_header(path: &std::path::Path, header: &[u32]) {
    let bytes = fs::read(path).unwrap();
    let offset = first_tensor_offset(&bytes);
    // tok_emb is 2D: rank, two dims, len
    let mut out = bytes[..offset].to_vec();
    out.extend(u32_header(header));
    out.extend(&bytes[offset + 16..]);
    fs::write(path, out).unwrap();
}

#[test]
fn test_overflowing_tensor_header_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    GPTModel::new(&config(), &mut StdRng::seed_from_u64(0))
        .save(&path)
        .unwrap();

    rewrite_first_header(&path, &[3, u32::MAX, u32::MAX, u32::MAX, 0]);

    let err = expect_load_err(&path);
    assert!(matches!(err, wharton::Error::Checkpoint(_)), "{}", err);
}

#[test]
fn test_oversized_dims_rejected_before_allocating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    GPTModel::new(&config(), &mut StdRng::seed_from_u64(0))
        .save(&path)
        .unwrap();

    rewrite_first_header(&path, &[2, u32::MAX, u32::MAX, u32::MAX]);

    let err = expect_load_err(&path);
    assert!(matches!(err, wharton::Error::Checkpoint(_)), "{}", err);
    assert!(err.to_string().contains("tensor 0"), "{}", err);
}

#[test]
fn test_mismatched_length_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    GPTModel::new(&config(), &mut StdRng::seed_from_u64(0))
        .save(&path)
        .unwrap();

    // tok_emb is [300, 16]
    rewrite_first_header(&path, &[2, 300, 16, u32::MAX]);

    let err = expect_load_err(&path);
    assert!(matches!(err, wharton::Error::Checkpoint(_)), "{}", err);
}

#[test]
fn test_oversized_config_header_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    GPTModel::new(&config(), &mut StdRng::seed_from_u64(0))
        .save(&path)
        .unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[9..13].copy_from_slice(&u32::MAX.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    let err = expect_load_err(&path);
    assert!(matches!(err, wharton::Error::Checkpoint(_)), "{}", err);
}
