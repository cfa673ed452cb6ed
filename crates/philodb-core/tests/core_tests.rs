use std::fs;

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use tempfile::TempDir;

use philodb_core::config::{ChunkingConfig, Config};
use philodb_core::data_processor::DataProcessor;
use philodb_core::Error;

fn page(title: &str, body: &str) -> String {
    format!("<html><head><title>{title}</title></head><body><div id=\"main-text\">{body}</div></body></html>")
}

#[test]
fn lists_only_html_files_sorted_and_limited() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("b.html"), page("B", "bravo")).unwrap();
    fs::write(dir.join("a.html"), page("A", "alpha")).unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();
    fs::create_dir(dir.join("nested")).unwrap();
    fs::write(dir.join("nested").join("c.html"), page("C", "charlie")).unwrap();

    let processor = DataProcessor::new(ChunkingConfig::default()).unwrap();
    let files = processor.list_html_files(dir, None).unwrap();
    let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
    assert_eq!(names, vec!["a.html", "b.html"]);

    let limited = processor.list_html_files(dir, Some(1)).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn missing_corpus_directory_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let processor = DataProcessor::new(ChunkingConfig::default()).unwrap();
    assert!(processor.list_html_files(&tmp.path().join("nope"), None).is_err());
}

#[test]
fn load_and_chunk_document() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("free-will.html");
    let sentence = "Free will is the capacity of agents to choose between different possible courses of action. ";
    fs::write(&path, page("Free Will (Stanford Encyclopedia of Philosophy)", &sentence.repeat(40))).unwrap();

    let processor = DataProcessor::new(ChunkingConfig::default()).unwrap();
    let doc = processor.load_document(&path).unwrap();
    assert_eq!(doc.entry_name, "free-will");
    assert_eq!(doc.filename, "free-will.html");
    assert!(doc.title.starts_with("Free Will"));
    assert!(doc.scraped_at.is_some());

    let chunks = processor.chunk_document(&doc).unwrap();
    assert!(chunks.len() > 1);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.id, format!("free-will_chunk_{i}"));
        assert_eq!(c.chunk_index, i);
        assert_eq!(c.total_chunks, chunks.len());
        assert_eq!(c.doc_id, "free-will");
        assert_eq!(c.content_hash.len(), 64);
        assert!(c.content.chars().count() <= 1000);
    }
    // chunk boundaries land on sentence ends where possible
    assert!(chunks[0].content.ends_with('.'));

    let again = processor.chunk_document(&doc).unwrap();
    assert_eq!(chunks, again, "chunking is deterministic");
}

#[test]
fn empty_page_yields_no_chunks() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("blank.html");
    fs::write(&path, "<html><body>   </body></html>").unwrap();
    let processor = DataProcessor::new(ChunkingConfig::default()).unwrap();
    let doc = processor.load_document(&path).unwrap();
    assert!(processor.chunk_document(&doc).unwrap().is_empty());
}

#[test]
fn invalid_utf8_is_read_lossily() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("latin.html");
    let mut bytes = b"<html><body><p>caf".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b" society</p></body></html>");
    fs::write(&path, bytes).unwrap();
    let processor = DataProcessor::new(ChunkingConfig::default()).unwrap();
    let doc = processor.load_document(&path).unwrap();
    assert!(doc.content.contains("society"));
}

#[test]
fn rejects_invalid_chunking_config() {
    let bad = ChunkingConfig { min_size: 100, max_size: 50, overlap: 10, lookback: 20 };
    assert!(matches!(DataProcessor::new(bad), Err(Error::InvalidConfig(_))));
}

#[test]
fn config_defaults() {
    let cfg = Config::from_figment(Figment::from(Serialized::defaults(Config::default()))).unwrap();
    assert_eq!(cfg.chunking.max_size, 1000);
    assert_eq!(cfg.chunking.overlap, 200);
    assert_eq!(cfg.embedding.dim, 384);
    assert_eq!(cfg.embedding.batch_size, 32);
    assert_eq!(cfg.store.table, "philosophy_entries");
    assert_eq!(cfg.search.default_k, 5);
    assert_eq!(cfg.search.max_k, 20);
}

#[test]
fn config_toml_overrides_and_validation() {
    let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(
        r#"
        [store]
        path = "/var/lib/philodb"
        [chunking]
        min_size = 300
        max_size = 800
        overlap = 100
        "#,
    ));
    let cfg = Config::from_figment(figment).unwrap();
    assert_eq!(cfg.store.path, "/var/lib/philodb");
    assert_eq!(cfg.chunking.max_size, 800);
    assert_eq!(cfg.chunking.lookback, 500, "untouched keys keep defaults");

    let bad = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string("[chunking]\noverlap = 500\n"));
    assert!(Config::from_figment(bad).is_err());

    let bad_k = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string("[search]\ndefault_k = 50\n"));
    assert!(Config::from_figment(bad_k).is_err());
}

#[test]
fn load_from_resolves_relative_paths() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("philodb.toml");
    fs::write(&file, "[data]\nhtml_dir = \"pages\"\n[store]\npath = \"db\"\n").unwrap();
    let cfg = Config::load_from(Some(&file)).unwrap();
    assert_eq!(cfg.html_dir(), tmp.path().join("pages"));
    assert_eq!(cfg.store_path(), tmp.path().join("db"));
}
