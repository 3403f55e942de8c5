//! Index-then-query round trips over a scratch collection

mod common;

use common::{HashEmbedder, DIMENSION};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use ticketscope::chunking::Chunker;
use ticketscope::config::{ChunkingConfig, CodebaseConfig};
use ticketscope::index::{EmbeddingIndex, IndexError};
use ticketscope::retrieval::{
    render_context, PageExportSource, QueryOutcome, RetrievalEngine, SearchError,
    NOT_INDEXED_MESSAGE,
};

const ORDER_PROCESSOR: &str = r#"class OrderProcessor
  def process(order)
    validate_order(order)
    charge_payment(order.total)
    ship_items(order.items)
  end

  def refund(order)
    payment_gateway.refund(order.payment_id)
    notify_customer(order.customer_email)
  end
end
"#;

const SETTINGS: &str = r#"database:
  adapter: postgresql
  pool: 5
  timeout: 5000
mailer:
  delivery_method: smtp
  smtp_host: mail.internal
"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn engine(dir: &Path, model: &str) -> RetrievalEngine {
    let index = EmbeddingIndex::open(&dir.join("code.sqlite"), model, DIMENSION).unwrap();
    RetrievalEngine::new(
        Arc::new(HashEmbedder::new(model)),
        index,
        Chunker::new(ChunkingConfig::default()),
        "code",
        8,
    )
    .unwrap()
}

fn codebase(root: &Path) {
    write(root, "app/services/order_processor.rb", ORDER_PROCESSOR);
    write(root, "config/settings.yml", SETTINGS);
    write(root, "node_modules/left-pad/index.js", "module.exports = function leftPad() {}\n");
    write(root, "README.md", "# Orders\n\nRefund handling lives in the order processor.\n");
}

fn index_codebase(engine: &RetrievalEngine, root: &Path) -> ticketscope::retrieval::IndexReport {
    let config = CodebaseConfig::default();
    engine
        .index_tree(root, &config.include_patterns, &config.exclude_dirs, None)
        .unwrap()
}

#[test]
fn test_query_before_indexing() {
    let store = TempDir::new().unwrap();
    let engine = engine(store.path(), "hash-v1");

    let outcome = engine.query("where are refunds issued", 5).unwrap();
    assert!(matches!(outcome, QueryOutcome::NotIndexed));
    assert_eq!(render_context(&outcome), NOT_INDEXED_MESSAGE);

    assert!(matches!(engine.query("   ", 5), Err(SearchError::EmptyQuery)));
}

#[test]
fn test_index_and_query_codebase() {
    let source = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    codebase(source.path());

    let engine = engine(store.path(), "hash-v1");
    let report = index_codebase(&engine, source.path());

    assert_eq!(report.documents, 2);
    assert_eq!(report.unreadable, 0);
    assert!(report.chunks_total >= 2);
    assert_eq!(report.chunks_embedded, report.chunks_total);

    let outcome = engine
        .query("refund payment_gateway notify_customer", 3)
        .unwrap();
    let matches = outcome.matches();
    assert!(!matches.is_empty());
    assert_eq!(matches[0].path, "app/services/order_processor.rb");
    assert!(matches[0].text.contains("payment_gateway.refund"));
    assert!(matches[0].relevance > 0.0);
    assert_eq!(matches[0].metadata.collection.as_deref(), Some("code"));
    assert!(matches
        .windows(2)
        .all(|pair| pair[0].relevance >= pair[1].relevance));

    let context = render_context(&outcome);
    assert!(context.contains("app/services/order_processor.rb"));
}

#[test]
fn test_reindex_is_idempotent() {
    let source = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    codebase(source.path());

    let engine = engine(store.path(), "hash-v1");
    let first = index_codebase(&engine, source.path());
    let top = engine.query("database adapter pool", 1).unwrap().matches()[0].clone();
    let before = engine.index().get(&top.id).unwrap().unwrap();

    let second = index_codebase(&engine, source.path());
    assert_eq!(second.chunks_total, first.chunks_total);
    assert_eq!(second.chunks_embedded, 0);
    assert_eq!(second.chunks_unchanged, first.chunks_total);
    assert_eq!(engine.index().count().unwrap(), first.chunks_total);

    let after = engine.index().get(&top.id).unwrap().unwrap();
    assert_eq!(after.chunk.text, before.chunk.text);
    assert_eq!(after.vector, before.vector);
    assert_eq!(after.content_hash, before.content_hash);

    write(
        source.path(),
        "config/settings.yml",
        &SETTINGS.replace("pool: 5", "pool: 25"),
    );
    let third = index_codebase(&engine, source.path());
    assert!(third.chunks_embedded >= 1);
    assert!(third.chunks_embedded < third.chunks_total);
}

#[test]
fn test_index_rejects_other_embedding_model() {
    let source = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    codebase(source.path());

    {
        let engine = engine(store.path(), "hash-v1");
        index_codebase(&engine, source.path());
    }

    let path = store.path().join("code.sqlite");
    assert!(matches!(
        EmbeddingIndex::open(&path, "hash-v2", DIMENSION),
        Err(IndexError::ModelMismatch { .. })
    ));
    assert!(matches!(
        EmbeddingIndex::open(&path, "hash-v1", DIMENSION * 2),
        Err(IndexError::ModelMismatch { .. })
    ));

    let index = EmbeddingIndex::open(&path, "hash-v1", DIMENSION).unwrap();
    let result = RetrievalEngine::new(
        Arc::new(HashEmbedder::new("hash-v2")),
        index,
        Chunker::new(ChunkingConfig::default()),
        "code",
        8,
    );
    assert!(matches!(result, Err(SearchError::ModelMismatch { .. })));
}

#[test]
fn test_index_wiki_export() {
    let store = TempDir::new().unwrap();
    let export = store.path().join("pages.jsonl");
    let pages = [
        r#"{"page_id":"101","title":"Refund runbook","url":"https://wiki.example.com/101","space":"SUP","labels":["billing"],"content":"Refunds are issued through the payment gateway after support approval."}"#,
        r#"{"page_id":"102","title":"SMTP outages","space":"OPS","content":"When the mailer cannot reach smtp_host, check the relay status page."}"#,
        r#"{"page_id": "103", "title": "#,
    ];
    std::fs::write(&export, pages.join("\n")).unwrap();

    let index =
        EmbeddingIndex::open(&store.path().join("wiki.sqlite"), "hash-v1", DIMENSION).unwrap();
    let engine = RetrievalEngine::new(
        Arc::new(HashEmbedder::new("hash-v1")),
        index,
        Chunker::new(ChunkingConfig::default()),
        "wiki",
        8,
    )
    .unwrap();

    let report = engine.index_source(&PageExportSource::new(&export)).unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.unreadable, 1);

    let outcome = engine.query("refunds payment gateway approval", 1).unwrap();
    let top = &outcome.matches()[0];
    assert_eq!(top.path, "wiki/SUP/101");
    assert_eq!(top.metadata.title.as_deref(), Some("Refund runbook"));
    assert_eq!(top.metadata.url.as_deref(), Some("https://wiki.example.com/101"));
    assert_eq!(top.metadata.labels, vec!["billing".to_string()]);
    assert_eq!(top.metadata.collection.as_deref(), Some("wiki"));
}
