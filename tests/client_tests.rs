mod support;

use jcyl_bot::dataset_model::{ExportFormat, UNAVAILABLE};
use serde_json::json;
use support::{client_for, dataset_doc, FakeCatalog};

#[tokio::test]
async fn test_exports_exclude_self_link() {
    let catalog = FakeCatalog::new();
    catalog.insert_document(
        "/datasets/tasa-paro/exports",
        json!({"links": [
            {"rel": "self", "href": "A"},
            {"rel": "csv", "href": "B"},
            {"rel": "json", "href": "C"}
        ]}),
    );
    let client = client_for(&catalog);

    let exports = client.get_dataset_exports("tasa-paro").await;
    assert_eq!(
        exports,
        vec![
            ExportFormat {
                format: "csv".to_string(),
                url: "B".to_string()
            },
            ExportFormat {
                format: "json".to_string(),
                url: "C".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_missing_documents_degrade_to_empty() {
    let client = client_for(&FakeCatalog::new());

    assert!(client.get_dataset_exports("nope").await.is_empty());
    assert!(client.get_dataset_attachments("nope").await.is_empty());
    assert!(client.get_themes().await.is_empty());
    assert!(client.get_dataset_info("nope").await.is_none());
    assert_eq!(client.get_dataset_records_count("nope").await, 0);
}

#[tokio::test]
async fn test_batch_skips_bad_records_and_invalid_ids() {
    let too_long = "x".repeat(201);
    let catalog = FakeCatalog::with_datasets(vec![
        dataset_doc("ok-1", "Primero", &["Salud"]),
        json!({"dataset_id": "broken", "metas": {"default": {"records_count": "many"}}}),
        dataset_doc("", "Sin identificador", &[]),
        dataset_doc(&too_long, "Identificador largo", &[]),
        dataset_doc("ok-2", "Segundo", &[]),
    ]);
    let client = client_for(&catalog);

    let batch = client
        .fetch_dataset_batch(100, 0, "-metadata_processed", None)
        .await
        .expect("listing should succeed");

    let ids: Vec<&str> = batch.datasets.iter().map(|d| d.dataset_id.as_str()).collect();
    assert_eq!(ids, vec!["ok-1", "ok-2"]);
    assert_eq!(batch.raw_len, 5);
    assert_eq!(batch.total_count, 5);
}

#[tokio::test]
async fn test_dataset_info_parses_and_cleans() {
    let catalog = FakeCatalog::with_datasets(vec![dataset_doc(
        "centros-salud",
        "Centros de salud",
        &["Salud"],
    )]);
    let client = client_for(&catalog);

    let dataset = client
        .get_dataset_info("centros-salud")
        .await
        .expect("dataset should be found");
    assert_eq!(dataset.title, "Centros de salud");
    assert_eq!(dataset.description, "Descripción de Centros de salud");
    assert_eq!(dataset.records_count, 100);
    assert_eq!(dataset.themes, vec!["Salud"]);
    assert_ne!(dataset.modified, UNAVAILABLE);
}

#[tokio::test]
async fn test_facets_and_keywords_by_theme() {
    let catalog = FakeCatalog::new();
    catalog.insert_document(
        "/facets",
        json!({"facets": [
            {"name": "default.theme", "facets": [{"name": "Salud", "count": 3}]},
            {"name": "default.keyword", "facets": [
                {"name": "hospitales", "count": 2},
                {"name": "farmacias", "count": 1}
            ]}
        ]}),
    );
    let client = client_for(&catalog);

    let themes = client.get_themes().await;
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].name, "Salud");

    let keywords = client.get_keywords(Some("Salud")).await;
    let names: Vec<&str> = keywords.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(names, vec!["hospitales", "farmacias"]);
}

#[tokio::test]
async fn test_attachments_and_records_count() {
    let catalog = FakeCatalog::new();
    catalog.insert_document(
        "/datasets/paro/attachments",
        json!({"attachments": [
            {"href": "https://example.org/doc.pdf", "title": "Metodología"},
            {"title": "Sin enlace"}
        ]}),
    );
    catalog.insert_document("/datasets/paro/records", json!({"total_count": 4321, "results": []}));
    let client = client_for(&catalog);

    let attachments = client.get_dataset_attachments("paro").await;
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].title, "Metodología");
    assert_eq!(attachments[0].description, UNAVAILABLE);

    assert_eq!(client.get_dataset_records_count("paro").await, 4321);
}

#[tokio::test]
async fn test_download_export_to_temp_file() {
    let catalog = FakeCatalog::new();
    catalog.insert_download("https://example.org/paro.csv", b"provincia;paro\nLeon;100\n");
    let client = client_for(&catalog);

    let export = ExportFormat {
        format: "csv".to_string(),
        url: "https://example.org/paro.csv".to_string(),
    };
    let file = client
        .download_export(&export)
        .await
        .expect("download should succeed");
    let content = std::fs::read_to_string(file.path()).unwrap();
    assert_eq!(content, "provincia;paro\nLeon;100\n");

    let missing = ExportFormat {
        format: "json".to_string(),
        url: "https://example.org/missing.json".to_string(),
    };
    assert!(client.download_export(&missing).await.is_none());
}

#[test]
fn test_dataset_web_url() {
    let client = client_for(&FakeCatalog::new());
    assert_eq!(
        client.dataset_web_url("tasa-paro"),
        "https://analisis.datosabiertos.jcyl.es/explore/dataset/tasa-paro"
    );
}
